pub mod google;
pub mod ics;
pub mod sink;

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use crate::errors::CalendarError;
use crate::models::AppointmentCandidate;

pub use google::GoogleCalendarApi;
pub use sink::GoogleCalendarSink;

/// Prefix of locally generated event ids. Provider ids never contain `_`.
pub const PLACEHOLDER_EVENT_PREFIX: &str = "local_";

/// The external-calendar write path.
#[async_trait]
pub trait CalendarSink: Send + Sync {
    /// Returns the provider event id, or a placeholder id when the provider was not reached.
    async fn create_event(&self, candidate: &AppointmentCandidate) -> Result<String, CalendarError>;
}

/// Raw calendar provider calls, one HTTP round trip each.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn insert_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &EventRequest,
    ) -> Result<String, CalendarError>;

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<AccessToken, CalendarError>;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EventRequest {
    pub summary: String,
    pub start: EventDateTime,
    pub end: EventDateTime,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    pub date_time: String,
    pub time_zone: String,
}

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Option<Instant>,
}

impl AccessToken {
    pub fn new(token: String, expires_in: Option<u64>) -> Self {
        Self {
            token,
            expires_at: expires_in.map(|secs| Instant::now() + Duration::from_secs(secs)),
        }
    }

    /// Tokens within a minute of expiry count as stale.
    pub fn is_fresh(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() + Duration::from_secs(60) < at,
            None => true,
        }
    }
}

static LAST_PLACEHOLDER_MILLIS: AtomicI64 = AtomicI64::new(0);

/// `local_<millis>_<9 random chars>`, with millis strictly increasing within the process.
pub fn placeholder_event_id() -> String {
    let now = Utc::now().timestamp_millis();
    let prev = LAST_PLACEHOLDER_MILLIS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(now);
    let millis = now.max(prev + 1);

    let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(9).collect();
    format!("{PLACEHOLDER_EVENT_PREFIX}{millis}_{suffix}")
}

pub fn is_placeholder_event_id(id: &str) -> bool {
    id.starts_with(PLACEHOLDER_EVENT_PREFIX)
}
