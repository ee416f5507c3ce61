use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono_tz::Tz;

use super::{placeholder_event_id, AccessToken, CalendarApi, CalendarSink, EventDateTime, EventRequest};
use crate::errors::CalendarError;
use crate::models::AppointmentCandidate;

/// Calendar sink that always yields an event id.
///
/// Without a refresh token no call is made. With one, the insert is attempted; an auth or
/// transient failure drops the cached access token and retries once with a fresh one. Any
/// remaining failure falls back to a placeholder id.
pub struct GoogleCalendarSink {
    api: Box<dyn CalendarApi>,
    calendar_id: String,
    refresh_token: Option<String>,
    timezone: Tz,
    timeout: Duration,
    consent_url: Option<String>,
    access_token: Mutex<Option<AccessToken>>,
}

impl GoogleCalendarSink {
    pub fn new(
        api: Box<dyn CalendarApi>,
        calendar_id: String,
        refresh_token: Option<String>,
        timezone: Tz,
        timeout: Duration,
    ) -> Self {
        Self {
            api,
            calendar_id,
            refresh_token,
            timezone,
            timeout,
            consent_url: None,
            access_token: Mutex::new(None),
        }
    }

    /// URL logged when no credential is configured.
    pub fn with_consent_url(mut self, url: Option<String>) -> Self {
        self.consent_url = url;
        self
    }

    pub fn has_credential(&self) -> bool {
        self.refresh_token.is_some()
    }

    fn event_request(&self, candidate: &AppointmentCandidate) -> EventRequest {
        EventRequest {
            summary: candidate.summary.clone(),
            start: EventDateTime {
                date_time: candidate.start_time.clone(),
                time_zone: self.timezone.name().to_string(),
            },
            end: EventDateTime {
                date_time: candidate.end_time.clone(),
                time_zone: self.timezone.name().to_string(),
            },
        }
    }

    async fn try_create(&self, candidate: &AppointmentCandidate) -> Result<String, CalendarError> {
        let Some(refresh_token) = self.refresh_token.as_deref() else {
            match &self.consent_url {
                Some(url) => tracing::warn!(url = %url, "no calendar refresh token, authorize at"),
                None => tracing::warn!("no calendar refresh token configured"),
            }
            return Err(CalendarError::NotConfigured);
        };

        let event = self.event_request(candidate);

        match self.attempt(refresh_token, &event).await {
            Err(e) if e.is_retryable() => {
                tracing::warn!(error = %e, "calendar insert failed, refreshing token and retrying");
                self.clear_access_token();
                self.attempt(refresh_token, &event).await
            }
            result => result,
        }
    }

    async fn attempt(&self, refresh_token: &str, event: &EventRequest) -> Result<String, CalendarError> {
        let token = self.current_access_token(refresh_token).await?;
        self.bounded(self.api.insert_event(&token, &self.calendar_id, event))
            .await
    }

    async fn current_access_token(&self, refresh_token: &str) -> Result<String, CalendarError> {
        if let Some(token) = self.cached_access_token() {
            return Ok(token);
        }

        let fresh = self
            .bounded(self.api.refresh_access_token(refresh_token))
            .await?;
        let token = fresh.token.clone();
        if let Ok(mut cached) = self.access_token.lock() {
            *cached = Some(fresh);
        }
        Ok(token)
    }

    fn cached_access_token(&self) -> Option<String> {
        self.access_token
            .lock()
            .ok()
            .and_then(|cached| cached.as_ref().filter(|t| t.is_fresh()).map(|t| t.token.clone()))
    }

    fn clear_access_token(&self) {
        if let Ok(mut cached) = self.access_token.lock() {
            *cached = None;
        }
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, CalendarError>>,
    ) -> Result<T, CalendarError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(CalendarError::Timeout(self.timeout)))
    }
}

#[async_trait]
impl CalendarSink for GoogleCalendarSink {
    async fn create_event(&self, candidate: &AppointmentCandidate) -> Result<String, CalendarError> {
        match self.try_create(candidate).await {
            Ok(event_id) => {
                tracing::info!(event_id = %event_id, summary = %candidate.summary, "calendar event created");
                Ok(event_id)
            }
            Err(e) => {
                let event_id = placeholder_event_id();
                tracing::warn!(error = %e, event_id = %event_id, "calendar unavailable, using placeholder event id");
                Ok(event_id)
            }
        }
    }
}
