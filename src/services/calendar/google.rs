//! Google Calendar v3 REST client.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use super::{AccessToken, CalendarApi, EventRequest};
use crate::errors::CalendarError;

const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

pub struct GoogleCalendarApi {
    client_id: String,
    client_secret: String,
    api_base: String,
    token_url: String,
    client: reqwest::Client,
}

impl GoogleCalendarApi {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self::with_endpoints(
            client_id,
            client_secret,
            GOOGLE_CALENDAR_API_BASE.to_string(),
            GOOGLE_TOKEN_URL.to_string(),
        )
    }

    pub fn with_endpoints(
        client_id: String,
        client_secret: String,
        api_base: String,
        token_url: String,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            api_base: api_base.trim_end_matches('/').to_string(),
            token_url,
            client: reqwest::Client::new(),
        }
    }

    /// Consent URL that yields an offline refresh token for the calendar scope.
    pub fn authorization_url(&self, redirect_uri: &str) -> Option<String> {
        if self.client_id.is_empty() {
            return None;
        }
        Url::parse_with_params(
            GOOGLE_AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("scope", CALENDAR_SCOPE),
            ],
        )
        .ok()
        .map(String::from)
    }
}

#[derive(Debug, Deserialize)]
struct InsertedEvent {
    id: Option<String>,
    #[serde(rename = "htmlLink")]
    html_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[async_trait]
impl CalendarApi for GoogleCalendarApi {
    async fn insert_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &EventRequest,
    ) -> Result<String, CalendarError> {
        let url = format!("{}/calendars/{}/events", self.api_base, calendar_id);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = resp.text().await.unwrap_or_default();
            return Err(CalendarError::Auth(format!("{status}: {body}")));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CalendarError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let inserted: InsertedEvent = resp.json().await?;
        if let Some(link) = &inserted.html_link {
            tracing::info!(link = %link, "calendar event link");
        }

        inserted.id.filter(|id| !id.is_empty()).ok_or(CalendarError::Api {
            status: status.as_u16(),
            body: "event id missing from response".to_string(),
        })
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<AccessToken, CalendarError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(CalendarError::NotConfigured);
        }

        let resp = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status.is_client_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CalendarError::Auth(format!("token refresh rejected ({status}): {body}")));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CalendarError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = resp.json().await?;
        Ok(AccessToken::new(token.access_token, token.expires_in))
    }
}
