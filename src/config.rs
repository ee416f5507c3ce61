use std::env;
use std::time::Duration;

use chrono_tz::Tz;

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Paris;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub default_user_id: i64,
    pub llm_provider: String,
    pub azure_openai_endpoint: String,
    pub azure_openai_api_key: String,
    pub azure_openai_deployment: String,
    pub azure_openai_api_version: String,
    pub openai_base_url: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_refresh_token: Option<String>,
    pub google_redirect_uri: String,
    pub google_calendar_id: String,
    pub timezone: Tz,
    pub llm_timeout: Duration,
    pub calendar_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let openai_api_key = env::var("OPENAI_API_KEY").unwrap_or_default();

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "rendezvous.db".to_string()),
            default_user_id: env::var("DEFAULT_USER_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            llm_provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "azure".to_string()),
            azure_openai_endpoint: env::var("AZURE_OPENAI_ENDPOINT").unwrap_or_default(),
            azure_openai_api_key: env::var("AZURE_OPENAI_API_KEY")
                .unwrap_or_else(|_| openai_api_key.clone()),
            azure_openai_deployment: env::var("AZURE_OPENAI_DEPLOYMENT")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            azure_openai_api_version: env::var("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|_| "2025-01-01-preview".to_string()),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            openai_api_key,
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            ollama_url: env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            ollama_model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
            google_client_id: env::var("GOOGLE_CLIENT_ID").unwrap_or_default(),
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET").unwrap_or_default(),
            google_refresh_token: env::var("GOOGLE_REFRESH_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            google_redirect_uri: env::var("GOOGLE_REDIRECT_URI")
                .unwrap_or_else(|_| "http://localhost".to_string()),
            google_calendar_id: env::var("GOOGLE_CALENDAR_ID")
                .unwrap_or_else(|_| "primary".to_string()),
            timezone: parse_timezone(env::var("APPOINTMENT_TIMEZONE").ok().as_deref()),
            llm_timeout: Duration::from_secs(
                env::var("LLM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            calendar_timeout: Duration::from_secs(
                env::var("CALENDAR_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(15),
            ),
        }
    }
}

/// Parses an IANA timezone name, falling back to Europe/Paris.
pub fn parse_timezone(name: Option<&str>) -> Tz {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        None => DEFAULT_TIMEZONE,
        Some(n) => n.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!(timezone = n, "unknown timezone, using Europe/Paris");
            DEFAULT_TIMEZONE
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timezone_valid() {
        assert_eq!(parse_timezone(Some("America/New_York")), chrono_tz::America::New_York);
    }

    #[test]
    fn test_parse_timezone_fallbacks() {
        assert_eq!(parse_timezone(None), DEFAULT_TIMEZONE);
        assert_eq!(parse_timezone(Some("  ")), DEFAULT_TIMEZONE);
        assert_eq!(parse_timezone(Some("Mars/Olympus_Mons")), DEFAULT_TIMEZONE);
    }
}
