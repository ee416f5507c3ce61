use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, LocalResult, SecondsFormat, Timelike};
use chrono_tz::Tz;

use crate::errors::GatewayError;
use crate::models::{AppointmentCandidate, ExtractionResult};
use crate::services::ai::{ChatMessage, CompletionOptions, LlmProvider};

pub const FALLBACK_SUMMARY: &str = "Medical appointment";

const SYSTEM_PROMPT: &str = r#"You are an assistant that extracts medical appointment details from a patient's message. The message may describe one or several appointments.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "appointments": [
    {
      "summary": "short description, e.g. Dentist appointment",
      "start_time": "ISO 8601 date-time with UTC offset, e.g. 2025-01-15T14:00:00+01:00",
      "end_time": "ISO 8601 date-time with UTC offset"
    }
  ],
  "response_message": "Your confirmation to the user"
}

Rules:
- Create one entry in "appointments" for every appointment the user asks for, in the order they are mentioned.
- Keep times exactly as stated. If the user says 10:30, start_time must be 10:30. Never round or shift a stated time.
- Resolve relative dates ("tomorrow", "next Monday", "in two weeks") against the current date given below, never against your own idea of today.
- If no time is given, pick a reasonable time during business hours (9 AM - 5 PM). If no date is given, use the next weekday.
- If no duration is given, appointments last one hour.
- Every start_time and end_time must carry the UTC offset given below.
- Write response_message in the same language as the user's message. It must confirm each appointment with its date and time.
"#;

/// Turns free text into appointment candidates, degrading instead of failing.
pub struct AppointmentExtractor {
    llm: Arc<dyn LlmProvider>,
    timezone: Tz,
    timeout: Duration,
}

impl AppointmentExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>, timezone: Tz, timeout: Duration) -> Self {
        Self {
            llm,
            timezone,
            timeout,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Never fails: any gateway or validation error yields [`fallback_extraction`].
    pub async fn extract(&self, user_text: &str, reference: DateTime<Tz>) -> ExtractionResult {
        let reference = reference.with_timezone(&self.timezone);

        match self.try_extract(user_text, &reference).await {
            Ok(result) => {
                tracing::info!(
                    appointments = result.appointments.len(),
                    "extracted appointment candidates"
                );
                result
            }
            Err(e) => {
                tracing::warn!(error = %e, "appointment extraction failed, using fallback");
                fallback_extraction(&reference)
            }
        }
    }

    async fn try_extract(
        &self,
        user_text: &str,
        reference: &DateTime<Tz>,
    ) -> anyhow::Result<ExtractionResult> {
        let system = build_system_prompt(reference, self.timezone);
        let messages = [ChatMessage::user(user_text)];
        let options = CompletionOptions {
            temperature: 0.3,
            max_tokens: 800,
            json_mode: true,
        };

        let response = tokio::time::timeout(self.timeout, self.llm.chat(&system, &messages, &options))
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout))??;

        parse_extraction(&response)
    }
}

pub fn build_system_prompt(reference: &DateTime<Tz>, timezone: Tz) -> String {
    format!(
        "{SYSTEM_PROMPT}\nCurrent date and time: {} ({})\nTimezone: {} (UTC offset {})",
        reference.format("%Y-%m-%d %H:%M"),
        reference.format("%A"),
        timezone.name(),
        reference.format("%:z"),
    )
}

/// Parses and validates a model response, tolerating code fences and surrounding prose.
pub fn parse_extraction(response: &str) -> anyhow::Result<ExtractionResult> {
    let cleaned = strip_code_fences(response);

    let result = match serde_json::from_str::<ExtractionResult>(cleaned) {
        Ok(result) => result,
        Err(first_err) => {
            let start = cleaned.find('{');
            let end = cleaned.rfind('}');
            match (start, end) {
                (Some(start), Some(end)) if start < end => {
                    serde_json::from_str::<ExtractionResult>(&cleaned[start..=end])?
                }
                _ => return Err(first_err.into()),
            }
        }
    };

    validate_extraction(&result)?;
    Ok(result)
}

fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    let cleaned = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    cleaned.strip_suffix("```").unwrap_or(cleaned).trim()
}

fn validate_extraction(result: &ExtractionResult) -> anyhow::Result<()> {
    anyhow::ensure!(!result.appointments.is_empty(), "no appointments in extraction");

    for (index, candidate) in result.appointments.iter().enumerate() {
        anyhow::ensure!(
            candidate.is_complete(),
            "appointment {index} is missing summary, start_time or end_time"
        );
    }

    Ok(())
}

/// One appointment tomorrow, one hour after the reference time, lasting an hour.
pub fn fallback_extraction(reference: &DateTime<Tz>) -> ExtractionResult {
    let base = reference
        .with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(*reference);
    let start = same_time_next_day(&base) + chrono::Duration::hours(1);
    let end = start + chrono::Duration::hours(1);

    ExtractionResult {
        appointments: vec![AppointmentCandidate {
            summary: FALLBACK_SUMMARY.to_string(),
            start_time: start.to_rfc3339_opts(SecondsFormat::Secs, false),
            end_time: end.to_rfc3339_opts(SecondsFormat::Secs, false),
        }],
        response_message: format!(
            "I'm sorry, I couldn't fully understand the appointment details. \
             I've reserved a medical appointment for {} at {}. \
             Could you tell me the exact date, time and type of appointment so I can adjust it?",
            start.format("%A %d %B"),
            start.format("%H:%M"),
        ),
    }
}

/// Same wall-clock time on the following day. A repeated local time resolves to its earlier
/// instant; a skipped one moves forward by an hour.
fn same_time_next_day(base: &DateTime<Tz>) -> DateTime<Tz> {
    let timezone = base.timezone();
    let Some(naive) = base.naive_local().checked_add_days(Days::new(1)) else {
        return *base + chrono::Duration::days(1);
    };

    match naive.and_local_timezone(timezone) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => (naive + chrono::Duration::hours(1))
            .and_local_timezone(timezone)
            .earliest()
            .unwrap_or_else(|| *base + chrono::Duration::days(1)),
    }
}
