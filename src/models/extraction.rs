use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An unvalidated, unpersisted appointment proposal produced by extraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentCandidate {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
}

impl AppointmentCandidate {
    pub fn is_complete(&self) -> bool {
        !self.summary.trim().is_empty()
            && !self.start_time.trim().is_empty()
            && !self.end_time.trim().is_empty()
    }

    /// Parses both ends as RFC 3339. Chronological order is not checked.
    pub fn parse_times(&self) -> anyhow::Result<(DateTime<Utc>, DateTime<Utc>)> {
        let start = DateTime::parse_from_rfc3339(self.start_time.trim()).map_err(|e| {
            anyhow::anyhow!("invalid start_time {:?}: {e}", self.start_time)
        })?;
        let end = DateTime::parse_from_rfc3339(self.end_time.trim())
            .map_err(|e| anyhow::anyhow!("invalid end_time {:?}: {e}", self.end_time))?;
        Ok((start.with_timezone(&Utc), end.with_timezone(&Utc)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionResult {
    #[serde(default)]
    pub appointments: Vec<AppointmentCandidate>,
    #[serde(default)]
    pub response_message: String,
}
