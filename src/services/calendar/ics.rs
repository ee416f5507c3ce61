use crate::models::{Appointment, AppointmentStatus};

const ICS_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Single-event iCalendar document for an appointment, times in UTC.
pub fn generate_ics(appointment: &Appointment) -> String {
    let dtstart = appointment.start_time.format(ICS_TIME_FORMAT).to_string();
    let dtend = appointment.end_time.format(ICS_TIME_FORMAT).to_string();
    let dtstamp = appointment.created_at.format(ICS_TIME_FORMAT).to_string();
    let uid = format!("appointment-{}@rendezvous", appointment.id);
    let summary = escape_text(&appointment.summary);
    let status = match appointment.status {
        AppointmentStatus::Scheduled | AppointmentStatus::Completed => "CONFIRMED",
        AppointmentStatus::Cancelled => "CANCELLED",
    };

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Rendezvous//Appointment Assistant//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         STATUS:{status}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}

// RFC 5545 TEXT escaping
fn escape_text(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn dt(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn appointment(summary: &str, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: 12,
            user_id: 1,
            message_id: 3,
            summary: summary.to_string(),
            start_time: dt("2025-03-15T14:00:00+01:00"),
            end_time: dt("2025-03-15T15:00:00+01:00"),
            calendar_event_id: Some("local_1_abcdefghi".to_string()),
            status,
            created_at: dt("2025-03-10T10:00:00Z"),
        }
    }

    #[test]
    fn test_generate_ics() {
        let ics = generate_ics(&appointment("Dentist appointment", AppointmentStatus::Scheduled));
        assert!(ics.contains("BEGIN:VCALENDAR"));
        assert!(ics.contains("BEGIN:VEVENT"));
        assert!(ics.contains("DTSTART:20250315T130000Z"));
        assert!(ics.contains("DTEND:20250315T140000Z"));
        assert!(ics.contains("DTSTAMP:20250310T100000Z"));
        assert!(ics.contains("SUMMARY:Dentist appointment"));
        assert!(ics.contains("UID:appointment-12@rendezvous"));
        assert!(ics.contains("STATUS:CONFIRMED"));
        assert!(ics.contains("END:VEVENT"));
        assert!(ics.contains("END:VCALENDAR"));
    }

    #[test]
    fn test_generate_ics_cancelled_and_escaped() {
        let ics = generate_ics(&appointment("Check-up; fasting, bring X-rays", AppointmentStatus::Cancelled));
        assert!(ics.contains("SUMMARY:Check-up\\; fasting\\, bring X-rays"));
        assert!(ics.contains("STATUS:CANCELLED"));
    }
}
