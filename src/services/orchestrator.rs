use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::db::Store;
use crate::models::{
    Appointment, AppointmentCandidate, AppointmentStatus, Message, MessageMetadata, MessageRole,
    NewAppointment, NewMessage,
};
use crate::services::ai::extractor::AppointmentExtractor;
use crate::services::ai::responder::{ChatResponder, CONTEXT_WINDOW};
use crate::services::calendar::CalendarSink;
use crate::services::intent::has_scheduling_intent;

/// Result of one chat turn, as returned to the UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageExchange {
    pub user_message: Message,
    pub assistant_message: Message,
    pub appointment_created: bool,
    pub appointment_details: AppointmentDetails,
}

/// A single object when exactly one appointment was created, a list otherwise.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum AppointmentDetails {
    Single(Appointment),
    Many(Vec<Appointment>),
}

impl AppointmentDetails {
    fn from_created(mut created: Vec<Appointment>) -> Self {
        if created.len() == 1 {
            AppointmentDetails::Single(created.remove(0))
        } else {
            AppointmentDetails::Many(created)
        }
    }

    pub fn appointments(&self) -> &[Appointment] {
        match self {
            AppointmentDetails::Single(a) => std::slice::from_ref(a),
            AppointmentDetails::Many(all) => all,
        }
    }
}

/// Drives one inbound chat message through intent detection, extraction, calendar and storage.
pub struct AppointmentOrchestrator {
    store: Arc<dyn Store>,
    extractor: AppointmentExtractor,
    calendar: Arc<dyn CalendarSink>,
    responder: ChatResponder,
    timezone: Tz,
}

impl AppointmentOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        extractor: AppointmentExtractor,
        calendar: Arc<dyn CalendarSink>,
        responder: ChatResponder,
    ) -> Self {
        let timezone = extractor.timezone();
        Self {
            store,
            extractor,
            calendar,
            responder,
            timezone,
        }
    }

    pub async fn handle_user_message(
        &self,
        user_id: i64,
        conversation_id: i64,
        content: &str,
    ) -> anyhow::Result<MessageExchange> {
        self.handle_user_message_at(user_id, conversation_id, content, Utc::now())
            .await
    }

    /// Same as [`Self::handle_user_message`] with an explicit reference instant for
    /// resolving relative dates.
    pub async fn handle_user_message_at(
        &self,
        user_id: i64,
        conversation_id: i64,
        content: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<MessageExchange> {
        let user_message = self
            .store
            .create_message(NewMessage {
                conversation_id,
                content: content.to_string(),
                role: MessageRole::User,
                metadata: MessageMetadata::None,
            })
            .await?;

        let mut created = vec![];
        let mut extracted_reply = None;

        if has_scheduling_intent(content) {
            tracing::info!(conversation_id, "scheduling intent detected");
            let extraction = self
                .extractor
                .extract(content, now.with_timezone(&self.timezone))
                .await;

            for (index, candidate) in extraction.appointments.iter().enumerate() {
                match self.book(user_id, user_message.id, candidate).await {
                    Ok(appointment) => {
                        tracing::info!(
                            appointment_id = appointment.id,
                            event_id = ?appointment.calendar_event_id,
                            "appointment created"
                        );
                        created.push(appointment);
                    }
                    Err(e) => {
                        tracing::error!(index, summary = %candidate.summary, error = %e, "failed to create appointment");
                    }
                }
            }

            let message = extraction.response_message.trim();
            if !message.is_empty() {
                extracted_reply = Some(message.to_string());
            }
        }

        let reply = if created.is_empty() {
            let history = self
                .store
                .get_recent_messages(conversation_id, CONTEXT_WINDOW)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "failed to load chat context");
                    vec![user_message.clone()]
                });
            self.responder.reply(&history).await
        } else {
            extracted_reply.unwrap_or_else(|| compose_confirmation(&created, self.timezone))
        };

        let appointment_ids = created.iter().map(|a| a.id).collect();
        let assistant_message = self
            .store
            .create_message(NewMessage {
                conversation_id,
                content: reply,
                role: MessageRole::Assistant,
                metadata: MessageMetadata::from_appointment_ids(appointment_ids),
            })
            .await?;

        if let Err(e) = self.store.touch_conversation(conversation_id).await {
            tracing::warn!(conversation_id, error = %e, "failed to update conversation timestamp");
        }

        Ok(MessageExchange {
            user_message,
            assistant_message,
            appointment_created: !created.is_empty(),
            appointment_details: AppointmentDetails::from_created(created),
        })
    }

    async fn book(
        &self,
        user_id: i64,
        message_id: i64,
        candidate: &AppointmentCandidate,
    ) -> anyhow::Result<Appointment> {
        let (start_time, end_time) = candidate.parse_times()?;
        let event_id = self.calendar.create_event(candidate).await?;

        self.store
            .create_appointment(NewAppointment {
                user_id,
                message_id,
                summary: candidate.summary.trim().to_string(),
                start_time,
                end_time,
                calendar_event_id: Some(event_id),
                status: AppointmentStatus::Scheduled,
            })
            .await
    }
}

/// Reply used when extraction produced no confirmation text of its own.
pub fn compose_confirmation(created: &[Appointment], timezone: Tz) -> String {
    let when = |a: &Appointment| {
        a.start_time
            .with_timezone(&timezone)
            .format("%A %d %B %Y at %H:%M")
            .to_string()
    };

    match created {
        [] => String::new(),
        [apt] => format!(
            "Perfect! I've scheduled your appointment:\n\n**{}**\nDate & time: {}\nStatus: Scheduled\n\nIt has been added to your calendar.",
            apt.summary,
            when(apt),
        ),
        many => {
            let lines: Vec<String> = many
                .iter()
                .enumerate()
                .map(|(i, apt)| format!("**{}. {}**\n{}", i + 1, apt.summary, when(apt)))
                .collect();
            format!(
                "Excellent! I've scheduled {} appointments:\n\n{}\n\nAll of them have been added to your calendar.",
                many.len(),
                lines.join("\n\n"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::errors::{CalendarError, GatewayError};
    use crate::models::Conversation;
    use crate::services::ai::extractor::FALLBACK_SUMMARY;
    use crate::services::ai::{ChatMessage, CompletionOptions, LlmProvider};
    use crate::services::calendar::{is_placeholder_event_id, placeholder_event_id};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use chrono_tz::Europe::Paris;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers JSON-mode calls with `extraction` and plain calls with a chat reply.
    struct FakeLlm {
        extraction: Result<String, ()>,
        extraction_calls: Mutex<usize>,
        chat_calls: Mutex<usize>,
    }

    impl FakeLlm {
        fn new(extraction: &str) -> Arc<Self> {
            Arc::new(Self {
                extraction: Ok(extraction.to_string()),
                extraction_calls: Mutex::new(0),
                chat_calls: Mutex::new(0),
            })
        }

        fn down() -> Arc<Self> {
            Arc::new(Self {
                extraction: Err(()),
                extraction_calls: Mutex::new(0),
                chat_calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for FakeLlm {
        async fn chat(
            &self,
            _system_prompt: &str,
            _messages: &[ChatMessage],
            options: &CompletionOptions,
        ) -> Result<String, GatewayError> {
            if options.json_mode {
                *self.extraction_calls.lock().unwrap() += 1;
                self.extraction
                    .clone()
                    .map_err(|_| GatewayError::Transport("down".to_string()))
            } else {
                *self.chat_calls.lock().unwrap() += 1;
                Ok("Happy to help!".to_string())
            }
        }
    }

    /// Fails for the summaries listed in `fail_for`, otherwise returns a provider-like id.
    struct FakeCalendar {
        fail_for: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeCalendar {
        fn new(fail_for: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                fail_for: fail_for.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(vec![]),
            })
        }
    }

    #[async_trait]
    impl CalendarSink for FakeCalendar {
        async fn create_event(&self, candidate: &AppointmentCandidate) -> Result<String, CalendarError> {
            self.calls.lock().unwrap().push(candidate.summary.clone());
            if self.fail_for.contains(&candidate.summary) {
                return Err(CalendarError::Transport("connection reset".to_string()));
            }
            Ok(format!("gcal{}", self.calls.lock().unwrap().len()))
        }
    }

    /// SQLite store whose first `create_appointment` call fails.
    struct FirstAppointmentFails {
        inner: SqliteStore,
        appointment_calls: Mutex<usize>,
    }

    #[async_trait]
    impl Store for FirstAppointmentFails {
        async fn create_conversation(&self, user_id: i64, title: &str) -> anyhow::Result<Conversation> {
            self.inner.create_conversation(user_id, title).await
        }
        async fn get_conversation(&self, id: i64) -> anyhow::Result<Option<Conversation>> {
            self.inner.get_conversation(id).await
        }
        async fn get_user_conversations(&self, user_id: i64) -> anyhow::Result<Vec<Conversation>> {
            self.inner.get_user_conversations(user_id).await
        }
        async fn touch_conversation(&self, id: i64) -> anyhow::Result<()> {
            self.inner.touch_conversation(id).await
        }
        async fn create_message(&self, message: NewMessage) -> anyhow::Result<Message> {
            self.inner.create_message(message).await
        }
        async fn get_conversation_messages(&self, conversation_id: i64) -> anyhow::Result<Vec<Message>> {
            self.inner.get_conversation_messages(conversation_id).await
        }
        async fn get_recent_messages(&self, conversation_id: i64, limit: usize) -> anyhow::Result<Vec<Message>> {
            self.inner.get_recent_messages(conversation_id, limit).await
        }
        async fn create_appointment(&self, appointment: NewAppointment) -> anyhow::Result<Appointment> {
            let first = {
                let mut calls = self.appointment_calls.lock().unwrap();
                *calls += 1;
                *calls == 1
            };
            if first {
                anyhow::bail!("disk I/O error");
            }
            self.inner.create_appointment(appointment).await
        }
        async fn get_appointment(&self, id: i64) -> anyhow::Result<Option<Appointment>> {
            self.inner.get_appointment(id).await
        }
        async fn get_user_appointments(&self, user_id: i64) -> anyhow::Result<Vec<Appointment>> {
            self.inner.get_user_appointments(user_id).await
        }
        async fn update_appointment_status(
            &self,
            id: i64,
            status: AppointmentStatus,
        ) -> anyhow::Result<Option<Appointment>> {
            self.inner.update_appointment_status(id, status).await
        }
    }

    struct Harness {
        store: Arc<SqliteStore>,
        orchestrator: AppointmentOrchestrator,
        conversation: Conversation,
    }

    async fn harness(llm: Arc<FakeLlm>, calendar: Arc<dyn CalendarSink>) -> Harness {
        let store = Arc::new(SqliteStore::open(":memory:").unwrap());
        let conversation = store.create_conversation(1, "Chat").await.unwrap();
        let orchestrator = AppointmentOrchestrator::new(
            store.clone(),
            AppointmentExtractor::new(llm.clone(), Paris, Duration::from_secs(5)),
            calendar,
            ChatResponder::new(llm, Duration::from_secs(5)),
        );
        Harness {
            store,
            orchestrator,
            conversation,
        }
    }

    fn now() -> DateTime<Utc> {
        Paris
            .with_ymd_and_hms(2025, 6, 16, 9, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    const DENTIST: &str = r#"{"appointments":[{"summary":"Dentist appointment","start_time":"2025-06-17T10:00:00+02:00","end_time":"2025-06-17T11:00:00+02:00"}],"response_message":"Your Dentist appointment is booked for tomorrow at 10:00."}"#;

    const TWO: &str = r#"{"appointments":[{"summary":"Doctor visit","start_time":"2025-06-23T09:00:00+02:00","end_time":"2025-06-23T10:00:00+02:00"},{"summary":"Dentist visit","start_time":"2025-06-24T14:00:00+02:00","end_time":"2025-06-24T15:00:00+02:00"}],"response_message":""}"#;

    #[tokio::test]
    async fn test_no_intent_uses_plain_chat() {
        let llm = FakeLlm::new(DENTIST);
        let calendar = FakeCalendar::new(&[]);
        let h = harness(llm.clone(), calendar.clone()).await;

        let exchange = h
            .orchestrator
            .handle_user_message_at(1, h.conversation.id, "Hello there", now())
            .await
            .unwrap();

        assert!(!exchange.appointment_created);
        assert_eq!(exchange.appointment_details, AppointmentDetails::Many(vec![]));
        assert_eq!(exchange.assistant_message.content, "Happy to help!");
        assert_eq!(exchange.assistant_message.metadata, MessageMetadata::None);
        assert_eq!(*llm.extraction_calls.lock().unwrap(), 0);
        assert!(calendar.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_appointment_scenario() {
        let h = harness(FakeLlm::new(DENTIST), FakeCalendar::new(&[])).await;

        let exchange = h
            .orchestrator
            .handle_user_message_at(1, h.conversation.id, "Book a dentist appointment tomorrow at 10 AM", now())
            .await
            .unwrap();

        assert!(exchange.appointment_created);
        let AppointmentDetails::Single(apt) = &exchange.appointment_details else {
            panic!("expected a single appointment");
        };
        assert_eq!(apt.status, AppointmentStatus::Scheduled);
        assert_eq!(apt.calendar_event_id.as_deref(), Some("gcal1"));
        assert_eq!(apt.message_id, exchange.user_message.id);
        assert_eq!(apt.start_time, Utc.with_ymd_and_hms(2025, 6, 17, 8, 0, 0).unwrap());
        assert!(exchange.assistant_message.content.contains("Dentist"));
        assert_eq!(exchange.assistant_message.metadata.appointment_ids(), &[apt.id]);
    }

    #[tokio::test]
    async fn test_multiple_appointments_in_order_with_generated_reply() {
        let h = harness(FakeLlm::new(TWO), FakeCalendar::new(&[])).await;

        let exchange = h
            .orchestrator
            .handle_user_message_at(1, h.conversation.id, "book a doctor visit Monday and a dentist visit Tuesday", now())
            .await
            .unwrap();

        let created = exchange.appointment_details.appointments();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].summary, "Doctor visit");
        assert_eq!(created[1].summary, "Dentist visit");
        assert!(created[0].id < created[1].id);

        let reply = &exchange.assistant_message.content;
        assert!(reply.contains("2 appointments"));
        assert!(reply.contains("1. Doctor visit"));
        assert!(reply.contains("2. Dentist visit"));
        assert!(reply.contains("Monday 23 June 2025 at 09:00"));
    }

    #[tokio::test]
    async fn test_partial_calendar_failure_keeps_other_candidates() {
        let calendar = FakeCalendar::new(&["Doctor visit"]);
        let h = harness(FakeLlm::new(TWO), calendar.clone()).await;

        let exchange = h
            .orchestrator
            .handle_user_message_at(1, h.conversation.id, "book a doctor visit Monday and a dentist visit Tuesday", now())
            .await
            .unwrap();

        assert!(exchange.appointment_created);
        let AppointmentDetails::Single(apt) = &exchange.appointment_details else {
            panic!("expected exactly one appointment");
        };
        assert_eq!(apt.summary, "Dentist visit");
        assert_eq!(calendar.calls.lock().unwrap().len(), 2);
        assert_eq!(h.store.get_user_appointments(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_for_one_candidate_keeps_the_rest() {
        let store = Arc::new(FirstAppointmentFails {
            inner: SqliteStore::open(":memory:").unwrap(),
            appointment_calls: Mutex::new(0),
        });
        let conversation = store.create_conversation(1, "Chat").await.unwrap();
        let llm = FakeLlm::new(TWO);
        let calendar = FakeCalendar::new(&[]);
        let orchestrator = AppointmentOrchestrator::new(
            store.clone(),
            AppointmentExtractor::new(llm.clone(), Paris, Duration::from_secs(5)),
            calendar.clone(),
            ChatResponder::new(llm, Duration::from_secs(5)),
        );

        let exchange = orchestrator
            .handle_user_message_at(1, conversation.id, "book a doctor visit Monday and a dentist visit Tuesday", now())
            .await
            .unwrap();

        assert!(exchange.appointment_created);
        let AppointmentDetails::Single(apt) = &exchange.appointment_details else {
            panic!("expected exactly one appointment");
        };
        assert_eq!(apt.summary, "Dentist visit");
        assert_eq!(calendar.calls.lock().unwrap().len(), 2);
        assert_eq!(exchange.assistant_message.metadata.appointment_ids(), &[apt.id]);
        assert_eq!(store.get_user_appointments(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_all_candidates_fail_falls_through_to_chat() {
        let calendar = FakeCalendar::new(&["Doctor visit", "Dentist visit"]);
        let h = harness(FakeLlm::new(TWO), calendar).await;

        let exchange = h
            .orchestrator
            .handle_user_message_at(1, h.conversation.id, "book both please", now())
            .await
            .unwrap();

        assert!(!exchange.appointment_created);
        assert_eq!(exchange.assistant_message.content, "Happy to help!");
        assert_eq!(exchange.assistant_message.metadata, MessageMetadata::None);
    }

    #[tokio::test]
    async fn test_unparseable_times_skip_candidate_before_calendar() {
        let bad = r#"{"appointments":[{"summary":"Doctor","start_time":"next monday","end_time":"later"}],"response_message":"ok"}"#;
        let calendar = FakeCalendar::new(&[]);
        let h = harness(FakeLlm::new(bad), calendar.clone()).await;

        let exchange = h
            .orchestrator
            .handle_user_message_at(1, h.conversation.id, "doctor next monday", now())
            .await
            .unwrap();

        assert!(!exchange.appointment_created);
        assert!(calendar.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extraction_failure_books_fallback_appointment() {
        let h = harness(FakeLlm::down(), FakeCalendar::new(&[])).await;

        let exchange = h
            .orchestrator
            .handle_user_message_at(1, h.conversation.id, "I need a doctor", now())
            .await
            .unwrap();

        let AppointmentDetails::Single(apt) = &exchange.appointment_details else {
            panic!("expected the fallback appointment");
        };
        assert_eq!(apt.summary, FALLBACK_SUMMARY);
        // 09:00 Paris on the 16th -> 10:00 Paris on the 17th.
        assert_eq!(apt.start_time, Utc.with_ymd_and_hms(2025, 6, 17, 8, 0, 0).unwrap());
        assert_eq!(apt.end_time - apt.start_time, chrono::Duration::hours(1));
    }

    #[tokio::test]
    async fn test_identical_messages_create_duplicate_appointments() {
        let h = harness(FakeLlm::new(DENTIST), FakeCalendar::new(&[])).await;
        let text = "Book a dentist appointment tomorrow at 10 AM";

        let first = h.orchestrator.handle_user_message_at(1, h.conversation.id, text, now()).await.unwrap();
        let second = h.orchestrator.handle_user_message_at(1, h.conversation.id, text, now()).await.unwrap();

        let a = &first.appointment_details.appointments()[0];
        let b = &second.appointment_details.appointments()[0];
        assert_ne!(a.id, b.id);
        assert_eq!(a.start_time, b.start_time);
        assert_eq!(h.store.get_user_appointments(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_messages_persisted_in_order() {
        let h = harness(FakeLlm::new(DENTIST), FakeCalendar::new(&[])).await;

        h.orchestrator
            .handle_user_message_at(1, h.conversation.id, "Book a dentist appointment", now())
            .await
            .unwrap();

        let messages = h.store.get_conversation_messages(h.conversation.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_fatal() {
        let h = harness(FakeLlm::new(DENTIST), FakeCalendar::new(&[])).await;
        assert!(h
            .orchestrator
            .handle_user_message_at(1, 9999, "hello", now())
            .await
            .is_err());
    }

    #[test]
    fn test_compose_confirmation_single() {
        let apt = Appointment {
            id: 1,
            user_id: 1,
            message_id: 1,
            summary: "Dentist appointment".to_string(),
            start_time: Utc.with_ymd_and_hms(2025, 6, 17, 8, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 6, 17, 9, 0, 0).unwrap(),
            calendar_event_id: Some(placeholder_event_id()),
            status: AppointmentStatus::Scheduled,
            created_at: Utc::now(),
        };
        assert!(is_placeholder_event_id(apt.calendar_event_id.as_deref().unwrap()));

        let reply = compose_confirmation(std::slice::from_ref(&apt), Paris);
        assert!(reply.starts_with("Perfect!"));
        assert!(reply.contains("**Dentist appointment**"));
        assert!(reply.contains("Tuesday 17 June 2025 at 10:00"));
        assert!(!reply.contains("appointments:"));
    }
}
