use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{Appointment, AppointmentStatus, Conversation, Message, NewAppointment, NewMessage};

/// Conversation, message and appointment persistence.
///
/// Each call is an independent create/read; nothing spans calls transactionally.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_conversation(&self, user_id: i64, title: &str) -> anyhow::Result<Conversation>;
    async fn get_conversation(&self, id: i64) -> anyhow::Result<Option<Conversation>>;
    async fn get_user_conversations(&self, user_id: i64) -> anyhow::Result<Vec<Conversation>>;
    async fn touch_conversation(&self, id: i64) -> anyhow::Result<()>;

    async fn create_message(&self, message: NewMessage) -> anyhow::Result<Message>;
    async fn get_conversation_messages(&self, conversation_id: i64) -> anyhow::Result<Vec<Message>>;
    async fn get_recent_messages(
        &self,
        conversation_id: i64,
        limit: usize,
    ) -> anyhow::Result<Vec<Message>>;

    async fn create_appointment(&self, appointment: NewAppointment) -> anyhow::Result<Appointment>;
    async fn get_appointment(&self, id: i64) -> anyhow::Result<Option<Appointment>>;
    async fn get_user_appointments(&self, user_id: i64) -> anyhow::Result<Vec<Appointment>>;
    async fn update_appointment_status(
        &self,
        id: i64,
        status: AppointmentStatus,
    ) -> anyhow::Result<Option<Appointment>>;
}

pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn open(path: &str) -> anyhow::Result<Self> {
        Ok(Self::new(crate::db::init_db(path)?))
    }

    fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection lock poisoned"))
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_conversation(&self, user_id: i64, title: &str) -> anyhow::Result<Conversation> {
        queries::create_conversation(&*self.conn()?, user_id, title)
    }

    async fn get_conversation(&self, id: i64) -> anyhow::Result<Option<Conversation>> {
        queries::get_conversation(&*self.conn()?, id)
    }

    async fn get_user_conversations(&self, user_id: i64) -> anyhow::Result<Vec<Conversation>> {
        queries::get_user_conversations(&*self.conn()?, user_id)
    }

    async fn touch_conversation(&self, id: i64) -> anyhow::Result<()> {
        queries::touch_conversation(&*self.conn()?, id)?;
        Ok(())
    }

    async fn create_message(&self, message: NewMessage) -> anyhow::Result<Message> {
        queries::create_message(&*self.conn()?, &message)
    }

    async fn get_conversation_messages(&self, conversation_id: i64) -> anyhow::Result<Vec<Message>> {
        queries::get_conversation_messages(&*self.conn()?, conversation_id)
    }

    async fn get_recent_messages(
        &self,
        conversation_id: i64,
        limit: usize,
    ) -> anyhow::Result<Vec<Message>> {
        queries::get_recent_messages(&*self.conn()?, conversation_id, limit)
    }

    async fn create_appointment(&self, appointment: NewAppointment) -> anyhow::Result<Appointment> {
        queries::create_appointment(&*self.conn()?, &appointment)
    }

    async fn get_appointment(&self, id: i64) -> anyhow::Result<Option<Appointment>> {
        queries::get_appointment(&*self.conn()?, id)
    }

    async fn get_user_appointments(&self, user_id: i64) -> anyhow::Result<Vec<Appointment>> {
        queries::get_user_appointments(&*self.conn()?, user_id)
    }

    async fn update_appointment_status(
        &self,
        id: i64,
        status: AppointmentStatus,
    ) -> anyhow::Result<Option<Appointment>> {
        let conn = self.conn()?;
        if !queries::update_appointment_status(&conn, id, status)? {
            return Ok(None);
        }
        queries::get_appointment(&conn, id)
    }
}
