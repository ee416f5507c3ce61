use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Appointment, AppointmentStatus, Conversation, Message, MessageMetadata, MessageRole,
    NewAppointment, NewMessage,
};

const CONVERSATION_COLUMNS: &str = "id, user_id, title, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, conversation_id, content, role, timestamp, metadata";
const APPOINTMENT_COLUMNS: &str =
    "id, user_id, message_id, summary, start_time, end_time, calendar_event_id, status, created_at";

// Millisecond RFC 3339 in UTC sorts lexicographically.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ── Conversations ──

pub fn create_conversation(
    conn: &Connection,
    user_id: i64,
    title: &str,
) -> anyhow::Result<Conversation> {
    let now = Utc::now();
    let ts = format_timestamp(&now);
    conn.execute(
        "INSERT INTO conversations (user_id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, title, ts, ts],
    )?;

    Ok(Conversation {
        id: conn.last_insert_rowid(),
        user_id,
        title: title.to_string(),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_conversation(conn: &Connection, id: i64) -> anyhow::Result<Option<Conversation>> {
    let conversation = conn
        .query_row(
            &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
            params![id],
            parse_conversation_row,
        )
        .optional()?;
    Ok(conversation)
}

pub fn get_user_conversations(conn: &Connection, user_id: i64) -> anyhow::Result<Vec<Conversation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user_id = ?1 ORDER BY updated_at DESC, id DESC"
    ))?;

    let rows = stmt.query_map(params![user_id], parse_conversation_row)?;

    let mut conversations = vec![];
    for row in rows {
        conversations.push(row?);
    }
    Ok(conversations)
}

pub fn touch_conversation(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let now = format_timestamp(&Utc::now());
    let count = conn.execute(
        "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
        params![now, id],
    )?;
    Ok(count > 0)
}

fn parse_conversation_row(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
    let created_at: String = row.get(3)?;
    let updated_at: String = row.get(4)?;
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

// ── Messages ──

pub fn create_message(conn: &Connection, message: &NewMessage) -> anyhow::Result<Message> {
    let now = Utc::now();
    let metadata = message.metadata.to_column()?;
    conn.execute(
        "INSERT INTO messages (conversation_id, content, role, timestamp, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            message.conversation_id,
            message.content,
            message.role.as_str(),
            format_timestamp(&now),
            metadata,
        ],
    )?;

    Ok(Message {
        id: conn.last_insert_rowid(),
        conversation_id: message.conversation_id,
        content: message.content.clone(),
        role: message.role,
        timestamp: now,
        metadata: message.metadata.clone(),
    })
}

pub fn get_conversation_messages(
    conn: &Connection,
    conversation_id: i64,
) -> anyhow::Result<Vec<Message>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1 ORDER BY timestamp ASC, id ASC"
    ))?;

    let rows = stmt.query_map(params![conversation_id], parse_message_row)?;

    let mut messages = vec![];
    for row in rows {
        messages.push(row?);
    }
    Ok(messages)
}

/// The `limit` most recent messages, oldest first.
pub fn get_recent_messages(
    conn: &Connection,
    conversation_id: i64,
    limit: usize,
) -> anyhow::Result<Vec<Message>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1
         ORDER BY timestamp DESC, id DESC LIMIT ?2"
    ))?;

    let rows = stmt.query_map(params![conversation_id, limit as i64], parse_message_row)?;

    let mut messages = vec![];
    for row in rows {
        messages.push(row?);
    }
    messages.reverse();
    Ok(messages)
}

fn parse_message_row(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let role: String = row.get(3)?;
    let timestamp: String = row.get(4)?;
    let metadata: Option<String> = row.get(5)?;
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        content: row.get(2)?,
        role: MessageRole::parse(&role),
        timestamp: parse_timestamp(&timestamp),
        metadata: MessageMetadata::from_column(metadata.as_deref()),
    })
}

// ── Appointments ──

pub fn create_appointment(
    conn: &Connection,
    appointment: &NewAppointment,
) -> anyhow::Result<Appointment> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO appointments (user_id, message_id, summary, start_time, end_time, calendar_event_id, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            appointment.user_id,
            appointment.message_id,
            appointment.summary,
            format_timestamp(&appointment.start_time),
            format_timestamp(&appointment.end_time),
            appointment.calendar_event_id,
            appointment.status.as_str(),
            format_timestamp(&now),
        ],
    )?;

    Ok(Appointment {
        id: conn.last_insert_rowid(),
        user_id: appointment.user_id,
        message_id: appointment.message_id,
        summary: appointment.summary.clone(),
        start_time: appointment.start_time,
        end_time: appointment.end_time,
        calendar_event_id: appointment.calendar_event_id.clone(),
        status: appointment.status,
        created_at: now,
    })
}

pub fn get_appointment(conn: &Connection, id: i64) -> anyhow::Result<Option<Appointment>> {
    let appointment = conn
        .query_row(
            &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
            params![id],
            parse_appointment_row,
        )
        .optional()?;
    Ok(appointment)
}

pub fn get_user_appointments(conn: &Connection, user_id: i64) -> anyhow::Result<Vec<Appointment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE user_id = ?1 ORDER BY id ASC"
    ))?;

    let rows = stmt.query_map(params![user_id], parse_appointment_row)?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row?);
    }
    Ok(appointments)
}

pub fn update_appointment_status(
    conn: &Connection,
    id: i64,
    status: AppointmentStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    Ok(count > 0)
}

fn parse_appointment_row(row: &rusqlite::Row) -> rusqlite::Result<Appointment> {
    let start_time: String = row.get(4)?;
    let end_time: String = row.get(5)?;
    let status: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    Ok(Appointment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        message_id: row.get(2)?,
        summary: row.get(3)?,
        start_time: parse_timestamp(&start_time),
        end_time: parse_timestamp(&end_time),
        calendar_event_id: row.get(6)?,
        status: AppointmentStatus::parse(&status).unwrap_or(AppointmentStatus::Scheduled),
        created_at: parse_timestamp(&created_at),
    })
}
