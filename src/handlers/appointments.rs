use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{Appointment, AppointmentStatus};
use crate::services::calendar::ics::generate_ics;
use crate::state::AppState;

// GET /api/appointments
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let appointments = state
        .store
        .get_user_appointments(state.config.default_user_id)
        .await?;
    Ok(Json(appointments))
}

// GET /api/appointments/:id
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Appointment>, AppError> {
    Ok(Json(owned_appointment(&state, id).await?))
}

#[derive(Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

// PATCH /api/appointments/:id
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<Appointment>, AppError> {
    let Json(update) = payload.map_err(|_| AppError::BadRequest("status is required".to_string()))?;
    let status = AppointmentStatus::parse(&update.status)
        .ok_or_else(|| AppError::BadRequest(format!("unknown status: {}", update.status)))?;

    owned_appointment(&state, id).await?;
    let updated = state
        .store
        .update_appointment_status(id, status)
        .await?
        .ok_or_else(not_found)?;

    tracing::info!(appointment_id = id, status = status.as_str(), "appointment status updated");
    Ok(Json(updated))
}

// GET /api/appointments/:id/ics
pub async fn download_ics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let appointment = owned_appointment(&state, id).await?;
    let ics = generate_ics(&appointment);
    let filename = format!("appointment-{id}.ics");

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        ics,
    )
        .into_response())
}

async fn owned_appointment(state: &AppState, id: i64) -> Result<Appointment, AppError> {
    state
        .store
        .get_appointment(id)
        .await?
        .filter(|a| a.user_id == state.config.default_user_id)
        .ok_or_else(not_found)
}

fn not_found() -> AppError {
    AppError::NotFound("Appointment not found".to_string())
}
