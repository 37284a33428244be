use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};
use mongodb::Collection;
use futures_util::TryStreamExt;

use crate::state::AppState;
use crate::errors::{AppError, Result};
use crate::models::appointment::{
    Appointment, AppointmentQuery, CreateAppointment, UpdateAppointment, APPOINTMENT_STATUSES,
};
use crate::models::user::{Claims, ROLE_ADMIN};

fn get_appointment_collection(state: &AppState) -> Collection<Appointment> {
    state.db.collection("appointments")
}

fn parse_datetime(value: &str) -> Result<BsonDateTime> {
    let parsed = chrono::DateTime::parse_from_rfc3339(value)
        .map_err(|_| AppError::invalid_data(format!("Invalid datetime: {}", value)))?;
    Ok(BsonDateTime::from_millis(parsed.timestamp_millis()))
}

pub async fn get_appointments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<AppointmentQuery>,
) -> Result<Json<Vec<Appointment>>> {
    let collection = get_appointment_collection(&state);
    let mut filter = doc! {};

    if claims.role != ROLE_ADMIN {
        filter.insert("client_id", &claims.sub);
    } else if let Some(client_id) = &query.client_id {
        filter.insert("client_id", client_id);
    }

    if let Some(status) = &query.status {
        filter.insert("status", status);
    }

    let cursor = collection.find(filter).await?;
    let mut appointments: Vec<Appointment> = cursor.try_collect().await?;

    // soonest first
    appointments.sort_by(|a, b| a.scheduled_for.cmp(&b.scheduled_for));

    Ok(Json(appointments))
}

pub async fn get_appointment_by_id(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<Appointment>> {
    let collection = get_appointment_collection(&state);

    let object_id = ObjectId::parse_str(&id)
        .map_err(|_| AppError::invalid_data("Invalid appointment ID format"))?;

    let appointment = collection
        .find_one(doc! { "_id": object_id })
        .await?
        .ok_or(AppError::DocumentNotFound)?;

    if claims.role != ROLE_ADMIN && appointment.client_id != claims.sub {
        return Err(AppError::Unauthorized);
    }

    Ok(Json(appointment))
}

// Clients book for themselves; admins may book on a client's behalf.
pub async fn create_appointment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateAppointment>,
) -> Result<Json<Appointment>> {
    let client_id = if claims.role == ROLE_ADMIN {
        payload.client_id
    } else {
        claims.sub.clone()
    };

    if payload.duration_minutes <= 0 {
        return Err(AppError::invalid_data("Duration must be positive"));
    }

    let scheduled_for = parse_datetime(&payload.scheduled_for)?;

    let collection = get_appointment_collection(&state);
    let now = BsonDateTime::now();

    let mut appointment = Appointment {
        id: None,
        client_id,
        topic: payload.topic,
        scheduled_for,
        duration_minutes: payload.duration_minutes,
        status: "requested".to_string(),
        notes: payload.notes,
        created_at: now,
        updated_at: now,
    };

    let insert_result = collection.insert_one(&appointment).await?;
    appointment.id = insert_result.inserted_id.as_object_id();

    tracing::info!("Appointment requested for client {}", appointment.client_id);

    Ok(Json(appointment))
}

pub async fn update_appointment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateAppointment>,
) -> Result<Json<Appointment>> {
    let collection = get_appointment_collection(&state);

    let object_id = ObjectId::parse_str(&id)
        .map_err(|_| AppError::invalid_data("Invalid appointment ID format"))?;

    let existing = collection
        .find_one(doc! { "_id": object_id })
        .await?
        .ok_or(AppError::DocumentNotFound)?;

    // a client may only touch their own appointment, and only to cancel it
    if claims.role != ROLE_ADMIN {
        if existing.client_id != claims.sub {
            return Err(AppError::Unauthorized);
        }
        if payload.status.as_deref() != Some("cancelled")
            || payload.topic.is_some()
            || payload.scheduled_for.is_some()
            || payload.duration_minutes.is_some()
            || payload.notes.is_some()
        {
            return Err(AppError::Unauthorized);
        }
    }

    if let Some(status) = &payload.status {
        if !APPOINTMENT_STATUSES.contains(&status.as_str()) {
            return Err(AppError::invalid_data(format!("Unknown appointment status: {}", status)));
        }
    }

    let mut set = doc! { "updated_at": BsonDateTime::now() };
    if let Some(topic) = &payload.topic {
        set.insert("topic", topic);
    }
    if let Some(scheduled_for) = &payload.scheduled_for {
        set.insert("scheduled_for", parse_datetime(scheduled_for)?);
    }
    if let Some(duration_minutes) = payload.duration_minutes {
        set.insert("duration_minutes", duration_minutes);
    }
    if let Some(status) = &payload.status {
        set.insert("status", status);
    }
    if let Some(notes) = &payload.notes {
        set.insert("notes", notes);
    }

    collection
        .update_one(doc! { "_id": object_id }, doc! { "$set": set })
        .await?;

    let appointment = collection
        .find_one(doc! { "_id": object_id })
        .await?
        .ok_or(AppError::DocumentNotFound)?;

    Ok(Json(appointment))
}

pub async fn delete_appointment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    if claims.role != ROLE_ADMIN {
        return Err(AppError::Unauthorized);
    }

    let collection = get_appointment_collection(&state);

    let object_id = ObjectId::parse_str(&id)
        .map_err(|_| AppError::invalid_data("Invalid appointment ID format"))?;

    let result = collection.delete_one(doc! { "_id": object_id }).await?;
    if result.deleted_count == 0 {
        return Err(AppError::DocumentNotFound);
    }

    Ok(Json(serde_json::json!({ "success": true })))
}
