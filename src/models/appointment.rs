use serde::{Deserialize, Serialize};
use bson::{oid::ObjectId, DateTime as BsonDateTime};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub client_id: String,
    pub topic: String,

    pub scheduled_for: BsonDateTime,
    pub duration_minutes: i32,

    pub status: String, // "requested", "confirmed", "cancelled", "completed"

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

// Scheduling times arrive as RFC 3339 strings
#[derive(Debug, Deserialize)]
pub struct CreateAppointment {
    pub client_id: String,
    pub topic: String,
    pub scheduled_for: String,
    pub duration_minutes: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAppointment {
    pub topic: Option<String>,
    pub scheduled_for: Option<String>,
    pub duration_minutes: Option<i32>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentQuery {
    pub status: Option<String>,
    pub client_id: Option<String>,
}

pub const APPOINTMENT_STATUSES: [&str; 4] = ["requested", "confirmed", "cancelled", "completed"];
