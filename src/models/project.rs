use serde::{Deserialize, Serialize};
use bson::{oid::ObjectId, DateTime as BsonDateTime};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub client_id: String,
    pub title: String,
    pub description: String,

    pub status: String, // "planned", "in_progress", "review", "completed"

    pub budget: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<BsonDateTime>,

    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

// For creating new projects; dates arrive as RFC 3339 strings
#[derive(Debug, Deserialize)]
pub struct CreateProject {
    pub client_id: String,
    pub title: String,
    pub description: String,
    pub budget: f64,
    pub due_date: Option<String>,
}

// For updating projects
#[derive(Debug, Deserialize)]
pub struct UpdateProject {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub budget: Option<f64>,
    pub due_date: Option<String>,
}

// For query parameters
#[derive(Debug, Deserialize)]
pub struct ProjectQuery {
    pub status: Option<String>,
    pub client_id: Option<String>,
}

pub const PROJECT_STATUSES: [&str; 4] = ["planned", "in_progress", "review", "completed"];
