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
use crate::models::project::{
    CreateProject, Project, ProjectQuery, UpdateProject, PROJECT_STATUSES,
};
use crate::models::user::{Claims, ROLE_ADMIN};

fn get_project_collection(state: &AppState) -> Collection<Project> {
    state.db.collection("projects")
}

fn parse_datetime(value: &str) -> Result<BsonDateTime> {
    let parsed = chrono::DateTime::parse_from_rfc3339(value)
        .map_err(|_| AppError::invalid_data(format!("Invalid datetime: {}", value)))?;
    Ok(BsonDateTime::from_millis(parsed.timestamp_millis()))
}

pub async fn get_projects(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ProjectQuery>,
) -> Result<Json<Vec<Project>>> {
    let collection = get_project_collection(&state);
    let mut filter = doc! {};

    // clients only ever see their own projects
    if claims.role != ROLE_ADMIN {
        filter.insert("client_id", &claims.sub);
    } else if let Some(client_id) = &query.client_id {
        filter.insert("client_id", client_id);
    }

    if let Some(status) = &query.status {
        filter.insert("status", status);
    }

    let cursor = collection.find(filter).await?;
    let mut projects: Vec<Project> = cursor.try_collect().await?;

    // most recently updated first
    projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    Ok(Json(projects))
}

pub async fn get_project_by_id(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<Project>> {
    let collection = get_project_collection(&state);

    let object_id = ObjectId::parse_str(&id)
        .map_err(|_| AppError::invalid_data("Invalid project ID format"))?;

    let project = collection
        .find_one(doc! { "_id": object_id })
        .await?
        .ok_or(AppError::DocumentNotFound)?;

    if claims.role != ROLE_ADMIN && project.client_id != claims.sub {
        return Err(AppError::Unauthorized);
    }

    Ok(Json(project))
}

pub async fn create_project(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateProject>,
) -> Result<Json<Project>> {
    if claims.role != ROLE_ADMIN {
        return Err(AppError::Unauthorized);
    }

    let due_date = match &payload.due_date {
        Some(value) => Some(parse_datetime(value)?),
        None => None,
    };

    let collection = get_project_collection(&state);
    let now = BsonDateTime::now();

    let mut project = Project {
        id: None,
        client_id: payload.client_id,
        title: payload.title,
        description: payload.description,
        status: "planned".to_string(),
        budget: payload.budget,
        due_date,
        created_at: now,
        updated_at: now,
    };

    let insert_result = collection.insert_one(&project).await?;
    project.id = insert_result.inserted_id.as_object_id();

    tracing::info!("Created project '{}' for client {}", project.title, project.client_id);

    Ok(Json(project))
}

pub async fn update_project(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateProject>,
) -> Result<Json<Project>> {
    if claims.role != ROLE_ADMIN {
        return Err(AppError::Unauthorized);
    }

    let collection = get_project_collection(&state);

    let object_id = ObjectId::parse_str(&id)
        .map_err(|_| AppError::invalid_data("Invalid project ID format"))?;

    if let Some(status) = &payload.status {
        if !PROJECT_STATUSES.contains(&status.as_str()) {
            return Err(AppError::invalid_data(format!("Unknown project status: {}", status)));
        }
    }

    let mut set = doc! { "updated_at": BsonDateTime::now() };
    if let Some(title) = &payload.title {
        set.insert("title", title);
    }
    if let Some(description) = &payload.description {
        set.insert("description", description);
    }
    if let Some(status) = &payload.status {
        set.insert("status", status);
    }
    if let Some(budget) = payload.budget {
        set.insert("budget", budget);
    }
    if let Some(due_date) = &payload.due_date {
        set.insert("due_date", parse_datetime(due_date)?);
    }

    let result = collection
        .update_one(doc! { "_id": object_id }, doc! { "$set": set })
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::DocumentNotFound);
    }

    let project = collection
        .find_one(doc! { "_id": object_id })
        .await?
        .ok_or(AppError::DocumentNotFound)?;

    Ok(Json(project))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    if claims.role != ROLE_ADMIN {
        return Err(AppError::Unauthorized);
    }

    let collection = get_project_collection(&state);

    let object_id = ObjectId::parse_str(&id)
        .map_err(|_| AppError::invalid_data("Invalid project ID format"))?;

    let result = collection.delete_one(doc! { "_id": object_id }).await?;
    if result.deleted_count == 0 {
        return Err(AppError::DocumentNotFound);
    }

    Ok(Json(serde_json::json!({ "success": true })))
}
