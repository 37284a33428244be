use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use bson::{doc, oid::ObjectId};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{Collection, Database};

use crate::models::message::{
    ApiResponse, ContactRequest, CreateMessage, MarkAsSeenRequest, Message, MessageResponse,
    PaginationQuery,
};
use crate::models::user::{Claims, User, ROLE_ADMIN};
use crate::state::AppState;

// Get collection helper
fn get_message_collection(db: &Database) -> Collection<Message> {
    db.collection("messages")
}

// GET /api/messages
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<PaginationQuery>,
) -> impl IntoResponse {
    let collection = get_message_collection(&state.db);

    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let skip = (page - 1) * limit;

    let filter = doc! {
        "$or": [
            { "recipient_id": &claims.sub },
            { "sender_id": &claims.sub }
        ]
    };

    let total = match collection.count_documents(filter.clone()).await {
        Ok(total) => total,
        Err(err) => {
            tracing::error!("Error counting messages: {}", err);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("Failed to count messages: {}", err))),
            );
        }
    };

    let cursor = collection
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .skip(skip)
        .limit(limit as i64)
        .await;

    match cursor {
        Ok(cursor) => {
            let messages: Vec<Message> = match cursor.try_collect().await {
                Ok(messages) => messages,
                Err(err) => {
                    tracing::error!("Error draining message cursor: {}", err);
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(ApiResponse::error(format!("Failed to fetch messages: {}", err))),
                    );
                }
            };
            let messages: Vec<MessageResponse> =
                messages.into_iter().map(MessageResponse::from).collect();

            let response = serde_json::json!({
                "messages": messages,
                "total": total,
                "page": page,
                "limit": limit,
                "totalPages": (total as f64 / limit as f64).ceil() as i64
            });

            (StatusCode::OK, Json(ApiResponse::success(response)))
        }
        Err(err) => {
            tracing::error!("Error fetching messages: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("Failed to fetch messages: {}", err))),
            )
        }
    }
}

// POST /api/messages
pub async fn create_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateMessage>,
) -> impl IntoResponse {
    if payload.body.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Message body cannot be empty")),
        );
    }

    let users: Collection<User> = state.db.collection("users");
    let sender_name = match ObjectId::parse_str(&claims.sub) {
        Ok(id) => match users.find_one(doc! { "_id": id }).await {
            Ok(Some(user)) => user.name,
            _ => claims.email.clone(),
        },
        Err(_) => claims.email.clone(),
    };

    let collection = get_message_collection(&state.db);

    let message = Message {
        id: None,
        sender_id: claims.sub.clone(),
        recipient_id: payload.recipient_id.clone(),
        sender_name,
        subject: payload.subject.clone(),
        body: payload.body.clone(),
        seen: false,
        created_at: Utc::now(),
    };

    match collection.insert_one(&message).await {
        Ok(insert_result) => {
            let mut saved = message;
            saved.id = insert_result.inserted_id.as_object_id();
            tracing::info!("Message sent from {} to {}", saved.sender_id, saved.recipient_id);
            (
                StatusCode::CREATED,
                Json(ApiResponse::success(MessageResponse::from(saved))),
            )
        }
        Err(err) => {
            tracing::error!("Error saving message: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("Failed to save message: {}", err))),
            )
        }
    }
}

// PUT /api/messages/seen
pub async fn mark_as_seen(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<MarkAsSeenRequest>,
) -> impl IntoResponse {
    let collection = get_message_collection(&state.db);

    let mut object_ids = Vec::new();
    for id in &payload.message_ids {
        match ObjectId::parse_str(id) {
            Ok(object_id) => object_ids.push(object_id),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error(format!("Invalid message ID: {}", id))),
                );
            }
        }
    }

    // only the recipient may mark a message seen
    let filter = doc! {
        "_id": { "$in": object_ids },
        "recipient_id": &claims.sub
    };

    match collection.update_many(filter, doc! { "$set": { "seen": true } }).await {
        Ok(result) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "modified": result.modified_count
            }))),
        ),
        Err(err) => {
            tracing::error!("Error marking messages seen: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("Failed to update messages: {}", err))),
            )
        }
    }
}

// POST /api/contact - public marketing-site inquiry form
//
// Stored as a message addressed to the first admin account so it lands in
// the dashboard inbox alongside client messages.
pub async fn submit_contact(
    State(state): State<AppState>,
    Json(payload): Json<ContactRequest>,
) -> impl IntoResponse {
    if payload.body.trim().is_empty() || payload.name.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Name and message are required")),
        );
    }

    let users: Collection<User> = state.db.collection("users");
    let admin = match users.find_one(doc! { "role": ROLE_ADMIN }).await {
        Ok(Some(admin)) => admin,
        Ok(None) => {
            tracing::error!("Contact form submitted but no admin account exists");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::error("Inbox unavailable")),
            );
        }
        Err(err) => {
            tracing::error!("Error looking up admin inbox: {}", err);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Failed to submit inquiry")),
            );
        }
    };

    let collection = get_message_collection(&state.db);

    let message = Message {
        id: None,
        sender_id: format!("contact:{}", payload.email),
        recipient_id: admin._id.map(|id| id.to_hex()).unwrap_or_default(),
        sender_name: payload.name.clone(),
        subject: payload.subject.clone(),
        body: payload.body.clone(),
        seen: false,
        created_at: Utc::now(),
    };

    match collection.insert_one(&message).await {
        Ok(_) => {
            tracing::info!("Contact inquiry received from {}", payload.email);
            (
                StatusCode::CREATED,
                Json(ApiResponse::success(serde_json::json!({
                    "received": true
                }))),
            )
        }
        Err(err) => {
            tracing::error!("Error saving contact inquiry: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Failed to submit inquiry")),
            )
        }
    }
}
