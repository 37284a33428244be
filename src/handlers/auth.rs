use axum::{
    extract::State,
    response::Json,
    Extension,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use jsonwebtoken::{encode, EncodingKey, Header};
use chrono::Utc;
use mongodb::Collection;
use mongodb::bson::{doc, oid::ObjectId};
use futures_util::TryStreamExt;
use validator::Validate;

use crate::state::AppState;
use crate::errors::{AppError, Result};
use crate::models::user::{
    AuthResponse, Claims, CreateUser, LoginUser, User, UserResponse, ROLE_ADMIN, ROLE_CLIENT,
};

fn issue_token(user: &User, secret: &str) -> Result<String> {
    let claims = Claims {
        sub: user._id.map(|id| id.to_hex()).unwrap_or_default(),
        email: user.email.clone(),
        role: user.role.clone(),
        exp: (Utc::now().timestamp() + 86400) as usize, // 24 hours
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .map_err(|_| AppError::AuthError)
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<CreateUser>,
) -> Result<Json<AuthResponse>> {
    if let Err(errors) = payload.validate() {
        return Err(AppError::invalid_data(format!("{}", errors)));
    }

    let collection: Collection<User> = state.db.collection("users");
    let email = payload.email.trim().to_lowercase();

    let existing_user = collection.find_one(doc! { "email": &email }).await?;
    if existing_user.is_some() {
        return Err(AppError::DuplicateKey);
    }

    let password_hash = hash(&payload.password, DEFAULT_COST)
        .map_err(|_| AppError::InvalidUserData)?;

    let mut user = User {
        _id: None,
        name: payload.name.clone(),
        email,
        password_hash,
        role: ROLE_CLIENT.to_string(),
        company: payload.company.clone(),
        phone: payload.phone.clone(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let insert_result = collection.insert_one(&user).await?;
    let inserted_id = insert_result
        .inserted_id
        .as_object_id()
        .ok_or_else(|| AppError::service("Inserted user is missing an ObjectId"))?;
    user._id = Some(inserted_id);

    let token = issue_token(&user, &state.jwt_secret)?;

    tracing::info!("Registered new client account {}", user.email);

    Ok(Json(AuthResponse {
        user: UserResponse::from(user),
        token,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginUser>,
) -> Result<Json<AuthResponse>> {
    let collection: Collection<User> = state.db.collection("users");
    let email = payload.email.trim().to_lowercase();

    let user = collection
        .find_one(doc! { "email": &email })
        .await?
        .ok_or(AppError::AuthError)?;

    let valid = verify(&payload.password, &user.password_hash)
        .map_err(|_| AppError::AuthError)?;
    if !valid {
        return Err(AppError::AuthError);
    }

    let token = issue_token(&user, &state.jwt_secret)?;

    Ok(Json(AuthResponse {
        user: UserResponse::from(user),
        token,
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserResponse>> {
    let collection: Collection<User> = state.db.collection("users");

    let object_id = ObjectId::parse_str(&claims.sub)
        .map_err(|_| AppError::invalid_data("Invalid user ID"))?;

    let user = collection
        .find_one(doc! { "_id": object_id })
        .await?
        .ok_or(AppError::DocumentNotFound)?;

    Ok(Json(UserResponse::from(user)))
}

pub async fn get_all_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<UserResponse>>> {
    if claims.role != ROLE_ADMIN {
        return Err(AppError::Unauthorized);
    }

    let collection: Collection<User> = state.db.collection("users");

    let cursor = collection.find(doc! {}).await?;
    let users: Vec<User> = cursor.try_collect().await?;

    let user_responses: Vec<UserResponse> =
        users.into_iter().map(UserResponse::from).collect();

    Ok(Json(user_responses))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    fn sample_user() -> User {
        User {
            _id: Some(ObjectId::new()),
            name: "Ada Client".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "hash".to_string(),
            role: crate::models::user::ROLE_CLIENT.to_string(),
            company: None,
            phone: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn issued_token_round_trips() {
        let user = sample_user();
        let token = issue_token(&user, "test-secret").unwrap();

        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret("test-secret".as_ref()),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();

        assert_eq!(decoded.claims.sub, user._id.unwrap().to_hex());
        assert_eq!(decoded.claims.email, "ada@example.com");
        assert_eq!(decoded.claims.role, "client");
    }

    #[test]
    fn issued_token_rejects_wrong_secret() {
        let user = sample_user();
        let token = issue_token(&user, "test-secret").unwrap();

        let result = decode::<Claims>(
            &token,
            &DecodingKey::from_secret("other-secret".as_ref()),
            &Validation::new(Algorithm::HS256),
        );

        assert!(result.is_err());
    }
}
