use std::sync::Arc;

use async_trait::async_trait;
use bcrypt::{hash, DEFAULT_COST};
use mongodb::bson::{doc, DateTime};
use mongodb::{Collection, Database};
use rand::Rng;
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::reset::PendingReset;
use crate::models::user::User;
use crate::services::mail_service::ResetMailer;

/// Store the reset flow runs against: the pending-reset record keyed by
/// email plus the account's password field. Mirrors what the handlers
/// would otherwise reach into MongoDB for, so tests can swap in memory.
#[async_trait]
pub trait ResetStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<PendingReset>>;
    async fn find_by_token(&self, token: &str) -> Result<Option<PendingReset>>;
    async fn upsert(&self, record: &PendingReset) -> Result<()>;
    async fn email_registered(&self, email: &str) -> Result<bool>;
    async fn set_password_hash(&self, email: &str, password_hash: &str) -> Result<()>;
}

pub struct MongoResetStore {
    db: Database,
}

impl MongoResetStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn resets(&self) -> Collection<PendingReset> {
        self.db.collection("password_resets")
    }

    fn users(&self) -> Collection<User> {
        self.db.collection("users")
    }
}

#[async_trait]
impl ResetStore for MongoResetStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<PendingReset>> {
        Ok(self.resets().find_one(doc! { "email": email }).await?)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<PendingReset>> {
        Ok(self.resets().find_one(doc! { "reset_token": token }).await?)
    }

    async fn upsert(&self, record: &PendingReset) -> Result<()> {
        // single-document replace keeps overwrite-on-reissue atomic
        self.resets()
            .replace_one(doc! { "email": &record.email }, record)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn email_registered(&self, email: &str) -> Result<bool> {
        Ok(self.users().find_one(doc! { "email": email }).await?.is_some())
    }

    async fn set_password_hash(&self, email: &str, password_hash: &str) -> Result<()> {
        let now = DateTime::now();
        let result = self
            .users()
            .update_one(
                doc! { "email": email },
                doc! { "$set": { "password_hash": password_hash, "updated_at": now } },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(AppError::DocumentNotFound);
        }
        Ok(())
    }
}

pub struct ResetService {
    store: Arc<dyn ResetStore>,
    mailer: Arc<dyn ResetMailer>,
}

impl ResetService {
    pub fn new(store: Arc<dyn ResetStore>, mailer: Arc<dyn ResetMailer>) -> Self {
        Self { store, mailer }
    }

    // Generate 6-digit reset code, zero-padded
    pub fn generate_code() -> String {
        let mut rng = rand::thread_rng();
        format!("{:06}", rng.gen_range(0..1_000_000))
    }

    // Opaque single-use token; independent of the code
    fn generate_reset_token() -> String {
        Uuid::new_v4().simple().to_string()
    }

    fn normalize_email(email: &str) -> Result<String> {
        let email = email.trim().to_lowercase();
        let well_formed = matches!(
            email.split_once('@'),
            Some((local, domain)) if !local.is_empty() && !domain.is_empty()
        );
        if well_formed {
            Ok(email)
        } else {
            Err(AppError::InvalidEmailFormat)
        }
    }

    /// Issue a fresh code for the email, overwriting any prior pending
    /// code. Unknown accounts get the same acknowledgment with no mail
    /// dispatched, so the endpoint reveals nothing about registration.
    pub async fn request_reset(&self, email: &str) -> Result<()> {
        let email = Self::normalize_email(email)?;
        let now = DateTime::now();

        let existing = self.store.find_by_email(&email).await?;
        if let Some(record) = &existing {
            if !record.issuance_allowed(now) {
                tracing::warn!("Reset request throttled for {}", email);
                return Err(AppError::RateLimitExceeded);
            }
        }

        if !self.store.email_registered(&email).await? {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        }

        let code = Self::generate_code();
        let record = match existing {
            Some(mut record) => {
                record.reissue(code.as_str(), now);
                record
            }
            None => PendingReset::new(email.clone(), code.as_str(), now),
        };
        self.store.upsert(&record).await?;

        // delivery failure propagates; it must not look like success
        self.mailer.send_reset_code(&email, &code).await?;

        tracing::info!("Reset code issued for {}", email);
        Ok(())
    }

    /// Exchange a valid code for a fresh reset token. The code dies on
    /// success; repeated failures lock the record until a new code is
    /// issued.
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<String> {
        let email = Self::normalize_email(email)?;
        let now = DateTime::now();

        let mut record = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or(AppError::InvalidCode)?;

        if record.consumed || record.reset_token.is_some() || record.locked_out() {
            return Err(AppError::InvalidCode);
        }

        if record.code_expired(now) {
            tracing::info!("Expired reset code presented for {}", email);
            return Err(AppError::ExpiredCode);
        }

        if record.code != code {
            record.failed_attempts += 1;
            if record.locked_out() {
                tracing::warn!(
                    "Reset code locked after {} failed attempts for {}",
                    record.failed_attempts,
                    email
                );
            }
            self.store.upsert(&record).await?;
            return Err(AppError::InvalidCode);
        }

        let token = Self::generate_reset_token();
        record.promote(token.as_str(), now);
        self.store.upsert(&record).await?;

        tracing::info!("Reset code verified for {}", email);
        Ok(token)
    }

    /// Exchange an unconsumed, unexpired token for a password change.
    /// Password preconditions are checked before the store is touched.
    pub async fn reset_password(
        &self,
        reset_token: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<()> {
        if new_password != confirm_password {
            return Err(AppError::PasswordMismatch);
        }
        if new_password.len() < 6 {
            return Err(AppError::PasswordTooWeak);
        }

        let now = DateTime::now();
        let mut record = self
            .store
            .find_by_token(reset_token)
            .await?
            .ok_or(AppError::InvalidToken)?;

        if !record.token_active(now) {
            return Err(AppError::InvalidToken);
        }

        let password_hash = hash(new_password, DEFAULT_COST)
            .map_err(|e| AppError::service(format!("Password hashing failed: {}", e)))?;

        self.store.set_password_hash(&record.email, &password_hash).await?;

        record.consumed = true;
        self.store.upsert(&record).await?;

        tracing::info!("Password reset completed for {}", record.email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::models::reset::{
        CODE_TTL_MINUTES, MAX_REQUESTS_PER_WINDOW, MAX_VERIFY_ATTEMPTS, TOKEN_TTL_MINUTES,
    };

    #[derive(Default)]
    struct MemoryResetStore {
        resets: Mutex<HashMap<String, PendingReset>>,
        users: Mutex<HashMap<String, String>>,
    }

    impl MemoryResetStore {
        fn with_user(email: &str) -> Self {
            let store = Self::default();
            store
                .users
                .lock()
                .unwrap()
                .insert(email.to_string(), "old-hash".to_string());
            store
        }

        fn stored(&self, email: &str) -> Option<PendingReset> {
            self.resets.lock().unwrap().get(email).cloned()
        }

        fn password_hash(&self, email: &str) -> Option<String> {
            self.users.lock().unwrap().get(email).cloned()
        }
    }

    #[async_trait]
    impl ResetStore for MemoryResetStore {
        async fn find_by_email(&self, email: &str) -> Result<Option<PendingReset>> {
            Ok(self.resets.lock().unwrap().get(email).cloned())
        }

        async fn find_by_token(&self, token: &str) -> Result<Option<PendingReset>> {
            Ok(self
                .resets
                .lock()
                .unwrap()
                .values()
                .find(|r| r.reset_token.as_deref() == Some(token))
                .cloned())
        }

        async fn upsert(&self, record: &PendingReset) -> Result<()> {
            self.resets
                .lock()
                .unwrap()
                .insert(record.email.clone(), record.clone());
            Ok(())
        }

        async fn email_registered(&self, email: &str) -> Result<bool> {
            Ok(self.users.lock().unwrap().contains_key(email))
        }

        async fn set_password_hash(&self, email: &str, password_hash: &str) -> Result<()> {
            let mut users = self.users.lock().unwrap();
            match users.get_mut(email) {
                Some(hash) => {
                    *hash = password_hash.to_string();
                    Ok(())
                }
                None => Err(AppError::DocumentNotFound),
            }
        }
    }

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl RecordingMailer {
        fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn sent_codes(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(_, code)| code.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ResetMailer for RecordingMailer {
        async fn send_reset_code(&self, to: &str, code: &str) -> Result<()> {
            if self.fail {
                return Err(AppError::delivery("SMTP connection refused"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), code.to_string()));
            Ok(())
        }
    }

    const EMAIL: &str = "user@example.com";
    const MINUTE_MILLIS: i64 = 60_000;

    fn service_with(
        store: Arc<MemoryResetStore>,
        mailer: Arc<RecordingMailer>,
    ) -> ResetService {
        ResetService::new(store, mailer)
    }

    fn service() -> (ResetService, Arc<MemoryResetStore>, Arc<RecordingMailer>) {
        let store = Arc::new(MemoryResetStore::with_user(EMAIL));
        let mailer = Arc::new(RecordingMailer::default());
        (service_with(store.clone(), mailer.clone()), store, mailer)
    }

    fn backdate_code(store: &MemoryResetStore, email: &str, minutes: i64) {
        let mut resets = store.resets.lock().unwrap();
        let record = resets.get_mut(email).unwrap();
        record.code_created_at = DateTime::from_millis(
            record.code_created_at.timestamp_millis() - minutes * MINUTE_MILLIS,
        );
    }

    fn backdate_token(store: &MemoryResetStore, email: &str, minutes: i64) {
        let mut resets = store.resets.lock().unwrap();
        let record = resets.get_mut(email).unwrap();
        let created = record.token_created_at.unwrap();
        record.token_created_at = Some(DateTime::from_millis(
            created.timestamp_millis() - minutes * MINUTE_MILLIS,
        ));
    }

    #[tokio::test]
    async fn request_issues_code_and_sends_mail() {
        let (service, store, mailer) = service();

        service.request_reset(EMAIL).await.unwrap();

        let record = store.stored(EMAIL).unwrap();
        assert_eq!(record.code.len(), 6);
        assert!(record.code.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(mailer.sent_codes(), vec![record.code.clone()]);
    }

    #[tokio::test]
    async fn second_request_invalidates_first_code() {
        let (service, store, mailer) = service();

        service.request_reset(EMAIL).await.unwrap();
        let first_code = mailer.sent_codes()[0].clone();

        // re-request until the fresh code differs (codes are random)
        let mut second_code = first_code.clone();
        for _ in 0..3 {
            service.request_reset(EMAIL).await.unwrap();
            second_code = mailer.sent_codes().last().unwrap().clone();
            if second_code != first_code {
                break;
            }
        }
        assert_ne!(first_code, second_code);
        assert_eq!(store.stored(EMAIL).unwrap().code, second_code);

        let err = service.verify_code(EMAIL, &first_code).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCode));

        service.verify_code(EMAIL, &second_code).await.unwrap();
    }

    #[tokio::test]
    async fn verified_code_cannot_be_verified_again() {
        let (service, _store, mailer) = service();

        service.request_reset(EMAIL).await.unwrap();
        let code = mailer.sent_codes()[0].clone();

        service.verify_code(EMAIL, &code).await.unwrap();

        let err = service.verify_code(EMAIL, &code).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCode));
    }

    #[tokio::test]
    async fn code_older_than_thirty_minutes_is_rejected() {
        let (service, store, mailer) = service();

        service.request_reset(EMAIL).await.unwrap();
        let code = mailer.sent_codes()[0].clone();

        backdate_code(&store, EMAIL, CODE_TTL_MINUTES + 1);

        let err = service.verify_code(EMAIL, &code).await.unwrap_err();
        assert!(matches!(err, AppError::ExpiredCode));
    }

    #[tokio::test]
    async fn token_exchanges_exactly_once() {
        let (service, store, mailer) = service();

        service.request_reset(EMAIL).await.unwrap();
        let code = mailer.sent_codes()[0].clone();
        let token = service.verify_code(EMAIL, &code).await.unwrap();

        service
            .reset_password(&token, "secret1", "secret1")
            .await
            .unwrap();
        assert_ne!(store.password_hash(EMAIL).unwrap(), "old-hash");

        let err = service
            .reset_password(&token, "secret2", "secret2")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }

    #[tokio::test]
    async fn token_expires_after_its_window() {
        let (service, store, mailer) = service();

        service.request_reset(EMAIL).await.unwrap();
        let code = mailer.sent_codes()[0].clone();
        let token = service.verify_code(EMAIL, &code).await.unwrap();

        backdate_token(&store, EMAIL, TOKEN_TTL_MINUTES + 1);

        let err = service
            .reset_password(&token, "secret1", "secret1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }

    #[tokio::test]
    async fn password_preconditions_checked_before_store() {
        let (service, store, _mailer) = service();

        // mismatched confirmation wins over the missing token
        let err = service
            .reset_password("no-such-token", "secret1", "secret2")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PasswordMismatch));

        let err = service
            .reset_password("no-such-token", "short", "short")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PasswordTooWeak));

        assert_eq!(store.password_hash(EMAIL).unwrap(), "old-hash");
    }

    #[tokio::test]
    async fn unknown_email_gets_generic_success_and_no_mail() {
        let (service, store, mailer) = service();

        service.request_reset("nobody@example.com").await.unwrap();

        assert!(mailer.sent_codes().is_empty());
        assert!(store.stored("nobody@example.com").is_none());
    }

    #[tokio::test]
    async fn malformed_email_is_rejected() {
        let (service, _store, _mailer) = service();

        for bad in ["not-an-email", "@example.com", "user@", ""] {
            let err = service.request_reset(bad).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidEmailFormat), "{:?}", bad);
        }
    }

    #[tokio::test]
    async fn issuance_is_rate_limited_per_email() {
        let (service, _store, _mailer) = service();

        for _ in 0..MAX_REQUESTS_PER_WINDOW {
            service.request_reset(EMAIL).await.unwrap();
        }

        let err = service.request_reset(EMAIL).await.unwrap_err();
        assert!(matches!(err, AppError::RateLimitExceeded));
    }

    #[tokio::test]
    async fn repeated_failures_lock_the_code() {
        let (service, _store, mailer) = service();

        service.request_reset(EMAIL).await.unwrap();
        let code = mailer.sent_codes()[0].clone();
        let wrong = if code == "000000" { "000001" } else { "000000" };

        for _ in 0..MAX_VERIFY_ATTEMPTS {
            let err = service.verify_code(EMAIL, wrong).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidCode));
        }

        // correct code no longer accepted once locked
        let err = service.verify_code(EMAIL, &code).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCode));
    }

    #[tokio::test]
    async fn delivery_failure_propagates() {
        let store = Arc::new(MemoryResetStore::with_user(EMAIL));
        let mailer = Arc::new(RecordingMailer::failing());
        let service = service_with(store, mailer);

        let err = service.request_reset(EMAIL).await.unwrap_err();
        assert!(matches!(err, AppError::DeliveryFailure(_)));
    }

    #[tokio::test]
    async fn full_reset_scenario() {
        let (service, store, mailer) = service();

        service.request_reset(EMAIL).await.unwrap();
        let code = mailer.sent_codes()[0].clone();

        let token = service.verify_code(EMAIL, &code).await.unwrap();
        service
            .reset_password(&token, "secret1", "secret1")
            .await
            .unwrap();

        let hash = store.password_hash(EMAIL).unwrap();
        assert!(bcrypt::verify("secret1", &hash).unwrap());

        let err = service
            .reset_password(&token, "secret1", "secret1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }
}
