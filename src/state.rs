use std::sync::Arc;
use mongodb::Database;

use crate::config::AppConfig;
use crate::errors::Result;
use crate::services::mail_service::MailService;
use crate::services::reset_service::{MongoResetStore, ResetService};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub jwt_secret: String,
    pub reset_service: Arc<ResetService>,
}

impl AppState {
    pub fn new(db: Database, config: &AppConfig) -> Result<Self> {
        let mailer = Arc::new(MailService::new(config)?);
        let store = Arc::new(MongoResetStore::new(db.clone()));
        let reset_service = Arc::new(ResetService::new(store, mailer));

        Ok(AppState {
            db,
            jwt_secret: config.jwt_secret.clone(),
            reset_service,
        })
    }
}
