//! Process-wide service context, constructed once at startup and injected
//! into every handler through axum's `State` extractor.

use std::sync::Arc;

use sqlx::PgPool;

use crate::mailer::Mailer;
use crate::uploads::UploadStore;

/// Insecure fallback; startup refuses it in production.
pub const DEFAULT_SESSION_SECRET: &str = "default-session-secret-change-in-production";

/// Shared collaborators of every request: the database pool (absent when
/// DATABASE_URL is not configured — data routes answer 503), the upload
/// store, the mailer, and the session-signing secret.
#[derive(Clone)]
pub struct AppState {
    pub db: Option<PgPool>,
    pub uploads: UploadStore,
    pub mailer: Mailer,
    pub session_secret: Arc<str>,
}

impl AppState {
    pub fn from_env(db: Option<PgPool>) -> Self {
        let upload_root = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string());
        let session_secret = std::env::var("SESSION_SECRET")
            .unwrap_or_else(|_| DEFAULT_SESSION_SECRET.to_string());

        Self {
            db,
            uploads: UploadStore::new(upload_root),
            mailer: Mailer::from_env(),
            session_secret: session_secret.into(),
        }
    }

    /// Context without a database, with a temp upload root and a log-only
    /// mailer. Data routes answer 503; validation and auth-guard paths are
    /// fully exercisable.
    #[cfg(test)]
    pub(crate) fn for_tests(upload_root: &std::path::Path) -> Self {
        Self {
            db: None,
            uploads: UploadStore::new(upload_root),
            mailer: Mailer::disabled(),
            session_secret: "test-session-secret".into(),
        }
    }

    /// Test context backed by a live pool (see `db::test_support`).
    #[cfg(test)]
    pub(crate) fn for_tests_with_db(db: PgPool, upload_root: &std::path::Path) -> Self {
        Self {
            db: Some(db),
            ..Self::for_tests(upload_root)
        }
    }
}
