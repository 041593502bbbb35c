//! Shared application state and request-scoped session resolution.

use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::HttpRequest;
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::config::{ServerConfig, SessionSettings};
use crate::editor::TableEditor;
use crate::session::{SessionResolver, SessionStore};
use crate::sqlite::DbContext;
use crate::storage::FileStore;
use crate::summarize::Summarizer;

/// Everything handlers need; cloned into each actix worker.
#[derive(Clone)]
pub struct AppState {
    pub editor: TableEditor,
    pub sessions: Arc<SessionStore>,
    pub files: FileStore,
    pub summarizer: Arc<dyn Summarizer>,
    pub session_settings: SessionSettings,
    pub sample_rows: usize,
}

impl AppState {
    pub fn new(config: &ServerConfig, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            editor: TableEditor::new(),
            sessions: Arc::new(SessionStore::new(config.session.max_age())),
            files: FileStore::new(config.storage.clone()),
            summarizer,
            session_settings: config.session.clone(),
            sample_rows: config.summarizer.sample_rows,
        }
    }

    pub fn session_id(&self, req: &HttpRequest) -> Option<String> {
        req.cookie(&self.session_settings.cookie_name)
            .map(|cookie| cookie.value().to_string())
            .filter(|id| SessionStore::is_valid_id(id))
    }

    /// The caller's session id, or a fresh one if they have none yet.
    pub fn session_id_or_new(&self, req: &HttpRequest) -> String {
        self.session_id(req)
            .unwrap_or_else(SessionStore::new_session_id)
    }

    /// Resolve the caller's active database into a request-scoped context.
    pub fn db_context(&self, req: &HttpRequest) -> Result<DbContext, ApiError> {
        let path = self
            .session_id(req)
            .and_then(|id| self.sessions.resolve(&id))
            .ok_or(ApiError::NoDatabase)?;
        let ctx = DbContext::new(path);
        if !ctx.exists() {
            return Err(ApiError::DatabaseMissing);
        }
        Ok(ctx)
    }

    pub fn session_cookie(&self, session_id: &str) -> Cookie<'static> {
        let max_age = i64::try_from(self.session_settings.max_age_secs).unwrap_or(i64::MAX);
        Cookie::build(self.session_settings.cookie_name.clone(), session_id.to_string())
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.session_settings.secure_cookie)
            .max_age(time::Duration::seconds(max_age))
            .finish()
    }
}
