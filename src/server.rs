//! HTTP server wiring and background housekeeping.

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use std::fs;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::{self, ApiError, AppState};
use crate::config::ServerConfig;
use crate::session::SessionStore;
use crate::summarize::{OpenRouterSummarizer, Summarizer};

/// Largest JSON body accepted by `/api/edit` and `/api/summarize`.
const JSON_LIMIT: usize = 2 * 1024 * 1024;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared JSON and query-string extractor settings, so malformed bodies
/// produce the same error payload as every other bad request.
pub fn configure_extractors(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(JSON_LIMIT)
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    );
}

pub fn build_state(config: &ServerConfig) -> anyhow::Result<AppState> {
    let summarizer = OpenRouterSummarizer::from_env(config.summarizer.clone())?;
    let summarizer: Arc<dyn Summarizer> = Arc::new(summarizer);
    Ok(AppState::new(config, summarizer))
}

/// Forget expired sessions and delete their database files.
pub fn sweep_expired_sessions(sessions: &SessionStore) -> usize {
    let expired = sessions.purge_expired();
    for path in &expired {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove expired database"),
        }
    }
    expired.len()
}

fn spawn_session_sweeper(sessions: Arc<SessionStore>) {
    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let sweep = sessions.clone();
            match web::block(move || sweep_expired_sessions(&sweep)).await {
                Ok(0) => {}
                Ok(removed) => {
                    debug!(removed, remaining = sessions.len(), "expired sessions purged")
                }
                Err(e) => warn!(error = %e, "session sweep failed"),
            }
        }
    });
}

/// Run the HTTP server until it is stopped.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let state = build_state(&config)?;
    spawn_session_sweeper(state.sessions.clone());

    let bind = config.bind_address();
    info!(
        "sqlite-admin v{} listening on {}",
        env!("CARGO_PKG_VERSION"),
        bind
    );
    info!(
        upload_dir = %config.storage.upload_dir.display(),
        max_upload_bytes = config.storage.max_upload_bytes,
        "storage configured"
    );

    let data = web::Data::new(state);
    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(data.clone())
            .configure(configure_extractors)
            .configure(api::configure_routes)
    });
    if config.server.workers > 0 {
        server = server.workers(config.server.workers);
    }

    server.bind(&bind)?.run().await?;
    info!("server stopped");
    Ok(())
}
