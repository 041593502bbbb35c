//! API routes configuration

use actix_web::web;

use crate::api::handlers;

/// Configure the admin API under `/api`:
/// - GET  /api/healthcheck
/// - GET  /api/check-db
/// - POST /api/upload
/// - POST /api/load-default-db
/// - GET  /api/tables
/// - GET  /api/table/{name}[?ids=..]
/// - POST /api/edit
/// - POST /api/summarize
/// - GET  /api/download
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(handlers::healthcheck)
            .service(handlers::check_db)
            .service(handlers::upload)
            .service(handlers::load_default_db)
            .service(handlers::list_tables)
            .service(handlers::read_table)
            .service(handlers::edit)
            .service(handlers::summarize)
            .service(handlers::download),
    );
}
