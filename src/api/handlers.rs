//! HTTP handlers. Each one resolves the caller's database, runs a single
//! [`TableEditor`](crate::editor::TableEditor) call on the blocking pool and
//! maps the result to JSON.

use actix_multipart::Multipart;
use actix_web::{get, post, web, HttpRequest, HttpResponse};
use chrono::Local;
use futures::TryStreamExt;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::api::error::ApiError;
use crate::api::models::{
    CheckDbResponse, EditPayload, EditResponse, LoadDefaultResponse, SummarizeRequest,
    SummaryResponse, TableQuery, TableResponse, TablesResponse,
};
use crate::api::state::AppState;
use crate::session::SessionResolver;
use crate::sqlite::{DbContext, OpenMode, TableDescriptor};
use crate::storage::{download_filename, UploadError};

/// Multipart field carrying the database file.
const UPLOAD_FIELD: &str = "dbFile";

/// GET /api/healthcheck
#[get("/healthcheck")]
pub async fn healthcheck() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/check-db - whether the caller has a usable database
#[get("/check-db")]
pub async fn check_db(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let has_db = state
        .session_id(&req)
        .and_then(|id| state.sessions.resolve(&id))
        .map(|path| path.is_file())
        .unwrap_or(false);
    HttpResponse::Ok().json(CheckDbResponse { has_db })
}

/// GET /api/tables
#[get("/tables")]
pub async fn list_tables(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let ctx = state.db_context(&req)?;
    let tables = open_and_list(state.get_ref(), ctx).await?;
    Ok(HttpResponse::Ok().json(TablesResponse { tables }))
}

/// GET /api/table/{name}?ids=1,2,3
#[get("/table/{name}")]
pub async fn read_table(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<TableQuery>,
) -> Result<HttpResponse, ApiError> {
    let ctx = state.db_context(&req)?;
    let name = path.into_inner();
    let filter = query.filter();
    let editor = state.editor;

    let data = web::block(move || {
        ctx.with_handle(OpenMode::ReadOnly, |handle| {
            editor.read_rows(handle, &name, &filter)
        })
    })
    .await??;
    Ok(HttpResponse::Ok().json(TableResponse::from(data)))
}

/// POST /api/edit {action, table, data?, id?}
#[post("/edit")]
pub async fn edit(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<EditPayload>,
) -> Result<HttpResponse, ApiError> {
    let ctx = state.db_context(&req)?;
    let request = payload.into_inner().into_request()?;
    let editor = state.editor;

    let outcome = web::block(move || {
        ctx.with_handle(OpenMode::ReadWrite, |handle| editor.apply_edit(handle, &request))
    })
    .await??;
    Ok(HttpResponse::Ok().json(EditResponse {
        success: true,
        rows_affected: outcome.rows_affected,
        last_insert_id: outcome.last_insert_id,
    }))
}

/// POST /api/summarize {table}
#[post("/summarize")]
pub async fn summarize(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<SummarizeRequest>,
) -> Result<HttpResponse, ApiError> {
    let ctx = state.db_context(&req)?;
    let table = payload.into_inner().table;
    let editor = state.editor;
    let limit = state.sample_rows;

    let sample_table = table.clone();
    let rows = web::block(move || {
        ctx.with_handle(OpenMode::ReadOnly, |handle| {
            editor.read_sample(handle, &sample_table, limit)
        })
    })
    .await??;

    let summary = state.summarizer.summarize(&table, &rows).await?;
    Ok(HttpResponse::Ok().json(SummaryResponse { summary }))
}

/// POST /api/upload (multipart, field `dbFile`)
#[post("/upload")]
pub async fn upload(
    req: HttpRequest,
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let mut upload: Option<Vec<u8>> = None;

    while let Some(mut field) = payload.try_next().await.map_err(bad_multipart)? {
        let disposition = field.content_disposition().cloned();
        let field_name = disposition.as_ref().and_then(|cd| cd.get_name());
        if field_name != Some(UPLOAD_FIELD) {
            // Drain fields we do not care about.
            while field.try_next().await.map_err(bad_multipart)?.is_some() {}
            continue;
        }

        let filename = disposition
            .as_ref()
            .and_then(|cd| cd.get_filename())
            .unwrap_or_default();
        state.files.check_filename(filename)?;

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(bad_multipart)? {
            state.files.check_size(bytes.len() + chunk.len())?;
            bytes.extend_from_slice(&chunk);
        }
        upload = Some(bytes);
    }

    let bytes = upload.ok_or(UploadError::MissingFile)?;
    let session_id = state.session_id_or_new(&req);
    let files = state.files.clone();
    let sid = session_id.clone();
    let staged = web::block(move || files.stage_upload(&sid, &bytes)).await??;

    let tables = match open_and_list(state.get_ref(), DbContext::new(staged.clone())).await {
        Ok(tables) => tables,
        Err(ApiError::Editor(e)) => {
            warn!(error = %e, "uploaded file is not a readable database");
            discard(staged).await;
            return Err(ApiError::BadRequest(format!(
                "Uploaded file is not a readable SQLite database: {}",
                e
            )));
        }
        Err(e) => {
            discard(staged).await;
            return Err(e);
        }
    };

    let files = state.files.clone();
    let sid = session_id.clone();
    let path = web::block(move || files.promote_upload(&sid)).await??;
    state.sessions.register(&session_id, path);
    info!(tables = tables.len(), "database uploaded");
    Ok(HttpResponse::Ok()
        .cookie(state.session_cookie(&session_id))
        .json(TablesResponse { tables }))
}

/// POST /api/load-default-db
#[post("/load-default-db")]
pub async fn load_default_db(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let session_id = state.session_id_or_new(&req);
    let files = state.files.clone();
    let sid = session_id.clone();
    let path = web::block(move || files.copy_default(&sid)).await??;

    let tables = open_and_list(state.get_ref(), DbContext::new(path.clone())).await?;
    state.sessions.register(&session_id, path);
    Ok(HttpResponse::Ok()
        .cookie(state.session_cookie(&session_id))
        .json(LoadDefaultResponse {
            success: true,
            tables,
        }))
}

/// GET /api/download
#[get("/download")]
pub async fn download(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let ctx = state.db_context(&req)?;
    let path = ctx.path().to_path_buf();
    let bytes = web::block(move || fs::read(path))
        .await?
        .map_err(|e| ApiError::Internal(format!("failed to read database: {}", e)))?;

    let filename = download_filename(Local::now());
    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .append_header((
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", filename),
        ))
        .body(bytes))
}

async fn open_and_list(
    state: &AppState,
    ctx: DbContext,
) -> Result<Vec<TableDescriptor>, ApiError> {
    let editor = state.editor;
    let tables = web::block(move || {
        ctx.with_handle(OpenMode::ReadOnly, |handle| editor.list_tables(handle))
    })
    .await??;
    Ok(tables)
}

async fn discard(path: PathBuf) {
    let result = web::block(move || fs::remove_file(path)).await;
    if let Ok(Err(e)) = result {
        warn!(error = %e, "failed to remove rejected upload");
    }
}

fn bad_multipart(err: actix_multipart::MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Invalid multipart payload: {}", err))
}
