//! HTTP surface: one route per table operation plus the upload, download and
//! summary collaborators.

pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::configure_routes;
pub use state::AppState;
