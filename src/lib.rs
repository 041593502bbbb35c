//! Web administration for uploaded SQLite files.
//!
//! # Intention
//!
//! - Let a user upload a database file, browse its tables and edit rows
//!   through generic, schema-driven CRUD.
//! - Keep the table logic ([`editor`]) a stateless function of an open
//!   [`sqlite::DatabaseHandle`]; sessions, files and summaries live at the edges.
//!
//! # Architectural Boundaries
//!
//! - [`editor`] and [`sqlite`] only talk to SQLite.
//! - [`api`] owns HTTP, cookies and status codes.
//! - [`session`], [`storage`] and [`summarize`] are collaborators the API wires in.

pub mod api;
pub mod config;
pub mod editor;
pub mod error;
pub mod logging;
pub mod server;
pub mod session;
pub mod sqlite;
pub mod storage;
pub mod summarize;

pub use editor::{EditOutcome, EditRequest, RowFilter, TableData, TableEditor};
pub use error::{EditorError, Result};
pub use sqlite::{ColumnDescriptor, DatabaseHandle, DbContext, OpenMode, Row, TableDescriptor, Value};
