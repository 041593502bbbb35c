//! Request and response bodies for the HTTP API.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::editor::{EditRequest, RowFilter, TableData};
use crate::sqlite::{ColumnDescriptor, Row, TableDescriptor, Value};

#[derive(Debug, Serialize)]
pub struct TablesResponse {
    pub tables: Vec<TableDescriptor>,
}

#[derive(Debug, Serialize)]
pub struct LoadDefaultResponse {
    pub success: bool,
    pub tables: Vec<TableDescriptor>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckDbResponse {
    pub has_db: bool,
}

/// `GET /api/table/{name}` query string.
#[derive(Debug, Default, Deserialize)]
pub struct TableQuery {
    /// Comma-separated primary key values
    pub ids: Option<String>,
}

impl TableQuery {
    /// Integers bind as integers, anything else as text. Blank means no filter.
    pub fn filter(&self) -> RowFilter {
        match self.ids.as_deref().map(str::trim) {
            None | Some("") => RowFilter::All,
            Some(raw) => RowFilter::Ids(
                raw.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(|id| match id.parse::<i64>() {
                        Ok(n) => Value::Integer(n),
                        Err(_) => Value::Text(id.to_string()),
                    })
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableResponse {
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Row>,
    pub primary_key_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl From<TableData> for TableResponse {
    fn from(data: TableData) -> Self {
        Self {
            table: data.table.name,
            columns: data.table.columns,
            rows: data.rows,
            primary_key_column: data.primary_key_column,
            diagnostic: data.diagnostic,
        }
    }
}

/// `POST /api/edit` body.
#[derive(Debug, Deserialize)]
pub struct EditPayload {
    pub action: String,
    pub table: String,
    #[serde(default)]
    pub data: Option<IndexMap<String, serde_json::Value>>,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

impl EditPayload {
    pub fn into_request(self) -> Result<EditRequest, ApiError> {
        let EditPayload {
            action,
            table,
            data,
            id,
        } = self;
        let data: Row = data
            .unwrap_or_default()
            .into_iter()
            .map(|(column, value)| (column, Value::from(value)))
            .collect();
        let require_id = |id: Option<serde_json::Value>| {
            id.map(Value::from)
                .ok_or_else(|| ApiError::BadRequest(format!("id is required for {}", action)))
        };

        match action.as_str() {
            "create" => Ok(EditRequest::Create { table, data }),
            "update" => Ok(EditRequest::Update {
                id: require_id(id)?,
                table,
                data,
            }),
            "delete" => Ok(EditRequest::Delete {
                id: require_id(id)?,
                table,
            }),
            _ => Err(ApiError::BadRequest(format!("Invalid action: {}", action))),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditResponse {
    pub success: bool,
    pub rows_affected: usize,
    pub last_insert_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    pub table: String,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
}
