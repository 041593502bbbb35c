//! Schema-driven CRUD against arbitrary tables.
//!
//! Table and column names are interpolated into SQL text because SQLite has no
//! bound-identifier syntax. Every such name passes [`validate_identifier`]
//! first and is double-quoted on top of that; every value is a bound parameter.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, params_from_iter, Connection};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{EditorError, Result};
use crate::sqlite::{ColumnDescriptor, DatabaseHandle, Row, SqlQuery, TableDescriptor, Value};

/// Rows returned by an unfiltered read.
pub const DEFAULT_ROW_LIMIT: usize = 100;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"));

/// Reject any name that is not a plain SQL identifier. Never sanitizes.
pub fn validate_identifier(name: &str) -> Result<&str> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(name)
    } else {
        Err(EditorError::InvalidIdentifier(name.to_string()))
    }
}

fn quoted(name: &str) -> Result<String> {
    Ok(format!("\"{}\"", validate_identifier(name)?))
}

/// Row selection for [`TableEditor::read_rows`].
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RowFilter {
    #[default]
    All,
    Ids(Vec<Value>),
}

/// A single mutation against one table.
#[derive(Debug, Clone, PartialEq)]
pub enum EditRequest {
    Create { table: String, data: Row },
    Update { table: String, data: Row, id: Value },
    Delete { table: String, id: Value },
}

impl EditRequest {
    pub fn table(&self) -> &str {
        match self {
            EditRequest::Create { table, .. }
            | EditRequest::Update { table, .. }
            | EditRequest::Delete { table, .. } => table,
        }
    }

    fn action(&self) -> &'static str {
        match self {
            EditRequest::Create { .. } => "create",
            EditRequest::Update { .. } => "update",
            EditRequest::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditOutcome {
    pub rows_affected: usize,
    /// Row id assigned by SQLite, set for creates only.
    pub last_insert_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableData {
    pub table: TableDescriptor,
    pub primary_key_column: Option<String>,
    pub rows: Vec<Row>,
    /// Set when the requested filter could not be honoured.
    pub diagnostic: Option<String>,
}

/// Stateless table operations over a caller-owned [`DatabaseHandle`].
#[derive(Debug, Clone, Copy)]
pub struct TableEditor {
    page_limit: usize,
}

impl Default for TableEditor {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_ROW_LIMIT,
        }
    }
}

impl TableEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit;
        self
    }

    /// All user tables with their columns, ordered by name.
    pub fn list_tables(&self, handle: &DatabaseHandle) -> Result<Vec<TableDescriptor>> {
        let conn = handle.connection();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let columns = load_columns(conn, &name)?;
            tables.push(TableDescriptor { name, columns });
        }
        debug!(count = tables.len(), path = %handle.path().display(), "listed tables");
        Ok(tables)
    }

    pub fn describe_table(
        &self,
        handle: &DatabaseHandle,
        table_name: &str,
    ) -> Result<TableDescriptor> {
        let name = validate_identifier(table_name)?;
        let columns = load_columns(handle.connection(), name)?;
        Ok(TableDescriptor {
            name: name.to_string(),
            columns,
        })
    }

    /// Read a page of rows, or the rows whose primary key is in `filter`.
    ///
    /// An id filter on a table without a usable primary key falls back to the
    /// unfiltered page and reports why in [`TableData::diagnostic`].
    pub fn read_rows(
        &self,
        handle: &DatabaseHandle,
        table_name: &str,
        filter: &RowFilter,
    ) -> Result<TableData> {
        let table = self.existing_table(handle, table_name)?;
        let primary_key_column = table.primary_key().map(|c| c.name.clone());
        let mut diagnostic = None;

        let query = match (filter, primary_key_column.as_deref()) {
            (RowFilter::Ids(ids), Some(_)) if ids.is_empty() => None,
            (RowFilter::Ids(ids), Some(pk)) => Some(build_select_ids(&table.name, pk, ids)?),
            (RowFilter::Ids(_), None) => {
                let message = format!(
                    "Table '{}' has no primary key column; returning the first {} rows unfiltered",
                    table.name, self.page_limit
                );
                warn!(table = %table.name, "id filter ignored: no primary key");
                diagnostic = Some(message);
                Some(build_select_page(&table.name, self.page_limit)?)
            }
            (RowFilter::All, _) => Some(build_select_page(&table.name, self.page_limit)?),
        };

        let rows = match query {
            Some(query) => query_rows(handle.connection(), &query)?,
            None => Vec::new(),
        };
        Ok(TableData {
            table,
            primary_key_column,
            rows,
            diagnostic,
        })
    }

    /// First `limit` rows of a table, regardless of keys.
    pub fn read_sample(
        &self,
        handle: &DatabaseHandle,
        table_name: &str,
        limit: usize,
    ) -> Result<Vec<Row>> {
        let name = validate_identifier(table_name)?;
        query_rows(handle.connection(), &build_select_page(name, limit)?)
    }

    pub fn apply_edit(&self, handle: &DatabaseHandle, request: &EditRequest) -> Result<EditOutcome> {
        let table = self.existing_table(handle, request.table())?;
        let pk = table
            .primary_key()
            .ok_or_else(|| EditorError::NoPrimaryKey(table.name.clone()))?;

        let query = match request {
            EditRequest::Create { data, .. } => build_insert(&table, pk, data)?,
            EditRequest::Update { data, id, .. } => build_update(&table, pk, data, id)?,
            EditRequest::Delete { id, .. } => build_delete(&table, pk, id)?,
        };

        let conn = handle.connection();
        let rows_affected = conn.execute(&query.statement, params_from_iter(query.params.iter()))?;
        let last_insert_id = match request {
            EditRequest::Create { .. } => Some(conn.last_insert_rowid()),
            _ => None,
        };
        info!(
            table = %table.name,
            action = request.action(),
            rows_affected,
            "applied edit"
        );
        Ok(EditOutcome {
            rows_affected,
            last_insert_id,
        })
    }

    fn existing_table(&self, handle: &DatabaseHandle, table_name: &str) -> Result<TableDescriptor> {
        let table = self.describe_table(handle, table_name)?;
        if !table.exists() {
            return Err(EditorError::Storage(format!("no such table: {}", table.name)));
        }
        Ok(table)
    }
}

/// Columns of `table` from `pragma_table_info`, with the name bound.
fn load_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnDescriptor>> {
    let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
    )?;
    let columns = stmt
        .query_map(params![table], |row| {
            Ok(ColumnDescriptor {
                name: row.get("name")?,
                declared_type: row.get("type")?,
                not_null: row.get::<_, i64>("notnull")? != 0,
                default_value: row.get("dflt_value")?,
                is_primary_key: row.get::<_, i64>("pk")? > 0,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| EditorError::Storage(format!("malformed catalog row for '{}': {}", table, e)))?;
    Ok(columns)
}

fn query_rows(conn: &Connection, query: &SqlQuery) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(&query.statement)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params_from_iter(query.params.iter()))?;

    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let mut map = Row::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            map.insert(name.clone(), Value::from(row.get_ref(idx)?));
        }
        result.push(map);
    }
    Ok(result)
}

pub fn build_select_page(table: &str, limit: usize) -> Result<SqlQuery> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    Ok(SqlQuery::new(format!("SELECT * FROM {} LIMIT ?", quoted(table)?))
        .with_params(vec![Value::Integer(limit)]))
}

pub fn build_select_ids(table: &str, pk: &str, ids: &[Value]) -> Result<SqlQuery> {
    let placeholders = vec!["?"; ids.len()].join(", ");
    Ok(SqlQuery::new(format!(
        "SELECT * FROM {} WHERE {} IN ({})",
        quoted(table)?,
        quoted(pk)?,
        placeholders
    ))
    .with_params(ids.to_vec()))
}

/// Non-key `(column, value)` pairs of `data`, each checked against the schema.
fn writable_columns<'a>(
    table: &TableDescriptor,
    pk: &ColumnDescriptor,
    data: &'a Row,
) -> Result<Vec<(String, &'a Value)>> {
    let mut columns = Vec::with_capacity(data.len());
    for (name, value) in data {
        if *name == pk.name {
            continue;
        }
        let column = table.column(name).ok_or_else(|| {
            EditorError::InvalidIdentifier(format!("unknown column '{}' in table '{}'", name, table.name))
        })?;
        columns.push((quoted(&column.name)?, value));
    }
    Ok(columns)
}

pub fn build_insert(table: &TableDescriptor, pk: &ColumnDescriptor, data: &Row) -> Result<SqlQuery> {
    let columns = writable_columns(table, pk, data)?;
    if columns.is_empty() {
        return Err(EditorError::NoColumns("insert"));
    }
    let names: Vec<&str> = columns.iter().map(|(name, _)| name.as_str()).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let params = columns.iter().map(|(_, value)| (*value).clone()).collect();
    Ok(SqlQuery::new(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quoted(&table.name)?,
        names.join(", "),
        placeholders
    ))
    .with_params(params))
}

pub fn build_update(
    table: &TableDescriptor,
    pk: &ColumnDescriptor,
    data: &Row,
    id: &Value,
) -> Result<SqlQuery> {
    let columns = writable_columns(table, pk, data)?;
    if columns.is_empty() {
        return Err(EditorError::NoColumns("update"));
    }
    let set_clause: Vec<String> = columns.iter().map(|(name, _)| format!("{} = ?", name)).collect();
    let mut params: Vec<Value> = columns.into_iter().map(|(_, value)| value.clone()).collect();
    params.push(id.clone());
    Ok(SqlQuery::new(format!(
        "UPDATE {} SET {} WHERE {} = ?",
        quoted(&table.name)?,
        set_clause.join(", "),
        quoted(&pk.name)?
    ))
    .with_params(params))
}

pub fn build_delete(table: &TableDescriptor, pk: &ColumnDescriptor, id: &Value) -> Result<SqlQuery> {
    Ok(SqlQuery::new(format!(
        "DELETE FROM {} WHERE {} = ?",
        quoted(&table.name)?,
        quoted(&pk.name)?
    ))
    .with_params(vec![id.clone()]))
}
