//! Column layout of the page view table.
//!
//! The table is wide and open: the known Canvas page view fields are declared
//! up front, any other payload field gets a VARCHAR column the first time it is
//! seen. Every row also carries derived columns computed at insert time.

use super::traits::StorageError;
use crate::event::{Event, FieldValue, CREATED_AT, UPDATED_AT};
use regex::Regex;
use std::sync::OnceLock;

/// The user id the fetch was issued for. Payload `user_id` values come in
/// several forms for the same user, so checkpoints key on this instead.
pub const SYNCED_USER_ID: &str = "synced_user_id";
pub const CREATED_AT_UNIX: &str = "created_at_unix";
pub const UPDATED_AT_UNIX: &str = "updated_at_unix";
/// Storage-assigned insertion order, the checkpoint tie-break
pub const ROW_SEQ: &str = "row_seq";

pub const DERIVED_COLUMNS: &[&str] = &[SYNCED_USER_ID, CREATED_AT_UNIX, UPDATED_AT_UNIX, ROW_SEQ];

/// Type given to columns added for previously unseen fields
pub const ADDED_COLUMN_TYPE: &str = "VARCHAR";

const BASE_COLUMNS: &[(&str, &str)] = &[
    ("request_id", "VARCHAR"),
    ("user_id", "VARCHAR"),
    ("url", "VARCHAR"),
    ("context_type", "VARCHAR"),
    ("asset_type", "VARCHAR"),
    ("controller", "VARCHAR"),
    ("action", "VARCHAR"),
    ("interaction_seconds", "DOUBLE"),
    ("created_at", "VARCHAR"),
    ("updated_at", "VARCHAR"),
    ("user_request", "BOOLEAN"),
    ("render_time", "DOUBLE"),
    ("user_agent", "VARCHAR"),
    ("participated", "BOOLEAN"),
    ("contributed", "BOOLEAN"),
    ("http_method", "VARCHAR"),
    ("remote_ip", "VARCHAR"),
    ("app_name", "VARCHAR"),
    ("links", "VARCHAR"),
];

/// Returns true if `name` can be used verbatim as a SQL identifier.
pub fn is_plain_identifier(name: &str) -> bool {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"))
        .is_match(name)
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}

fn sequence_name(table: &str) -> String {
    format!("{}_row_seq", table)
}

pub fn create_sequence_sql(table: &str) -> String {
    format!("CREATE SEQUENCE IF NOT EXISTS {}", quote_ident(&sequence_name(table)))
}

pub fn create_table_sql(table: &str) -> String {
    let mut columns: Vec<String> = BASE_COLUMNS
        .iter()
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty))
        .collect();
    columns.push(format!("{} VARCHAR NOT NULL", quote_ident(SYNCED_USER_ID)));
    columns.push(format!("{} BIGINT", quote_ident(CREATED_AT_UNIX)));
    columns.push(format!("{} BIGINT", quote_ident(UPDATED_AT_UNIX)));
    columns.push(format!(
        "{} BIGINT NOT NULL DEFAULT nextval('{}')",
        quote_ident(ROW_SEQ),
        sequence_name(table)
    ));

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote_ident(table),
        columns.join(",\n    ")
    )
}

pub fn add_column_sql(table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
        quote_ident(table),
        quote_ident(column),
        ADDED_COLUMN_TYPE
    )
}

pub fn insert_sql(table: &str, columns: &[String]) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        names.join(", "),
        placeholders
    )
}

pub fn checkpoint_sql(table: &str) -> String {
    format!(
        "SELECT request_id, {epoch} FROM {table} WHERE {user} = ? \
         ORDER BY {epoch} DESC NULLS LAST, {seq} DESC LIMIT 1",
        epoch = quote_ident(CREATED_AT_UNIX),
        table = quote_ident(table),
        user = quote_ident(SYNCED_USER_ID),
        seq = quote_ident(ROW_SEQ),
    )
}

pub fn count_sql(table: &str) -> String {
    format!(
        "SELECT count(*) FROM {} WHERE {} = ?",
        quote_ident(table),
        quote_ident(SYNCED_USER_ID)
    )
}

/// Column names and bound values for inserting one event.
#[derive(Debug, Clone, PartialEq)]
pub struct RowValues {
    pub columns: Vec<String>,
    pub values: Vec<FieldValue>,
}

impl RowValues {
    /// Builds the row for `event` fetched on behalf of `user_id`: every payload
    /// field as-is, plus the derived epoch and user columns.
    pub fn for_event(user_id: &str, event: &Event) -> Result<Self, StorageError> {
        let mut columns = Vec::with_capacity(event.len() + 3);
        let mut values = Vec::with_capacity(event.len() + 3);

        for (name, value) in event.fields() {
            if !is_plain_identifier(name) {
                return Err(StorageError::InvalidColumn(name.to_string()));
            }
            if DERIVED_COLUMNS.iter().any(|d| d.eq_ignore_ascii_case(name)) {
                return Err(StorageError::ReservedColumn(name.to_string()));
            }
            columns.push(name.to_string());
            values.push(value.clone());
        }

        for (source, derived) in [(CREATED_AT, CREATED_AT_UNIX), (UPDATED_AT, UPDATED_AT_UNIX)] {
            let value = match event.get(source) {
                None | Some(FieldValue::Null) => FieldValue::Null,
                Some(_) => FieldValue::Integer(event.epoch(source)?),
            };
            columns.push(derived.to_string());
            values.push(value);
        }

        columns.push(SYNCED_USER_ID.to_string());
        values.push(FieldValue::Text(user_id.to_string()));

        Ok(Self { columns, values })
    }

    /// Payload columns, i.e. the ones that may need adding to the table
    pub fn payload_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .map(String::as_str)
            .filter(|c| !DERIVED_COLUMNS.contains(c))
    }
}
