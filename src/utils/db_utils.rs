use chrono::NaiveDate;
use serde_json::{Map, Value};
use sqlx::{Executor, MySql, MySqlConnection};

use crate::error::ApiError;

/// ===============================
/// Updatable column description
/// ===============================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Bool,
    Date,
}

/// A column that a client is allowed to change. The column name written into
/// the statement always comes from here, never from the request body.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
}

impl Field {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: true,
        }
    }
}

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    Null,
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

fn convert(field: &Field, value: &Value) -> Result<SqlValue, ApiError> {
    let invalid = || ApiError::bad_request(format!("Invalid value for field '{}'", field.name));

    if value.is_null() {
        return if field.nullable {
            Ok(SqlValue::Null)
        } else {
            Err(ApiError::bad_request(format!(
                "Field '{}' cannot be null",
                field.name
            )))
        };
    }

    match field.kind {
        FieldKind::Text => {
            let text = value.as_str().ok_or_else(invalid)?.trim();
            if text.is_empty() && !field.nullable {
                return Err(ApiError::bad_request(format!(
                    "Field '{}' cannot be empty",
                    field.name
                )));
            }
            Ok(SqlValue::String(text.to_string()))
        }
        FieldKind::Integer => value.as_i64().map(SqlValue::I64).ok_or_else(invalid),
        FieldKind::Float => value.as_f64().map(SqlValue::F64).ok_or_else(invalid),
        FieldKind::Bool => value.as_bool().map(SqlValue::Bool).ok_or_else(invalid),
        FieldKind::Date => value
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .map(SqlValue::Date)
            .ok_or_else(invalid),
    }
}

/// ===============================
/// Build allow-listed UPDATE SQL
/// ===============================
pub fn build_update_sql(
    table: &str,
    payload: &Map<String, Value>,
    allowed: &[Field],
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, ApiError> {
    if payload.is_empty() {
        return Err(ApiError::bad_request("No fields provided for update"));
    }

    if let Some(key) = payload
        .keys()
        .find(|key| !allowed.iter().any(|f| f.name == key.as_str()))
    {
        return Err(ApiError::bad_request(format!("Field '{key}' cannot be updated")));
    }

    let mut assignments = Vec::with_capacity(payload.len());
    let mut values = Vec::with_capacity(payload.len() + 1);

    // statement columns follow the allow-list order
    for field in allowed {
        if let Some(value) = payload.get(field.name) {
            assignments.push(format!("{} = ?", field.name));
            values.push(convert(field, value)?);
        }
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table,
        assignments.join(", "),
        id_column
    );

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update<'c, E>(executor: E, update: SqlUpdate) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(executor).await?;
    Ok(result.rows_affected())
}

/// Expects a JSON object body and hands back its map.
pub fn into_object(payload: Value) -> Result<Map<String, Value>, ApiError> {
    match payload {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::bad_request("Payload must be a JSON object")),
    }
}

/// Removes `key` from the body and parses it as a list of ids.
pub fn take_id_list(payload: &mut Map<String, Value>, key: &str) -> Result<Option<Vec<u64>>, ApiError> {
    match payload.remove(key) {
        None => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_u64()
                    .ok_or_else(|| ApiError::bad_request(format!("'{key}' must contain numeric ids")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|mut ids| {
                ids.sort_unstable();
                ids.dedup();
                Some(ids)
            }),
        Some(_) => Err(ApiError::bad_request(format!("'{key}' must be an array"))),
    }
}

/// Counts how many of `ids` exist in `table`; used to validate references
/// before a transactional multi-row insert.
pub async fn count_existing<'c, E>(executor: E, table: &str, ids: &[u64]) -> Result<usize, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    if ids.is_empty() {
        return Ok(0);
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE id IN ({placeholders})");

    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    for id in ids {
        query = query.bind(*id);
    }

    Ok(query.fetch_one(executor).await? as usize)
}

/// Inserts one join row per id: `INSERT INTO table (owner_col, member_col)`.
pub async fn insert_links(
    conn: &mut MySqlConnection,
    table: &str,
    owner_col: &str,
    owner_id: u64,
    member_col: &str,
    ids: &[u64],
) -> Result<(), sqlx::Error> {
    let sql = format!("INSERT INTO {table} ({owner_col}, {member_col}) VALUES (?, ?)");
    for id in ids {
        sqlx::query(&sql)
            .bind(owner_id)
            .bind(*id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Membership update: delete every join row of the owner, then reinsert.
pub async fn replace_links(
    conn: &mut MySqlConnection,
    table: &str,
    owner_col: &str,
    owner_id: u64,
    member_col: &str,
    ids: &[u64],
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!("DELETE FROM {table} WHERE {owner_col} = ?"))
        .bind(owner_id)
        .execute(&mut *conn)
        .await?;

    insert_links(conn, table, owner_col, owner_id, member_col, ids).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIELDS: &[Field] = &[
        Field::required("name", FieldKind::Text),
        Field::optional("salary", FieldKind::Float),
        Field::optional("date_of_joining", FieldKind::Date),
        Field::required("is_active", FieldKind::Bool),
    ];

    fn object(value: Value) -> Map<String, Value> {
        into_object(value).unwrap()
    }

    #[test]
    fn builds_statement_from_allowed_fields() {
        let body = object(json!({ "name": " Asha ", "date_of_joining": "2024-04-01" }));
        let update = build_update_sql("employees", &body, FIELDS, "id", 7).unwrap();

        assert_eq!(
            update.sql,
            "UPDATE employees SET name = ?, date_of_joining = ? WHERE id = ?"
        );
        assert_eq!(
            update.values,
            vec![
                SqlValue::String("Asha".to_string()),
                SqlValue::Date(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()),
                SqlValue::U64(7),
            ]
        );
    }

    #[test]
    fn rejects_unknown_column_names() {
        let body = object(json!({ "name = 'x', salary": 1 }));
        let err = build_update_sql("employees", &body, FIELDS, "id", 1).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn rejects_empty_body() {
        let err = build_update_sql("employees", &Map::new(), FIELDS, "id", 1).unwrap_err();
        assert_eq!(err.to_string(), "No fields provided for update");
    }

    #[test]
    fn null_only_for_nullable_columns() {
        let ok = object(json!({ "salary": null }));
        assert!(build_update_sql("employees", &ok, FIELDS, "id", 1).is_ok());

        let bad = object(json!({ "name": null }));
        assert!(build_update_sql("employees", &bad, FIELDS, "id", 1).is_err());
    }

    #[test]
    fn blank_text_only_for_nullable_columns() {
        let body = object(json!({ "name": "   " }));
        let err = build_update_sql("employees", &body, FIELDS, "id", 1).unwrap_err();
        assert_eq!(err.to_string(), "Field 'name' cannot be empty");

        const NOTES: &[Field] = &[Field::optional("notes", FieldKind::Text)];
        let body = object(json!({ "notes": "" }));
        let update = build_update_sql("employees", &body, NOTES, "id", 1).unwrap();
        assert_eq!(update.values[0], SqlValue::String(String::new()));
    }

    #[test]
    fn type_mismatch_is_bad_request() {
        let body = object(json!({ "is_active": "yes" }));
        assert!(build_update_sql("employees", &body, FIELDS, "id", 1).is_err());

        let body = object(json!({ "date_of_joining": "01/04/2024" }));
        assert!(build_update_sql("employees", &body, FIELDS, "id", 1).is_err());
    }

    #[test]
    fn id_list_is_removed_and_deduplicated() {
        let mut body = object(json!({ "name": "Plan A", "service_ids": [3, 1, 3] }));
        let ids = take_id_list(&mut body, "service_ids").unwrap();
        assert_eq!(ids, Some(vec![1, 3]));
        assert!(!body.contains_key("service_ids"));

        let mut body = object(json!({ "service_ids": "1,2" }));
        assert!(take_id_list(&mut body, "service_ids").is_err());
    }

    #[test]
    fn non_object_payload_is_rejected() {
        assert!(into_object(json!([1, 2])).is_err());
    }
}
