//! sqlx-backed MySQL connections.

use sqlx::mysql::{MySqlArguments, MySqlRow};
use sqlx::{Column, Connection as _, Executor, MySql, MySqlConnection, Row as _, TypeInfo};

use crate::ast::{IsolationLevel, Value};
use crate::config::DatabaseServer;
use crate::error::RdbResult;
use crate::parser;
use crate::params::ParameterSet;
use crate::transpiler::{ExecutionUnit, Statement};

use super::connection::{Connection, ConnectionProvider, Row};

/// Opens a fresh [`MySqlSession`] per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlProvider;

impl ConnectionProvider for MySqlProvider {
    type Connection = MySqlSession;

    async fn connect(&self, server: &DatabaseServer) -> RdbResult<MySqlSession> {
        tracing::debug!("Connecting to database server: {}", server.name);
        let conn = MySqlConnection::connect(&server.connection_url()).await?;
        Ok(MySqlSession { conn })
    }
}

/// A single MySQL connection. Dropping it closes the socket.
pub struct MySqlSession {
    conn: MySqlConnection,
}

impl MySqlSession {
    pub fn new(conn: MySqlConnection) -> Self {
        Self { conn }
    }

    /// Close gracefully instead of on drop.
    pub async fn close(self) -> RdbResult<()> {
        self.conn.close().await?;
        Ok(())
    }
}

type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;

/// Bind a value to a positional MySQL query.
fn bind_value<'q>(query: MySqlQuery<'q>, value: &Value) -> MySqlQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::String(s) => query.bind(s.clone()),
        Value::DateTime(dt) => query.bind(*dt),
        // Expanded by the scanner; bound as text if one slips through.
        Value::List(_) => query.bind(value.to_string()),
    }
}

fn prepare<'q>(sql: &'q str, values: &[Value]) -> MySqlQuery<'q> {
    values
        .iter()
        .fold(sqlx::query(sql), |query, value| bind_value(query, value))
}

fn positional(sql: &str, parameters: &ParameterSet) -> RdbResult<(String, Vec<Value>)> {
    parser::to_positional(sql, parameters)
}

/// Convert a MySqlRow to a HashMap.
fn row_to_map(row: &MySqlRow) -> Row {
    let mut map = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), column_value(row, i));
    }
    map
}

fn column_value(row: &MySqlRow, i: usize) -> serde_json::Value {
    let type_name = row.columns()[i].type_info().name();
    match type_name {
        "BOOLEAN" => row
            .try_get::<bool, _>(i)
            .map(serde_json::Value::Bool)
            .unwrap_or(serde_json::Value::Null),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
            .try_get::<i64, _>(i)
            .map(|v| serde_json::Value::Number(v.into()))
            .unwrap_or(serde_json::Value::Null),
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row
            .try_get::<u64, _>(i)
            .map(|v| serde_json::Value::Number(v.into()))
            .unwrap_or(serde_json::Value::Null),
        "FLOAT" | "DOUBLE" => row
            .try_get::<f64, _>(i)
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(i)
            .map(|v| serde_json::Value::String(v.to_string()))
            .unwrap_or(serde_json::Value::Null),
        _ => row
            .try_get::<String, _>(i)
            .or_else(|_| row.try_get_unchecked::<String, _>(i))
            .map(serde_json::Value::String)
            .unwrap_or(serde_json::Value::Null),
    }
}

impl Connection for MySqlSession {
    async fn begin(&mut self, isolation: Option<IsolationLevel>) -> RdbResult<()> {
        if let Some(level) = isolation {
            let sql = format!("SET TRANSACTION ISOLATION LEVEL {}", level.sql());
            self.conn.execute(sql.as_str()).await?;
        }
        self.conn.execute("START TRANSACTION").await?;
        Ok(())
    }

    async fn execute(&mut self, unit: &ExecutionUnit) -> RdbResult<u64> {
        let mut affected = 0;
        // Prepared statements take one statement each.
        for statement in &unit.statements {
            let (sql, values) = positional(statement, &unit.parameters)?;
            let result = prepare(&sql, &values).execute(&mut self.conn).await?;
            affected += result.rows_affected();
        }
        Ok(affected)
    }

    async fn fetch_all(&mut self, statement: &Statement) -> RdbResult<Vec<Row>> {
        let (sql, values) = positional(&statement.text, &statement.parameters)?;
        let rows = prepare(&sql, &values).fetch_all(&mut self.conn).await?;
        Ok(rows.iter().map(row_to_map).collect())
    }

    async fn fetch_scalar(&mut self, statement: &Statement) -> RdbResult<serde_json::Value> {
        let (sql, values) = positional(&statement.text, &statement.parameters)?;
        let row = prepare(&sql, &values).fetch_optional(&mut self.conn).await?;
        Ok(match row {
            Some(row) if !row.columns().is_empty() => column_value(&row, 0),
            _ => serde_json::Value::Null,
        })
    }

    async fn commit(&mut self) -> RdbResult<()> {
        self.conn.execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> RdbResult<()> {
        self.conn.execute("ROLLBACK").await?;
        Ok(())
    }
}
