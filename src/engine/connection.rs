//! Backend connection seam.

use std::collections::HashMap;

use crate::ast::IsolationLevel;
use crate::config::DatabaseServer;
use crate::error::RdbResult;
use crate::transpiler::{ExecutionUnit, Statement};

/// A result row keyed by column name.
pub type Row = HashMap<String, serde_json::Value>;

/// One open session against a database server.
#[allow(async_fn_in_trait)]
pub trait Connection {
    /// Start a transaction, optionally pinning its isolation level.
    async fn begin(&mut self, isolation: Option<IsolationLevel>) -> RdbResult<()>;

    /// Run every statement of the unit; returns the summed affected-row count.
    async fn execute(&mut self, unit: &ExecutionUnit) -> RdbResult<u64>;

    async fn fetch_all(&mut self, statement: &Statement) -> RdbResult<Vec<Row>>;

    /// First column of the first row, `Null` when there is none.
    async fn fetch_scalar(&mut self, statement: &Statement) -> RdbResult<serde_json::Value>;

    async fn commit(&mut self) -> RdbResult<()>;

    async fn rollback(&mut self) -> RdbResult<()>;
}

/// Opens connections by server.
#[allow(async_fn_in_trait)]
pub trait ConnectionProvider {
    type Connection: Connection;

    async fn connect(&self, server: &DatabaseServer) -> RdbResult<Self::Connection>;
}
