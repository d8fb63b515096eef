//! Execution engine.
//!
//! Compiles commands, merges them into execution units and runs the units on
//! one connection, optionally inside a transaction.

pub mod batch;
pub mod connection;
pub mod mysql;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ast::{Command, IsolationLevel, Query};
use crate::config::{DatabaseServer, EngineConfig};
use crate::error::{RdbError, RdbResult};
use crate::metadata::EntityMetadata;
use crate::transpiler::{
    AggregateFunction, CommandCompiler, ExecutionUnit, FieldConverter, MySqlFieldConverter,
    Statement, StatementBuilder, TranslationContext,
};

pub use batch::{BatchPlanner, BatchPolicy, GroupSize, ThresholdPolicy};
pub use connection::{Connection, ConnectionProvider, Row};
pub use mysql::{MySqlProvider, MySqlSession};

/// Cooperative cancellation, checked before each execution unit.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-call execution options.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// `None` uses a transaction when more than one command is supplied.
    pub transaction: Option<bool>,
    pub isolation: Option<IsolationLevel>,
    pub cancellation: Option<CancellationFlag>,
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction(mut self, enabled: bool) -> Self {
        self.transaction = Some(enabled);
        self
    }

    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    pub fn cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = Some(flag);
        self
    }
}

/// Units to run and how to run them.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub units: Vec<ExecutionUnit>,
    pub use_transaction: bool,
    pub isolation: Option<IsolationLevel>,
}

/// Run a plan on an open connection; returns the summed affected-row count.
///
/// Inside a transaction a must-affect unit that touches no rows stops the
/// run, rolls back and yields 0. Errors and cancellation roll back before
/// they propagate. Outside a transaction results simply accumulate.
pub async fn execute_plan<C: Connection>(
    conn: &mut C,
    plan: &ExecutionPlan,
    cancellation: Option<&CancellationFlag>,
) -> RdbResult<u64> {
    if plan.units.is_empty() {
        return Ok(0);
    }
    if plan.use_transaction {
        tracing::debug!("Beginning transaction (isolation: {:?})", plan.isolation);
        conn.begin(plan.isolation).await?;
    }
    let outcome = run_units(conn, plan, cancellation).await;
    if !plan.use_transaction {
        return outcome.map(|(affected, _)| affected);
    }
    match outcome {
        Ok((affected, true)) => {
            conn.commit().await?;
            tracing::debug!("Committed {} units, {} rows affected", plan.units.len(), affected);
            Ok(affected)
        }
        Ok((_, false)) => {
            tracing::warn!("Execution unit affected no rows, rolling back");
            conn.rollback().await?;
            Ok(0)
        }
        Err(e) => {
            if let Err(rollback) = conn.rollback().await {
                tracing::error!("Rollback failed: {}", rollback);
            }
            Err(e)
        }
    }
}

async fn run_units<C: Connection>(
    conn: &mut C,
    plan: &ExecutionPlan,
    cancellation: Option<&CancellationFlag>,
) -> RdbResult<(u64, bool)> {
    let total = plan.units.len();
    let mut affected = 0;
    for (completed, unit) in plan.units.iter().enumerate() {
        if cancellation.is_some_and(CancellationFlag::is_cancelled) {
            tracing::warn!("Execution cancelled after {} of {} units", completed, total);
            return Err(RdbError::Cancelled { completed, total });
        }
        let rows = conn.execute(unit).await?;
        affected += rows;
        if unit.must_affect_rows && rows == 0 && plan.use_transaction {
            return Ok((affected, false));
        }
    }
    Ok((affected, true))
}

/// Compiles and executes commands and queries against MySQL servers.
pub struct Engine<P> {
    provider: P,
    metadata: Arc<dyn EntityMetadata + Send + Sync>,
    converter: Arc<dyn FieldConverter + Send + Sync>,
    policy: Arc<dyn BatchPolicy>,
    config: EngineConfig,
}

impl<P: ConnectionProvider> Engine<P> {
    pub fn new(provider: P, metadata: Arc<dyn EntityMetadata + Send + Sync>, config: EngineConfig) -> Self {
        let policy = Arc::new(config.batch.policy());
        Self {
            provider,
            metadata,
            converter: Arc::new(MySqlFieldConverter),
            policy,
            config,
        }
    }

    /// Replace the field conversion resolver.
    pub fn with_converter(mut self, converter: Arc<dyn FieldConverter + Send + Sync>) -> Self {
        self.converter = converter;
        self
    }

    /// Replace the grouping strategy.
    pub fn with_policy(mut self, policy: Arc<dyn BatchPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn compiler(&self) -> CommandCompiler<'_> {
        CommandCompiler::new(&*self.metadata, &*self.converter)
    }

    fn statements(&self) -> StatementBuilder<'_> {
        StatementBuilder::new(&*self.metadata, &*self.converter)
    }

    /// Compile and group commands without touching the database.
    pub fn plan(&self, commands: &[Command], options: &ExecuteOptions) -> RdbResult<ExecutionPlan> {
        let compiler = self.compiler();
        let units = BatchPlanner::new(&compiler, &*self.policy)
            .trace(self.config.trace_statements)
            .plan(commands)?;
        Ok(ExecutionPlan {
            units,
            use_transaction: options.transaction.unwrap_or(commands.len() > 1),
            isolation: options.isolation.or(self.config.isolation_level),
        })
    }

    /// Execute commands on `server`; returns the total affected-row count.
    ///
    /// Compilation errors surface before a connection is opened.
    pub async fn execute(
        &self,
        server: &DatabaseServer,
        options: &ExecuteOptions,
        commands: &[Command],
    ) -> RdbResult<u64> {
        let plan = self.plan(commands, options)?;
        if plan.units.is_empty() {
            return Ok(0);
        }
        tracing::info!(
            "Executing {} units on {} (transaction: {})",
            plan.units.len(),
            server.name,
            plan.use_transaction
        );
        let mut conn = self.provider.connect(server).await?;
        execute_plan(&mut conn, &plan, options.cancellation.as_ref()).await
    }

    /// Rows matching `query`.
    pub async fn query(&self, server: &DatabaseServer, query: &Query) -> RdbResult<Vec<Row>> {
        let statement = self.statements().select(query, &mut TranslationContext::new())?;
        self.fetch_rows(server, query, &statement).await
    }

    /// One page of `query` with the total count in every row.
    pub async fn query_paging(&self, server: &DatabaseServer, query: &Query) -> RdbResult<Vec<Row>> {
        let statement = self.statements().paging(query, &mut TranslationContext::new())?;
        self.fetch_rows(server, query, &statement).await
    }

    /// `size` rows starting at `offset`.
    pub async fn query_offset(
        &self,
        server: &DatabaseServer,
        query: &Query,
        offset: usize,
        size: usize,
    ) -> RdbResult<Vec<Row>> {
        let statement = self
            .statements()
            .offset(query, offset, size, &mut TranslationContext::new())?;
        self.fetch_rows(server, query, &statement).await
    }

    pub async fn exists(&self, server: &DatabaseServer, query: &Query) -> RdbResult<bool> {
        let statement = self.statements().exists(query, &mut TranslationContext::new())?;
        let value = self.fetch_scalar(server, query, &statement).await?;
        Ok(match value {
            serde_json::Value::Bool(b) => b,
            serde_json::Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
            serde_json::Value::String(s) => s != "0",
            _ => false,
        })
    }

    pub async fn aggregate(
        &self,
        server: &DatabaseServer,
        function: AggregateFunction,
        query: &Query,
    ) -> RdbResult<serde_json::Value> {
        let statement = self
            .statements()
            .aggregate(function, query, &mut TranslationContext::new())?;
        self.fetch_scalar(server, query, &statement).await
    }

    async fn fetch_rows(
        &self,
        server: &DatabaseServer,
        query: &Query,
        statement: &Statement,
    ) -> RdbResult<Vec<Row>> {
        self.trace_statement(statement);
        let mut conn = self.provider.connect(server).await?;
        // Reads open a transaction only when the query pins an isolation level.
        let isolation = query.isolation;
        if isolation.is_none() {
            return conn.fetch_all(statement).await;
        }
        conn.begin(isolation).await?;
        match conn.fetch_all(statement).await {
            Ok(rows) => {
                conn.commit().await?;
                Ok(rows)
            }
            Err(e) => {
                if let Err(rollback) = conn.rollback().await {
                    tracing::error!("Rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    async fn fetch_scalar(
        &self,
        server: &DatabaseServer,
        query: &Query,
        statement: &Statement,
    ) -> RdbResult<serde_json::Value> {
        self.trace_statement(statement);
        let mut conn = self.provider.connect(server).await?;
        let isolation = query.isolation;
        if isolation.is_none() {
            return conn.fetch_scalar(statement).await;
        }
        conn.begin(isolation).await?;
        match conn.fetch_scalar(statement).await {
            Ok(value) => {
                conn.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = conn.rollback().await {
                    tracing::error!("Rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    fn trace_statement(&self, statement: &Statement) {
        if self.config.trace_statements {
            tracing::debug!(
                statement = %statement.text,
                parameters = ?statement.parameters.names(),
                "compiled query"
            );
        }
    }
}
