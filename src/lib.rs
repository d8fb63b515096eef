//! # qail-rdb — Abstract Commands to MySQL
//!
//! Translates dialect-neutral queries and write commands into parameterized
//! MySQL, then runs them in merged batches with transaction and
//! must-affect-rows semantics.
//!
//! ## Quick Example
//!
//! ```rust
//! use qail_rdb::prelude::*;
//!
//! let catalog = EntityCatalog::new()
//!     .entity("Order", EntityDef::new("orders").key("id").field("status"));
//!
//! let cmd = Command::update("Order")
//!     .set("status", "PAID")
//!     .filter(Query::new("Order").equal("id", 7));
//!
//! let compiler = CommandCompiler::new(&catalog, &MySqlFieldConverter);
//! let unit = compiler.compile(&cmd, &mut TranslationContext::new()).unwrap();
//! assert_eq!(
//!     unit.text(),
//!     "UPDATE `orders` AS TB SET TB.`status`=?status1 WHERE TB.`id` = ?id2;"
//! );
//! ```
//!
//! ## Layers
//!
//! | Module         | Role                                             |
//! |----------------|--------------------------------------------------|
//! | [`ast`]        | Query, command and value model                   |
//! | [`metadata`]   | Entity → table/column mapping                    |
//! | [`transpiler`] | Query, command and read-statement compilers      |
//! | [`parser`]     | Named → positional placeholder rewriting         |
//! | [`engine`]     | Batch grouping, transactions, MySQL connections  |

pub mod ast;
pub mod config;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod params;
pub mod parser;
pub mod transpiler;

pub mod prelude {
    pub use crate::ast::*;
    pub use crate::config::{BatchConfig, DatabaseServer, EngineConfig};
    pub use crate::engine::{
        BatchPlanner, BatchPolicy, CancellationFlag, Connection, ConnectionProvider, Engine,
        ExecuteOptions, ExecutionPlan, MySqlProvider, Row, ThresholdPolicy,
    };
    pub use crate::error::*;
    pub use crate::metadata::{EntityCatalog, EntityDef, EntityField, EntityMetadata};
    pub use crate::params::{Parameter, ParameterSet};
    pub use crate::transpiler::{
        AggregateFunction, CommandCompiler, ExecutionUnit, FieldConverter, MySqlFieldConverter,
        QueryTranslator, Statement, StatementBuilder, Translation, TranslationContext,
    };
}
