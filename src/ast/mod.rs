//! Dialect-neutral query and command model.

pub mod command;
pub mod query;
pub mod values;

pub use command::{CalculateOperator, Command, CommandKind};
pub use query::{
    CombineEntry, CombineKind, Condition, Criterion, CriterionOperator, CriterionValue,
    FieldConversion, IsolationLevel, JoinEntry, JoinKind, JoinOperator, LogicalOp, Paging, Query,
    QueryText, RecurveDirection, RecurveSpec, SortEntry,
};
pub use values::Value;
