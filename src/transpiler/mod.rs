//! MySQL translation of the abstract query/command model.
//!
//! - [`QueryTranslator`] lowers a [`Query`](crate::ast::Query) into clause fragments
//!   ([`Translation`]) sharing one [`ParameterSet`](crate::params::ParameterSet).
//! - [`CommandCompiler`] turns write commands into [`ExecutionUnit`]s.
//! - [`StatementBuilder`] assembles read statements (select, paging, exists, aggregate).
//!
//! All generated names come from a [`TranslationContext`] owned by the caller
//! and threaded through every recursive call.

pub mod clauses;
pub mod command;
pub mod conditions;
pub mod fields;
pub mod query;
pub mod select;

use std::collections::HashSet;

pub use clauses::{ConditionFragment, RecurveTable, Translation};
pub use command::{CommandCompiler, CommandType, ExecutionUnit};
pub use fields::{FieldConverter, FieldFormatter, MySqlFieldConverter};
pub use query::QueryTranslator;
pub use select::{AggregateFunction, Statement, StatementBuilder};

/// Alias of the statement's main table.
pub const OBJECT_ALIAS: &str = "TB";
/// Placeholder marker; placeholders are `?name`.
pub const PARAMETER_PREFIX: &str = "?";
pub const RECURVE_TABLE_NAME: &str = "RecurveTable";
pub const RECURVE_TABLE_ALIAS: &str = "RTT";
pub const SUB_OBJECT_ALIAS: &str = "S";
pub const PAGING_TABLE_NAME: &str = "PagingTable";
pub const TOTAL_COUNT_COLUMN: &str = "QueryDataTotalCount";

/// Per-call name generator for sub aliases, closure tables and parameters.
///
/// Alias counters restart with each top-level translation; the parameter
/// sequence keeps running so statements merged into one batch never share
/// a parameter name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationContext {
    sub_sequence: usize,
    recurve_sequence: usize,
    parameter_sequence: usize,
    /// Every parameter name handed out or reserved so far.
    issued: HashSet<String>,
}

impl TranslationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset_aliases(&mut self) {
        self.sub_sequence = 0;
        self.recurve_sequence = 0;
    }

    pub fn reset_parameters(&mut self) {
        self.parameter_sequence = 0;
        self.issued.clear();
    }

    /// Keep a caller-supplied name (raw text parameters) out of generation.
    pub fn reserve_parameter(&mut self, name: &str) {
        self.issued.insert(name.to_string());
    }

    pub fn parameter_sequence(&self) -> usize {
        self.parameter_sequence
    }

    /// `S0`, `S1`, …
    pub fn next_sub_alias(&mut self) -> String {
        let alias = format!("{}{}", SUB_OBJECT_ALIAS, self.sub_sequence);
        self.sub_sequence += 1;
        alias
    }

    /// `RecurveTable0` aliased `RTT0`, …
    pub fn next_recurve_table(&mut self) -> RecurveTable {
        let n = self.recurve_sequence;
        self.recurve_sequence += 1;
        RecurveTable {
            name: format!("{}{}", RECURVE_TABLE_NAME, n),
            alias: format!("{}{}", RECURVE_TABLE_ALIAS, n),
        }
    }

    /// `base` followed by the next parameter sequence number (starting at 1).
    ///
    /// A base ending in a digit can spell an earlier name (`a1` + `1` and
    /// `a` + `11`); the sequence advances past any name already issued.
    pub fn next_parameter_name(&mut self, base: &str) -> String {
        loop {
            self.parameter_sequence += 1;
            let name = format!("{}{}", base, self.parameter_sequence);
            if self.issued.insert(name.clone()) {
                return name;
            }
        }
    }
}

/// Quote a MySQL identifier with backticks, doubling embedded backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// `alias.`column``
pub fn qualify(alias: &str, column: &str) -> String {
    if alias.is_empty() {
        quote_identifier(column)
    } else {
        format!("{}.{}", alias, quote_identifier(column))
    }
}

pub fn placeholder(name: &str) -> String {
    format!("{}{}", PARAMETER_PREFIX, name)
}

/// Join the non-empty parts of a statement with single spaces.
pub fn sql_parts<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(|p| p.as_ref().trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
