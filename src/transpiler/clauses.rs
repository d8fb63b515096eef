//! Clause-level result of translating one query.

use crate::params::ParameterSet;

/// Generated recursive closure table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurveTable {
    pub name: String,
    pub alias: String,
}

/// Rendered predicate plus whatever it pulled up from nested queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionFragment {
    pub text: String,
    pub with: Vec<String>,
    pub recurve: Option<RecurveTable>,
}

impl ConditionFragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Clause fragments of a translated query.
///
/// Statement builders compose the final text from the render methods; no
/// clause carries its own leading or trailing whitespace.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    /// Raw statement text of a text query, used verbatim.
    pub text: Option<String>,
    /// WHERE body without the keyword.
    pub condition: String,
    pub sorts: Vec<String>,
    pub joins: Vec<String>,
    /// Recursive CTE definitions (`name AS (...)`).
    pub with: Vec<String>,
    /// Native set operations, each starting with its operator.
    pub combines: Vec<String>,
    /// Predicates on joined aliases that belong in the outermost WHERE.
    pub join_extra_condition: Vec<String>,
    /// False when the joins were folded into a recursive anchor.
    pub allow_join: bool,
    pub recurve: Option<RecurveTable>,
    /// Filled only by a top-level translation.
    pub parameters: ParameterSet,
    /// The condition has an `OR` at its top level.
    pub(crate) has_or: bool,
}

impl Default for Translation {
    fn default() -> Self {
        Self {
            text: None,
            condition: String::new(),
            sorts: Vec::new(),
            joins: Vec::new(),
            with: Vec::new(),
            combines: Vec::new(),
            join_extra_condition: Vec::new(),
            allow_join: true,
            recurve: None,
            parameters: ParameterSet::new(),
            has_or: false,
        }
    }
}

impl Translation {
    pub fn passthrough(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn is_text(&self) -> bool {
        self.text.is_some()
    }

    pub fn has_combine(&self) -> bool {
        !self.combines.is_empty()
    }

    /// AND a predicate onto the condition, parenthesizing an OR chain first.
    pub fn and_condition(&mut self, extra: &str) {
        if extra.is_empty() {
            return;
        }
        if self.condition.is_empty() {
            self.condition = extra.to_string();
        } else if self.has_or {
            self.condition = format!("({}) AND {}", self.condition, extra);
        } else {
            self.condition = format!("{} AND {}", self.condition, extra);
        }
        self.has_or = false;
    }

    /// Move the collected join extras into the condition.
    pub fn merge_join_extra(&mut self) {
        for extra in std::mem::take(&mut self.join_extra_condition) {
            self.and_condition(&extra);
        }
    }

    pub fn where_clause(&self) -> String {
        if self.condition.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.condition)
        }
    }

    pub fn order_clause(&self) -> String {
        if self.sorts.is_empty() {
            String::new()
        } else {
            format!("ORDER BY {}", self.sorts.join(","))
        }
    }

    /// Join clauses, empty when they were folded into a recursive anchor.
    pub fn join_clause(&self) -> String {
        if self.allow_join {
            self.joins.join(" ")
        } else {
            String::new()
        }
    }

    pub fn combine_clause(&self) -> String {
        self.combines.join(" ")
    }

    /// `WITH RECURSIVE a,b`, or empty.
    pub fn pre_script(&self) -> String {
        if self.with.is_empty() {
            String::new()
        } else {
            format!("WITH RECURSIVE {}", self.with.join(","))
        }
    }

    pub fn has_pre_script(&self) -> bool {
        !self.with.is_empty()
    }
}
