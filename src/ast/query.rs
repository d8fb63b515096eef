//! The abstract query model.

use serde::{Deserialize, Serialize};

use crate::ast::Value;
use crate::params::ParameterSet;

/// Connector placed before a condition (ignored on the first one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogicalOp {
    #[default]
    And,
    Or,
}

impl std::fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogicalOp::And => write!(f, "AND"),
            LogicalOp::Or => write!(f, "OR"),
        }
    }
}

/// Comparison operator of a criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CriterionOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    In,
    NotIn,
    Like,
    NotLike,
    BeginLike,
    NotBeginLike,
    EndLike,
    NotEndLike,
    IsNull,
    NotNull,
}

impl CriterionOperator {
    pub fn sql(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "<>",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Like | Self::BeginLike | Self::EndLike => "LIKE",
            Self::NotLike | Self::NotBeginLike | Self::NotEndLike => "NOT LIKE",
            Self::IsNull => "IS NULL",
            Self::NotNull => "IS NOT NULL",
        }
    }

    /// `IS NULL` / `IS NOT NULL` never bind a parameter.
    pub fn needs_parameter(self) -> bool {
        !matches!(self, Self::IsNull | Self::NotNull)
    }

    pub fn is_membership(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    /// Shape the bound value for the operator (LIKE patterns, membership lists).
    pub fn format_value(self, value: Value) -> Value {
        match self {
            Self::Like | Self::NotLike => Value::String(format!("%{}%", value.as_text())),
            Self::BeginLike | Self::NotBeginLike => Value::String(format!("{}%", value.as_text())),
            Self::EndLike | Self::NotEndLike => Value::String(format!("%{}", value.as_text())),
            Self::In | Self::NotIn => value.into_list(),
            _ => value,
        }
    }
}

/// Named field conversion, resolved by a [`FieldConverter`](crate::transpiler::FieldConverter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConversion {
    pub name: String,
}

impl FieldConversion {
    pub const STRING_LENGTH: &'static str = "StringLength";

    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn string_length() -> Self {
        Self::new(Self::STRING_LENGTH)
    }
}

/// Right-hand side of a criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CriterionValue {
    Value(Value),
    Query(Box<Query>),
}

/// A single comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub field: String,
    pub operator: CriterionOperator,
    pub value: CriterionValue,
    #[serde(default)]
    pub conversion: Option<FieldConversion>,
}

/// One node of the predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Criterion(Criterion),
    /// Parenthesized sub-predicate; only its conditions are used.
    Group(Query),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortEntry {
    pub field: String,
    #[serde(default)]
    pub desc: bool,
    #[serde(default)]
    pub conversion: Option<FieldConversion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub fn sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JoinOperator {
    #[default]
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl JoinOperator {
    pub fn sql(self) -> &'static str {
        match self {
            JoinOperator::Equal => "=",
            JoinOperator::NotEqual => "<>",
            JoinOperator::GreaterThan => ">",
            JoinOperator::GreaterThanOrEqual => ">=",
            JoinOperator::LessThan => "<",
            JoinOperator::LessThanOrEqual => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinEntry {
    pub kind: JoinKind,
    #[serde(default)]
    pub operator: JoinOperator,
    /// Explicit (source property, target property) pairs; inferred when empty.
    #[serde(default)]
    pub fields: Vec<(String, String)>,
    pub query: Query,
    /// Filter on the joined alias that belongs in the outer WHERE.
    #[serde(default)]
    pub extra: Option<Query>,
}

impl JoinEntry {
    pub fn new(kind: JoinKind, query: Query) -> Self {
        Self {
            kind,
            operator: JoinOperator::Equal,
            fields: Vec::new(),
            query,
            extra: None,
        }
    }

    pub fn on(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.fields.push((source.into(), target.into()));
        self
    }

    pub fn operator(mut self, operator: JoinOperator) -> Self {
        self.operator = operator;
        self
    }

    pub fn extra(mut self, query: Query) -> Self {
        self.extra = Some(query);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombineKind {
    Union,
    UnionAll,
    Intersect,
    Except,
}

impl std::fmt::Display for CombineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CombineKind::Union => write!(f, "UNION"),
            CombineKind::UnionAll => write!(f, "UNION ALL"),
            CombineKind::Intersect => write!(f, "INTERSECT"),
            CombineKind::Except => write!(f, "EXCEPT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombineEntry {
    pub kind: CombineKind,
    pub query: Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurveDirection {
    /// Walk toward parents.
    Up,
    /// Walk toward children.
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurveSpec {
    pub data_field: String,
    pub relation_field: String,
    pub direction: RecurveDirection,
}

/// 1-based page number and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    pub page: usize,
    pub size: usize,
}

impl Paging {
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Literal statement text that bypasses translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryText {
    pub text: String,
    #[serde(default)]
    pub parameters: ParameterSet,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Query {
    pub entity: String,
    #[serde(default)]
    pub text: Option<QueryText>,
    #[serde(default)]
    pub conditions: Vec<(LogicalOp, Condition)>,
    #[serde(default)]
    pub sorts: Vec<SortEntry>,
    #[serde(default)]
    pub joins: Vec<JoinEntry>,
    #[serde(default)]
    pub combines: Vec<CombineEntry>,
    #[serde(default)]
    pub recurve: Option<RecurveSpec>,
    #[serde(default)]
    pub paging: Option<Paging>,
    /// Result-size cap; 0 means uncapped.
    #[serde(default)]
    pub size: usize,
    /// Selected properties; empty means all queryable fields.
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub isolation: Option<IsolationLevel>,
}

impl Query {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            ..Default::default()
        }
    }

    /// A raw-text query, passed through translation verbatim.
    pub fn text(sql: impl Into<String>, parameters: ParameterSet) -> Self {
        Self {
            text: Some(QueryText {
                text: sql.into(),
                parameters,
            }),
            ..Default::default()
        }
    }

    pub fn is_text(&self) -> bool {
        self.text.is_some()
    }

    fn push_criterion(
        mut self,
        connector: LogicalOp,
        field: impl Into<String>,
        operator: CriterionOperator,
        value: CriterionValue,
        conversion: Option<FieldConversion>,
    ) -> Self {
        self.conditions.push((
            connector,
            Condition::Criterion(Criterion {
                field: field.into(),
                operator,
                value,
                conversion,
            }),
        ));
        self
    }

    pub fn filter(
        self,
        field: impl Into<String>,
        operator: CriterionOperator,
        value: impl Into<Value>,
    ) -> Self {
        let value = CriterionValue::Value(value.into());
        self.push_criterion(LogicalOp::And, field, operator, value, None)
    }

    pub fn or_filter(
        self,
        field: impl Into<String>,
        operator: CriterionOperator,
        value: impl Into<Value>,
    ) -> Self {
        let value = CriterionValue::Value(value.into());
        self.push_criterion(LogicalOp::Or, field, operator, value, None)
    }

    /// Compare a field (after a named conversion) against a value.
    pub fn filter_converted(
        self,
        field: impl Into<String>,
        conversion: FieldConversion,
        operator: CriterionOperator,
        value: impl Into<Value>,
    ) -> Self {
        let value = CriterionValue::Value(value.into());
        self.push_criterion(LogicalOp::And, field, operator, value, Some(conversion))
    }

    /// Compare a field against the first selected field of another query.
    pub fn filter_subquery(
        self,
        field: impl Into<String>,
        operator: CriterionOperator,
        subquery: Query,
    ) -> Self {
        let value = CriterionValue::Query(Box::new(subquery));
        self.push_criterion(LogicalOp::And, field, operator, value, None)
    }

    pub fn equal(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, CriterionOperator::Equal, value)
    }

    pub fn not_equal(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, CriterionOperator::NotEqual, value)
    }

    pub fn greater_than(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, CriterionOperator::GreaterThan, value)
    }

    pub fn less_than(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, CriterionOperator::LessThan, value)
    }

    pub fn in_list(self, field: impl Into<String>, values: impl Into<Value>) -> Self {
        self.filter(field, CriterionOperator::In, values)
    }

    pub fn like(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, CriterionOperator::Like, value)
    }

    pub fn is_null(self, field: impl Into<String>) -> Self {
        self.filter(field, CriterionOperator::IsNull, Value::Null)
    }

    pub fn not_null(self, field: impl Into<String>) -> Self {
        self.filter(field, CriterionOperator::NotNull, Value::Null)
    }

    pub fn and_group(mut self, group: Query) -> Self {
        self.conditions.push((LogicalOp::And, Condition::Group(group)));
        self
    }

    pub fn or_group(mut self, group: Query) -> Self {
        self.conditions.push((LogicalOp::Or, Condition::Group(group)));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.sorts.push(SortEntry {
            field: field.into(),
            desc: false,
            conversion: None,
        });
        self
    }

    pub fn order_by_desc(mut self, field: impl Into<String>) -> Self {
        self.sorts.push(SortEntry {
            field: field.into(),
            desc: true,
            conversion: None,
        });
        self
    }

    pub fn select(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn limit(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn page(mut self, page: usize, size: usize) -> Self {
        self.paging = Some(Paging { page, size });
        self
    }

    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    pub fn join(mut self, kind: JoinKind, query: Query) -> Self {
        self.joins.push(JoinEntry::new(kind, query));
        self
    }

    pub fn with_join(mut self, entry: JoinEntry) -> Self {
        self.joins.push(entry);
        self
    }

    pub fn combine(mut self, kind: CombineKind, query: Query) -> Self {
        self.combines.push(CombineEntry { kind, query });
        self
    }

    pub fn union(self, query: Query) -> Self {
        self.combine(CombineKind::Union, query)
    }

    pub fn union_all(self, query: Query) -> Self {
        self.combine(CombineKind::UnionAll, query)
    }

    pub fn intersect(self, query: Query) -> Self {
        self.combine(CombineKind::Intersect, query)
    }

    pub fn except(self, query: Query) -> Self {
        self.combine(CombineKind::Except, query)
    }

    pub fn recurve(
        mut self,
        data_field: impl Into<String>,
        relation_field: impl Into<String>,
        direction: RecurveDirection,
    ) -> Self {
        self.recurve = Some(RecurveSpec {
            data_field: data_field.into(),
            relation_field: relation_field.into(),
            direction,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_value_shaping() {
        let op = CriterionOperator::Like;
        assert_eq!(op.format_value("ab".into()), Value::String("%ab%".into()));
        let op = CriterionOperator::NotBeginLike;
        assert_eq!(op.format_value("ab".into()), Value::String("ab%".into()));
        let op = CriterionOperator::EndLike;
        assert_eq!(op.format_value("ab".into()), Value::String("%ab".into()));
        let op = CriterionOperator::In;
        assert_eq!(op.format_value(3.into()), Value::List(vec![Value::Int(3)]));
    }

    #[test]
    fn test_null_operators_bind_nothing() {
        assert!(!CriterionOperator::IsNull.needs_parameter());
        assert!(!CriterionOperator::NotNull.needs_parameter());
        assert!(CriterionOperator::Equal.needs_parameter());
    }

    #[test]
    fn test_builder_connectors() {
        let q = Query::new("Order").equal("id", 7).or_filter(
            "status",
            CriterionOperator::Equal,
            "NEW",
        );
        assert_eq!(q.conditions.len(), 2);
        assert_eq!(q.conditions[1].0, LogicalOp::Or);
    }

    #[test]
    fn test_paging_offset() {
        assert_eq!(Paging { page: 3, size: 20 }.offset(), 40);
        assert_eq!(Paging { page: 0, size: 20 }.offset(), 0);
        assert_eq!(Paging { page: usize::MAX, size: usize::MAX }.offset(), usize::MAX);
    }
}
