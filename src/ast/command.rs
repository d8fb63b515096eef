//! Abstract write commands.

use serde::{Deserialize, Serialize};

use crate::ast::{Query, Value};
use crate::params::ParameterSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Literal statement text; `procedure` renders a `CALL`.
    Text {
        text: String,
        #[serde(default)]
        procedure: bool,
    },
    Insert,
    Update,
    Delete,
}

/// Delta applied to the current column value on update (`x = x + ?`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalculateOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl CalculateOperator {
    pub fn sql(self) -> &'static str {
        match self {
            CalculateOperator::Add => "+",
            CalculateOperator::Subtract => "-",
            CalculateOperator::Multiply => "*",
            CalculateOperator::Divide => "/",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    #[serde(default)]
    pub entity: String,
    /// Overrides the table name resolved from metadata.
    #[serde(default)]
    pub object_name: Option<String>,
    /// Target properties of an update.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Filter for update/delete.
    #[serde(default)]
    pub query: Option<Query>,
    /// Payload keyed by property name.
    #[serde(default)]
    pub values: ParameterSet,
    #[serde(default)]
    pub calculations: Vec<(String, CalculateOperator)>,
    #[serde(default)]
    pub must_affect_rows: bool,
}

impl Command {
    fn new(kind: CommandKind, entity: impl Into<String>) -> Self {
        Self {
            kind,
            entity: entity.into(),
            object_name: None,
            fields: Vec::new(),
            query: None,
            values: ParameterSet::new(),
            calculations: Vec::new(),
            must_affect_rows: false,
        }
    }

    pub fn insert(entity: impl Into<String>, values: ParameterSet) -> Self {
        let mut cmd = Self::new(CommandKind::Insert, entity);
        cmd.values = values;
        cmd
    }

    pub fn update(entity: impl Into<String>) -> Self {
        Self::new(CommandKind::Update, entity)
    }

    pub fn delete(entity: impl Into<String>) -> Self {
        Self::new(CommandKind::Delete, entity)
    }

    pub fn text(sql: impl Into<String>, values: ParameterSet) -> Self {
        let mut cmd = Self::new(
            CommandKind::Text {
                text: sql.into(),
                procedure: false,
            },
            "",
        );
        cmd.values = values;
        cmd
    }

    /// A stored procedure call over the payload parameters.
    pub fn procedure(name: impl Into<String>, values: ParameterSet) -> Self {
        let mut cmd = Self::new(
            CommandKind::Text {
                text: name.into(),
                procedure: true,
            },
            "",
        );
        cmd.values = values;
        cmd
    }

    /// Assign a plain value to a field on update.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        self.values.add(field.clone(), value);
        self.calculations.retain(|(f, _)| *f != field);
        self.push_field(field);
        self
    }

    /// Apply a delta to a field on update.
    pub fn calculate(
        mut self,
        field: impl Into<String>,
        operator: CalculateOperator,
        operand: impl Into<Value>,
    ) -> Self {
        let field = field.into();
        let operand = operand.into();
        if !self.values.modify_value(&field, operand.clone()) {
            self.values.add(field.clone(), operand);
        }
        self.calculations.retain(|(f, _)| *f != field);
        self.calculations.push((field.clone(), operator));
        self.push_field(field);
        self
    }

    pub fn filter(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    pub fn object_name(mut self, name: impl Into<String>) -> Self {
        self.object_name = Some(name.into());
        self
    }

    pub fn must_affect_rows(mut self) -> Self {
        self.must_affect_rows = true;
        self
    }

    pub fn calculation(&self, field: &str) -> Option<CalculateOperator> {
        self.calculations
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, op)| *op)
    }

    fn push_field(&mut self, field: String) {
        if !self.fields.contains(&field) {
            self.fields.push(field);
        }
    }
}
