//! Named statement parameters.
//!
//! A [`ParameterSet`] keeps insertion order and unique names. The command
//! compiler copies payload entries under their sequenced placeholder names,
//! and the batch executor unions the sets of merged statements.

use serde::{Deserialize, Serialize};

use crate::ast::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

/// Declared backend type of a parameter, when the caller pins one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    Bool,
    Int,
    BigInt,
    Decimal,
    Double,
    String,
    DateTime,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
    #[serde(default)]
    pub direction: ParameterDirection,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub precision: Option<u8>,
    #[serde(default)]
    pub scale: Option<u8>,
    #[serde(default)]
    pub sql_type: Option<SqlType>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            direction: ParameterDirection::Input,
            size: None,
            precision: None,
            scale: None,
            sql_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    items: Vec<Parameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, replacing any parameter with the same name in place.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.add_parameter(Parameter::new(name, value))
    }

    pub fn add_parameter(&mut self, parameter: Parameter) -> &mut Self {
        match self.position(&parameter.name) {
            Some(i) => self.items[i] = parameter,
            None => self.items.push(parameter),
        }
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.items.iter().find(|p| p.name == name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).map(|p| &p.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Substitute the value of an existing parameter.
    pub fn modify_value(&mut self, name: &str, value: Value) -> bool {
        match self.position(name) {
            Some(i) => {
                self.items[i].value = value;
                true
            }
            None => false,
        }
    }

    /// Merge another set into this one; entries of `other` win on name clashes.
    pub fn union(&mut self, other: ParameterSet) -> &mut Self {
        for parameter in other.items {
            self.add_parameter(parameter);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.items.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(|p| p.name.as_str()).collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|p| p.name == name)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = ParameterSet::new();
        for (name, value) in iter {
            set.add(name, value);
        }
        set
    }
}

impl IntoIterator for ParameterSet {
    type Item = Parameter;
    type IntoIter = std::vec::IntoIter<Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_replaces_in_place() {
        let mut set = ParameterSet::new().with("a", 1).with("b", 2);
        set.add("a", 3);
        assert_eq!(set.names(), vec!["a", "b"]);
        assert_eq!(set.value("a"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_union_and_modify() {
        let mut left = ParameterSet::new().with("x1", 1);
        let right = ParameterSet::new().with("y2", "b").with("x1", 9);
        left.union(right);
        assert_eq!(left.names(), vec!["x1", "y2"]);
        assert_eq!(left.value("x1"), Some(&Value::Int(9)));
        assert!(left.modify_value("y2", Value::Null));
        assert!(!left.modify_value("z", Value::Null));
    }

    #[test]
    fn test_serde_list_form() {
        let set: ParameterSet =
            serde_json::from_str(r#"[{"name": "id", "value": 7}, {"name": "n", "value": "a", "size": 10}]"#)
                .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("n").and_then(|p| p.size), Some(10));
    }
}
