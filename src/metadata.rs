//! Entity metadata: logical entity/property names to physical tables/columns.
//!
//! The compilers only see the [`EntityMetadata`] trait. [`EntityCatalog`] is an
//! in-memory implementation that can be built in code or loaded from TOML.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RdbError, RdbResult};

/// A mapped property of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityField {
    pub property: String,
    #[serde(default)]
    column: Option<String>,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default = "default_true")]
    pub editable: bool,
    #[serde(default = "default_true")]
    pub queryable: bool,
    /// Select-list template; `{0}` is replaced by the qualified column.
    #[serde(default)]
    pub query_format: Option<String>,
}

fn default_true() -> bool {
    true
}

impl EntityField {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            column: None,
            primary_key: false,
            editable: true,
            queryable: true,
            query_format: None,
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.editable = false;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.queryable = false;
        self
    }

    pub fn query_format(mut self, format: impl Into<String>) -> Self {
        self.query_format = Some(format.into());
        self
    }

    /// Physical column name (the property name unless mapped).
    pub fn column(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.property)
    }
}

/// Lookup interface used by the compilers. Pure: no caching, no invalidation.
pub trait EntityMetadata {
    /// Physical table name of the entity.
    fn object_name(&self, entity: &str) -> String;

    /// Field mapping; unknown properties map to a column of the same name.
    fn field(&self, entity: &str, property: &str) -> EntityField;

    fn primary_keys(&self, entity: &str) -> Vec<String>;

    /// Declared (source property, target property) pairs from `source` to `target`.
    fn relation_fields(&self, source: &str, target: &str) -> Vec<(String, String)>;

    /// Queryable fields in declaration order.
    fn query_fields(&self, entity: &str) -> Vec<EntityField>;

    /// Editable fields in declaration order.
    fn edit_fields(&self, entity: &str) -> Vec<EntityField>;

    /// Field used for existence/count probes: first primary key, else first queryable field.
    fn default_field(&self, entity: &str) -> Option<EntityField> {
        match self.primary_keys(entity).first() {
            Some(key) => Some(self.field(entity, key)),
            None => self.query_fields(entity).into_iter().next(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub target: String,
    pub fields: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDef {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub fields: Vec<EntityField>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl EntityDef {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..Default::default()
        }
    }

    pub fn key(self, property: impl Into<String>) -> Self {
        self.with_field(EntityField::new(property).primary_key())
    }

    pub fn field(self, property: impl Into<String>) -> Self {
        self.with_field(EntityField::new(property))
    }

    pub fn column(self, property: impl Into<String>, column: impl Into<String>) -> Self {
        self.with_field(EntityField::new(property).with_column(column))
    }

    pub fn with_field(mut self, field: EntityField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn relation(mut self, target: impl Into<String>, fields: &[(&str, &str)]) -> Self {
        self.relations.push(Relation {
            target: target.into(),
            fields: fields
                .iter()
                .map(|(s, t)| (s.to_string(), t.to_string()))
                .collect(),
        });
        self
    }
}

/// In-memory [`EntityMetadata`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCatalog {
    #[serde(default)]
    entities: HashMap<String, EntityDef>,
}

impl EntityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, name: impl Into<String>, def: EntityDef) -> Self {
        self.entities.insert(name.into(), def);
        self
    }

    pub fn get(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(name)
    }

    pub fn from_toml_str(s: &str) -> RdbResult<Self> {
        toml::from_str(s).map_err(|e| RdbError::Config(format!("invalid entity catalog: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> RdbResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

impl EntityMetadata for EntityCatalog {
    fn object_name(&self, entity: &str) -> String {
        self.entities
            .get(entity)
            .and_then(|d| d.table.clone())
            .unwrap_or_else(|| entity.to_string())
    }

    fn field(&self, entity: &str, property: &str) -> EntityField {
        self.entities
            .get(entity)
            .and_then(|d| d.fields.iter().find(|f| f.property == property))
            .cloned()
            .unwrap_or_else(|| EntityField::new(property))
    }

    fn primary_keys(&self, entity: &str) -> Vec<String> {
        self.entities
            .get(entity)
            .map(|d| {
                d.fields
                    .iter()
                    .filter(|f| f.primary_key)
                    .map(|f| f.property.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn relation_fields(&self, source: &str, target: &str) -> Vec<(String, String)> {
        self.entities
            .get(source)
            .and_then(|d| d.relations.iter().find(|r| r.target == target))
            .map(|r| r.fields.clone())
            .unwrap_or_default()
    }

    fn query_fields(&self, entity: &str) -> Vec<EntityField> {
        self.entities
            .get(entity)
            .map(|d| d.fields.iter().filter(|f| f.queryable).cloned().collect())
            .unwrap_or_default()
    }

    fn edit_fields(&self, entity: &str) -> Vec<EntityField> {
        self.entities
            .get(entity)
            .map(|d| d.fields.iter().filter(|f| f.editable).cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> EntityCatalog {
        EntityCatalog::new().entity(
            "Order",
            EntityDef::new("orders")
                .key("id")
                .column("total", "total_amount")
                .with_field(EntityField::new("created").read_only())
                .relation("Customer", &[("customer_id", "id")]),
        )
    }

    #[test]
    fn test_lookup_and_fallbacks() {
        let c = catalog();
        assert_eq!(c.object_name("Order"), "orders");
        assert_eq!(c.object_name("Unknown"), "Unknown");
        assert_eq!(c.field("Order", "total").column(), "total_amount");
        assert_eq!(c.field("Order", "note").column(), "note");
        assert_eq!(c.primary_keys("Order"), vec!["id".to_string()]);
        assert_eq!(c.default_field("Order").map(|f| f.property), Some("id".to_string()));
        assert_eq!(c.edit_fields("Order").len(), 2);
        assert_eq!(c.query_fields("Order").len(), 3);
    }

    #[test]
    fn test_relations_are_directional() {
        let c = catalog();
        assert_eq!(
            c.relation_fields("Order", "Customer"),
            vec![("customer_id".to_string(), "id".to_string())]
        );
        assert!(c.relation_fields("Customer", "Order").is_empty());
    }

    #[test]
    fn test_from_toml() {
        let c = EntityCatalog::from_toml_str(
            r#"
            [entities.Order]
            table = "orders"
            fields = [
                { property = "id", primary_key = true },
                { property = "total", column = "total_amount" },
            ]
            relations = [{ target = "Customer", fields = [["customer_id", "id"]] }]
            "#,
        )
        .unwrap();
        assert_eq!(c, catalog_without_created());
    }

    fn catalog_without_created() -> EntityCatalog {
        EntityCatalog::new().entity(
            "Order",
            EntityDef::new("orders")
                .key("id")
                .column("total", "total_amount")
                .relation("Customer", &[("customer_id", "id")]),
        )
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = EntityCatalog::from_toml_str("entities = 3").unwrap_err();
        assert!(matches!(err, RdbError::Config(_)));
    }
}
