//! Column references, select-list entries and field conversions.

use crate::ast::FieldConversion;
use crate::error::{RdbError, RdbResult};
use crate::metadata::{EntityField, EntityMetadata};

use super::{qualify, quote_identifier};

/// Resolves a named [`FieldConversion`] into a SQL expression over a column.
pub trait FieldConverter {
    fn convert(&self, conversion: &FieldConversion, alias: &str, column: &str) -> RdbResult<String>;
}

/// Built-in MySQL conversions.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlFieldConverter;

impl FieldConverter for MySqlFieldConverter {
    fn convert(&self, conversion: &FieldConversion, alias: &str, column: &str) -> RdbResult<String> {
        match conversion.name.as_str() {
            FieldConversion::STRING_LENGTH => Ok(format!("CHAR_LENGTH({})", qualify(alias, column))),
            other => Err(RdbError::conversion(other)),
        }
    }
}

/// Formats field references of an entity under a table alias.
#[derive(Clone, Copy)]
pub struct FieldFormatter<'a> {
    metadata: &'a dyn EntityMetadata,
    converter: &'a dyn FieldConverter,
}

impl<'a> FieldFormatter<'a> {
    pub fn new(metadata: &'a dyn EntityMetadata, converter: &'a dyn FieldConverter) -> Self {
        Self { metadata, converter }
    }

    /// Column reference used in predicates and sorts, with an optional conversion applied.
    pub fn criteria_field(
        &self,
        entity: &str,
        alias: &str,
        property: &str,
        conversion: Option<&FieldConversion>,
    ) -> RdbResult<String> {
        let field = self.metadata.field(entity, property);
        match conversion {
            Some(c) => self.converter.convert(c, alias, field.column()),
            None => Ok(qualify(alias, field.column())),
        }
    }

    /// Select-list entry.
    ///
    /// Without `with_alias` the bare column is emitted so derived tables
    /// expose physical column names to the enclosing statement.
    pub fn query_field(&self, alias: &str, field: &EntityField, with_alias: bool) -> String {
        let column = qualify(alias, field.column());
        if !with_alias {
            return column;
        }
        match &field.query_format {
            Some(format) => format!(
                "{} AS {}",
                format.replace("{0}", &column),
                quote_identifier(&field.property)
            ),
            None if field.column() != field.property => {
                format!("{} AS {}", column, quote_identifier(&field.property))
            }
            None => column,
        }
    }

    /// Selected properties resolved to fields; all queryable fields when none are selected.
    pub fn resolve_fields(&self, entity: &str, selected: &[String]) -> Vec<EntityField> {
        if selected.is_empty() {
            self.metadata.query_fields(entity)
        } else {
            selected
                .iter()
                .map(|p| self.metadata.field(entity, p))
                .collect()
        }
    }

    /// Comma-separated select list; `alias.*` when the entity maps no fields.
    pub fn select_list(&self, alias: &str, entity: &str, selected: &[String], with_alias: bool) -> String {
        let fields = self.resolve_fields(entity, selected);
        if fields.is_empty() {
            return format!("{}.*", alias);
        }
        fields
            .iter()
            .map(|f| self.query_field(alias, f, with_alias))
            .collect::<Vec<_>>()
            .join(",")
    }
}
