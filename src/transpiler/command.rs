//! Write command compilation.

use crate::ast::{Command, CommandKind, Query, Value};
use crate::error::{RdbError, RdbResult};
use crate::metadata::EntityMetadata;
use crate::params::{Parameter, ParameterSet};

use super::fields::FieldConverter;
use super::{
    placeholder, qualify, quote_identifier, sql_parts, QueryTranslator, TranslationContext,
    OBJECT_ALIAS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    Text,
    Procedure,
}

/// Compiled, executable form of one or more commands.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionUnit {
    /// Statements in execution order; a merged unit holds several.
    pub statements: Vec<String>,
    pub parameters: ParameterSet,
    pub command_type: CommandType,
    /// Must run as its own unit, never merged.
    pub perform_alone: bool,
    /// Zero affected rows fails the transaction.
    pub must_affect_rows: bool,
    /// Starts with a `WITH RECURSIVE` prefix.
    pub has_pre_script: bool,
}

impl ExecutionUnit {
    pub fn statement(text: impl Into<String>, parameters: ParameterSet) -> Self {
        Self {
            statements: vec![text.into()],
            parameters,
            command_type: CommandType::Text,
            perform_alone: false,
            must_affect_rows: false,
            has_pre_script: false,
        }
    }

    /// Full statement text, one statement per line.
    pub fn text(&self) -> String {
        self.statements.join("\n")
    }

    /// Append another unit's statements and parameters.
    pub fn merge(&mut self, other: ExecutionUnit) {
        self.statements.extend(other.statements);
        self.parameters.union(other.parameters);
        self.must_affect_rows |= other.must_affect_rows;
        self.has_pre_script |= other.has_pre_script;
    }
}

/// Compiles [`Command`]s to [`ExecutionUnit`]s.
pub struct CommandCompiler<'a> {
    metadata: &'a dyn EntityMetadata,
    translator: QueryTranslator<'a>,
}

impl<'a> CommandCompiler<'a> {
    pub fn new(metadata: &'a dyn EntityMetadata, converter: &'a dyn FieldConverter) -> Self {
        Self {
            metadata,
            translator: QueryTranslator::new(metadata, converter),
        }
    }

    pub fn compile(&self, command: &Command, ctx: &mut TranslationContext) -> RdbResult<ExecutionUnit> {
        let mut unit = match &command.kind {
            CommandKind::Text { text, procedure } => {
                return Ok(self.compile_text(text, *procedure, command));
            }
            CommandKind::Insert => self.compile_insert(command, ctx)?,
            CommandKind::Update => self.compile_update(command, ctx)?,
            CommandKind::Delete => self.compile_delete(command, ctx)?,
        };
        unit.must_affect_rows = command.must_affect_rows;
        Ok(unit)
    }

    fn table(&self, command: &Command) -> String {
        let name = command
            .object_name
            .clone()
            .unwrap_or_else(|| self.metadata.object_name(&command.entity));
        quote_identifier(&name)
    }

    fn compile_insert(&self, command: &Command, ctx: &mut TranslationContext) -> RdbResult<ExecutionUnit> {
        let fields = self.metadata.edit_fields(&command.entity);
        if fields.is_empty() {
            return Err(RdbError::Config(format!(
                "entity '{}' has no editable fields to insert",
                command.entity
            )));
        }
        // Fresh set: payload names may collide with generated ones (`phone` → `phone1`).
        let mut parameters = ParameterSet::new();
        let mut columns = Vec::with_capacity(fields.len());
        let mut values = Vec::with_capacity(fields.len());
        for field in &fields {
            let name = ctx.next_parameter_name(&field.property);
            parameters.add_parameter(bind_payload(&command.values, &field.property, &name));
            columns.push(quote_identifier(field.column()));
            values.push(placeholder(&name));
        }

        let text = format!(
            "INSERT INTO {} ({}) VALUES ({});",
            self.table(command),
            columns.join(","),
            values.join(",")
        );
        Ok(ExecutionUnit::statement(text, parameters))
    }

    /// SET parameters are sequenced before the filter's.
    fn compile_update(&self, command: &Command, ctx: &mut TranslationContext) -> RdbResult<ExecutionUnit> {
        if command.fields.is_empty() {
            return Err(RdbError::MissingUpdateFields {
                entity: command.entity.clone(),
            });
        }
        let mut parameters = ParameterSet::new();
        let mut assignments = Vec::with_capacity(command.fields.len());
        for property in &command.fields {
            let column = qualify(OBJECT_ALIAS, self.metadata.field(&command.entity, property).column());
            let name = ctx.next_parameter_name(property);
            let value = match command.calculation(property) {
                Some(op) if command.values.contains(property) => {
                    format!("{}{}{}", column, op.sql(), placeholder(&name))
                }
                _ => placeholder(&name),
            };
            parameters.add_parameter(bind_payload(&command.values, property, &name));
            assignments.push(format!("{}={}", column, value));
        }

        let query = self.filter_query(command);
        let translated = self.translator.translate(&query, ctx)?;
        let has_pre_script = translated.has_pre_script();
        let text = sql_parts(&[
            translated.pre_script(),
            format!("UPDATE {} AS {}", self.table(command), OBJECT_ALIAS),
            translated.join_clause(),
            format!("SET {}", assignments.join(", ")),
            translated.where_clause(),
        ]) + ";";
        parameters.union(translated.parameters);

        let mut unit = ExecutionUnit::statement(text, parameters);
        unit.has_pre_script = has_pre_script;
        unit.perform_alone = has_pre_script;
        Ok(unit)
    }

    fn compile_delete(&self, command: &Command, ctx: &mut TranslationContext) -> RdbResult<ExecutionUnit> {
        let query = self.filter_query(command);
        let translated = self.translator.translate(&query, ctx)?;
        let has_pre_script = translated.has_pre_script();
        let text = sql_parts(&[
            translated.pre_script(),
            format!("DELETE {} FROM {} AS {}", OBJECT_ALIAS, self.table(command), OBJECT_ALIAS),
            translated.join_clause(),
            translated.where_clause(),
        ]) + ";";

        let mut unit = ExecutionUnit::statement(text, translated.parameters);
        unit.has_pre_script = has_pre_script;
        unit.perform_alone = has_pre_script;
        Ok(unit)
    }

    /// Literal text and procedure calls always run alone.
    fn compile_text(&self, text: &str, procedure: bool, command: &Command) -> ExecutionUnit {
        let (text, command_type) = if procedure {
            let args = command
                .values
                .names()
                .into_iter()
                .map(placeholder)
                .collect::<Vec<_>>()
                .join(", ");
            (format!("CALL {}({})", text, args), CommandType::Procedure)
        } else {
            (text.to_string(), CommandType::Text)
        };
        ExecutionUnit {
            statements: vec![text],
            parameters: command.values.clone(),
            command_type,
            perform_alone: true,
            must_affect_rows: command.must_affect_rows,
            has_pre_script: true,
        }
    }

    /// The command's filter, or an unfiltered query over its entity.
    fn filter_query(&self, command: &Command) -> Query {
        command
            .query
            .clone()
            .unwrap_or_else(|| Query::new(command.entity.clone()))
    }
}

/// The payload entry for `property` under its generated `name`, or `NULL`.
fn bind_payload(payload: &ParameterSet, property: &str, name: &str) -> Parameter {
    match payload.get(property) {
        Some(p) => Parameter {
            name: name.to_string(),
            ..p.clone()
        },
        None => Parameter::new(name, Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CalculateOperator;
    use crate::metadata::{EntityCatalog, EntityDef, EntityField};

    fn catalog() -> EntityCatalog {
        EntityCatalog::new().entity(
            "Order",
            EntityDef::new("orders")
                .key("id")
                .field("status")
                .column("total", "total_amount")
                .with_field(EntityField::new("created").read_only()),
        )
    }

    fn compile(command: &Command) -> RdbResult<ExecutionUnit> {
        let catalog = catalog();
        let compiler = CommandCompiler::new(&catalog, &super::super::MySqlFieldConverter);
        compiler.compile(command, &mut TranslationContext::new())
    }

    #[test]
    fn test_insert_binds_editable_fields() {
        let values = ParameterSet::new()
            .with("status", "NEW")
            .with("id", 7)
            .with("ignored", 1);
        let unit = compile(&Command::insert("Order", values)).unwrap();
        assert_eq!(
            unit.text(),
            "INSERT INTO `orders` (`id`,`status`,`total_amount`) VALUES (?id1,?status2,?total3);"
        );
        assert_eq!(unit.parameters.names(), vec!["id1", "status2", "total3"]);
        assert_eq!(unit.parameters.value("total3"), Some(&Value::Null));
        assert!(!unit.perform_alone);
    }

    #[test]
    fn test_payload_names_ending_in_digits_keep_their_values() {
        let catalog = EntityCatalog::new().entity(
            "Contact",
            EntityDef::new("contacts").field("phone").field("phone1"),
        );
        let compiler = CommandCompiler::new(&catalog, &super::super::MySqlFieldConverter);
        let mut ctx = TranslationContext::new();

        let values = ParameterSet::new().with("phone", "111").with("phone1", "222");
        let unit = compiler.compile(&Command::insert("Contact", values), &mut ctx).unwrap();
        assert_eq!(
            unit.text(),
            "INSERT INTO `contacts` (`phone`,`phone1`) VALUES (?phone1,?phone12);"
        );
        assert_eq!(unit.parameters.value("phone1"), Some(&Value::from("111")));
        assert_eq!(unit.parameters.value("phone12"), Some(&Value::from("222")));

        let cmd = Command::update("Contact").set("phone", "333").set("phone1", "444");
        let unit = compiler.compile(&cmd, &mut TranslationContext::new()).unwrap();
        assert_eq!(
            unit.text(),
            "UPDATE `contacts` AS TB SET TB.`phone`=?phone1, TB.`phone1`=?phone12;"
        );
        assert_eq!(unit.parameters.value("phone1"), Some(&Value::from("333")));
        assert_eq!(unit.parameters.value("phone12"), Some(&Value::from("444")));
    }

    #[test]
    fn test_update_numbers_set_before_filter() {
        let cmd = Command::update("Order")
            .set("status", "PAID")
            .calculate("total", CalculateOperator::Add, 10.5)
            .filter(Query::new("Order").equal("id", 7))
            .must_affect_rows();
        let unit = compile(&cmd).unwrap();
        assert_eq!(
            unit.text(),
            "UPDATE `orders` AS TB SET TB.`status`=?status1, TB.`total_amount`=TB.`total_amount`+?total2 WHERE TB.`id` = ?id3;"
        );
        assert_eq!(unit.parameters.names(), vec!["status1", "total2", "id3"]);
        assert!(unit.must_affect_rows);
    }

    #[test]
    fn test_update_without_fields_fails() {
        let err = compile(&Command::update("Order")).unwrap_err();
        assert!(matches!(err, RdbError::MissingUpdateFields { entity } if entity == "Order"));
    }

    #[test]
    fn test_delete_with_object_name_override() {
        let cmd = Command::delete("Order")
            .object_name("orders_archive")
            .filter(Query::new("Order").equal("status", "VOID"));
        let unit = compile(&cmd).unwrap();
        assert_eq!(
            unit.text(),
            "DELETE TB FROM `orders_archive` AS TB WHERE TB.`status` = ?status1;"
        );
    }

    #[test]
    fn test_text_and_procedure_run_alone() {
        let unit = compile(&Command::text("TRUNCATE t", ParameterSet::new())).unwrap();
        assert!(unit.perform_alone);
        assert_eq!(unit.command_type, CommandType::Text);

        let values = ParameterSet::new().with("a", 1).with("b", 2);
        let unit = compile(&Command::procedure("close_period", values)).unwrap();
        assert_eq!(unit.text(), "CALL close_period(?a, ?b)");
        assert_eq!(unit.command_type, CommandType::Procedure);
        assert!(unit.perform_alone);
    }

    #[test]
    fn test_merge_concatenates() {
        let mut a = ExecutionUnit::statement("A;", ParameterSet::new().with("x1", 1));
        let mut b = ExecutionUnit::statement("B;", ParameterSet::new().with("y2", 2));
        b.must_affect_rows = true;
        a.merge(b);
        assert_eq!(a.text(), "A;\nB;");
        assert_eq!(a.parameters.len(), 2);
        assert!(a.must_affect_rows);
    }
}
