//! Predicate compilation: criteria, groups and subquery comparisons.

use crate::ast::{Condition, Criterion, CriterionOperator, CriterionValue, LogicalOp, Query};
use crate::error::{RdbError, RdbResult};
use crate::params::ParameterSet;

use super::{
    placeholder, qualify, quote_identifier, sql_parts, ConditionFragment, QueryTranslator,
    TranslationContext, SUB_OBJECT_ALIAS,
};

/// Rendered condition list and whether an `OR` joins its top level.
pub(crate) struct ConditionList {
    pub text: String,
    pub has_or: bool,
    pub with: Vec<String>,
    pub recurve: Option<super::RecurveTable>,
}

impl QueryTranslator<'_> {
    /// Compile `(connector, condition)` pairs of `entity` under `alias`.
    ///
    /// Empty fragments are skipped; the first rendered fragment drops its connector.
    pub(crate) fn compile_conditions(
        &self,
        entity: &str,
        conditions: &[(LogicalOp, Condition)],
        alias: &str,
        params: &mut ParameterSet,
        ctx: &mut TranslationContext,
    ) -> RdbResult<ConditionList> {
        let mut parts: Vec<String> = Vec::with_capacity(conditions.len());
        let mut list = ConditionList {
            text: String::new(),
            has_or: false,
            with: Vec::new(),
            recurve: None,
        };
        for (connector, condition) in conditions {
            let fragment = self.compile_condition(entity, condition, alias, params, ctx)?;
            list.with.extend(fragment.with);
            if fragment.recurve.is_some() {
                list.recurve = fragment.recurve;
            }
            if fragment.text.is_empty() {
                continue;
            }
            if parts.is_empty() {
                parts.push(fragment.text);
            } else {
                list.has_or |= *connector == LogicalOp::Or;
                parts.push(format!("{} {}", connector, fragment.text));
            }
        }
        list.text = parts.join(" ");
        Ok(list)
    }

    pub fn compile_condition(
        &self,
        entity: &str,
        condition: &Condition,
        alias: &str,
        params: &mut ParameterSet,
        ctx: &mut TranslationContext,
    ) -> RdbResult<ConditionFragment> {
        match condition {
            Condition::Criterion(criterion) => {
                self.compile_criterion(entity, criterion, alias, params, ctx)
            }
            Condition::Group(group) => match group.conditions.as_slice() {
                [] => Ok(ConditionFragment::default()),
                // A single-entry group needs no parentheses.
                [(_, only)] => self.compile_condition(entity, only, alias, params, ctx),
                many => {
                    let list = self.compile_conditions(entity, many, alias, params, ctx)?;
                    let text = if list.text.is_empty() {
                        String::new()
                    } else {
                        format!("({})", list.text)
                    };
                    Ok(ConditionFragment {
                        text,
                        with: list.with,
                        recurve: list.recurve,
                    })
                }
            },
        }
    }

    fn compile_criterion(
        &self,
        entity: &str,
        criterion: &Criterion,
        alias: &str,
        params: &mut ParameterSet,
        ctx: &mut TranslationContext,
    ) -> RdbResult<ConditionFragment> {
        let field = self.formatter.criteria_field(
            entity,
            alias,
            &criterion.field,
            criterion.conversion.as_ref(),
        )?;
        let operator = criterion.operator;
        if !operator.needs_parameter() {
            return Ok(ConditionFragment::text(format!("{} {}", field, operator.sql())));
        }
        match &criterion.value {
            CriterionValue::Query(subquery) => {
                self.compile_subquery_criterion(&field, operator, subquery, params, ctx)
            }
            CriterionValue::Value(value) => {
                let name = ctx.next_parameter_name(&criterion.field);
                params.add(name.clone(), operator.format_value(value.clone()));
                Ok(ConditionFragment::text(format!(
                    "{} {} {}",
                    field,
                    operator.sql(),
                    placeholder(&name)
                )))
            }
        }
    }

    /// `field op (SELECT ...)` against the first selected field of `subquery`.
    ///
    /// Membership with a size cap wraps the limited select in a derived table;
    /// any other operator compares against the first row only.
    fn compile_subquery_criterion(
        &self,
        field: &str,
        operator: CriterionOperator,
        subquery: &Query,
        params: &mut ParameterSet,
        ctx: &mut TranslationContext,
    ) -> RdbResult<ConditionFragment> {
        if subquery.is_text() {
            let translated = self.compile(subquery, "", params, ctx, false)?;
            let text = translated.text.unwrap_or_default();
            return Ok(ConditionFragment::text(format!("{} {} ({})", field, operator.sql(), text)));
        }
        let Some(value_property) = subquery.fields.first() else {
            return Err(RdbError::SubqueryWithoutFields {
                entity: subquery.entity.clone(),
            });
        };
        let value_field = self.metadata.field(&subquery.entity, value_property);
        let value_column = quote_identifier(value_field.column());
        let sub_alias = ctx.next_sub_alias();

        let (wrap, limit) = match (operator.is_membership(), subquery.size) {
            (true, 0) => (false, String::new()),
            (true, size) => (true, format!("LIMIT 0,{}", size)),
            (false, _) => (false, "LIMIT 0,1".to_string()),
        };
        let use_sort = !limit.is_empty();
        let translated = self.compile(subquery, &sub_alias, params, ctx, use_sort)?;
        let table = quote_identifier(&self.metadata.object_name(&subquery.entity));

        let source = if translated.has_combine() {
            let inner = sql_parts(&[
                format!(
                    "SELECT {} FROM {} AS {}",
                    self.formatter
                        .select_list(&sub_alias, &subquery.entity, &subquery.fields, false),
                    table,
                    sub_alias
                ),
                translated.join_clause(),
                translated.where_clause(),
                translated.combine_clause(),
            ]);
            format!("({}) AS {}", inner, sub_alias)
        } else {
            sql_parts(&[
                format!("{} AS {}", table, sub_alias),
                translated.join_clause(),
                translated.where_clause(),
            ])
        };
        let select = sql_parts(&[
            format!(
                "SELECT {} FROM {}",
                qualify(&sub_alias, value_field.column()),
                source
            ),
            translated.order_clause(),
            limit,
        ]);
        let text = if wrap {
            format!(
                "{} {} (SELECT {} FROM ({}) AS {}{})",
                field,
                operator.sql(),
                value_column,
                select,
                SUB_OBJECT_ALIAS,
                sub_alias
            )
        } else {
            format!("{} {} ({})", field, operator.sql(), select)
        };
        Ok(ConditionFragment {
            text,
            with: translated.with,
            recurve: translated.recurve,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{CriterionOperator, FieldConversion, Query};
    use crate::error::RdbError;
    use crate::metadata::{EntityCatalog, EntityDef};
    use crate::params::ParameterSet;
    use crate::transpiler::{MySqlFieldConverter, QueryTranslator, TranslationContext};

    fn catalog() -> EntityCatalog {
        EntityCatalog::new()
            .entity("Order", EntityDef::new("orders").key("id").field("status"))
            .entity(
                "Item",
                EntityDef::new("items").key("id").column("order", "order_id").field("qty"),
            )
    }

    fn where_of(query: &Query) -> String {
        let catalog = catalog();
        let t = QueryTranslator::new(&catalog, &MySqlFieldConverter);
        t.translate(query, &mut TranslationContext::new())
            .unwrap()
            .where_clause()
    }

    #[test]
    fn test_null_criteria_bind_nothing() {
        let catalog = catalog();
        let t = QueryTranslator::new(&catalog, &MySqlFieldConverter);
        let q = Query::new("Order").is_null("status");
        let out = t.translate(&q, &mut TranslationContext::new()).unwrap();
        assert_eq!(out.condition, "TB.`status` IS NULL");
        assert!(out.parameters.is_empty());
    }

    #[test]
    fn test_single_group_is_flattened() {
        let q = Query::new("Order").and_group(Query::new("Order").equal("status", "NEW"));
        assert_eq!(where_of(&q), "WHERE TB.`status` = ?status1");
    }

    #[test]
    fn test_group_is_parenthesized() {
        let q = Query::new("Order").equal("id", 1).and_group(
            Query::new("Order")
                .equal("status", "NEW")
                .or_filter("status", CriterionOperator::Equal, "OPEN"),
        );
        assert_eq!(
            where_of(&q),
            "WHERE TB.`id` = ?id1 AND (TB.`status` = ?status2 OR TB.`status` = ?status3)"
        );
    }

    #[test]
    fn test_empty_group_is_skipped() {
        let q = Query::new("Order")
            .and_group(Query::new("Order"))
            .equal("id", 1);
        assert_eq!(where_of(&q), "WHERE TB.`id` = ?id1");
    }

    #[test]
    fn test_converted_criterion() {
        let q = Query::new("Order").filter_converted(
            "status",
            FieldConversion::string_length(),
            CriterionOperator::GreaterThan,
            3,
        );
        assert_eq!(where_of(&q), "WHERE CHAR_LENGTH(TB.`status`) > ?status1");
    }

    #[test]
    fn test_subquery_without_fields_fails() {
        let catalog = catalog();
        let t = QueryTranslator::new(&catalog, &MySqlFieldConverter);
        let q = Query::new("Order").filter_subquery("id", CriterionOperator::In, Query::new("Item"));
        let err = t.translate(&q, &mut TranslationContext::new()).unwrap_err();
        assert!(matches!(err, RdbError::SubqueryWithoutFields { entity } if entity == "Item"));
    }

    #[test]
    fn test_text_subquery_passes_through() {
        let catalog = catalog();
        let t = QueryTranslator::new(&catalog, &MySqlFieldConverter);
        let archived = Query::text(
            "SELECT order_id FROM archived_items WHERE qty > ?min_qty",
            ParameterSet::new().with("min_qty", 5),
        );
        let q = Query::new("Order").filter_subquery("id", CriterionOperator::In, archived);
        let out = t.translate(&q, &mut TranslationContext::new()).unwrap();
        assert_eq!(
            out.condition,
            "TB.`id` IN (SELECT order_id FROM archived_items WHERE qty > ?min_qty)"
        );
        assert_eq!(out.parameters.names(), vec!["min_qty"]);
    }

    #[test]
    fn test_uncapped_membership_subquery() {
        let sub = Query::new("Item").select(&["order"]).greater_than("qty", 2);
        let q = Query::new("Order").filter_subquery("id", CriterionOperator::In, sub);
        assert_eq!(
            where_of(&q),
            "WHERE TB.`id` IN (SELECT S0.`order_id` FROM `items` AS S0 WHERE S0.`qty` > ?qty1)"
        );
    }
}
