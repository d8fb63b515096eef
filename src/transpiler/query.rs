//! Query compilation: sorts, joins, set operations and recursive closures.

use std::borrow::Cow;

use crate::ast::{CombineKind, JoinEntry, JoinKind, Query, RecurveDirection, RecurveSpec};
use crate::error::{RdbError, RdbResult};
use crate::metadata::EntityMetadata;
use crate::params::ParameterSet;

use super::fields::{FieldConverter, FieldFormatter};
use super::{qualify, quote_identifier, sql_parts, Translation, TranslationContext, OBJECT_ALIAS};

/// Lowers [`Query`] trees into [`Translation`]s.
#[derive(Clone, Copy)]
pub struct QueryTranslator<'a> {
    pub(super) metadata: &'a dyn EntityMetadata,
    pub(super) formatter: FieldFormatter<'a>,
}

impl<'a> QueryTranslator<'a> {
    pub fn new(metadata: &'a dyn EntityMetadata, converter: &'a dyn FieldConverter) -> Self {
        Self {
            metadata,
            formatter: FieldFormatter::new(metadata, converter),
        }
    }

    pub fn metadata(&self) -> &'a dyn EntityMetadata {
        self.metadata
    }

    pub fn formatter(&self) -> &FieldFormatter<'a> {
        &self.formatter
    }

    /// Translate a statement's main query under [`OBJECT_ALIAS`].
    ///
    /// Restarts the alias counters, folds join extras into the condition and
    /// returns the parameters collected from the whole tree.
    pub fn translate(&self, query: &Query, ctx: &mut TranslationContext) -> RdbResult<Translation> {
        ctx.reset_aliases();
        let mut params = ParameterSet::new();
        let mut translation = self.compile(query, OBJECT_ALIAS, &mut params, ctx, true)?;
        translation.merge_join_extra();
        translation.parameters = params;
        Ok(translation)
    }

    /// Compile `query` under `alias`, adding its bound values to `params`.
    pub fn compile(
        &self,
        query: &Query,
        alias: &str,
        params: &mut ParameterSet,
        ctx: &mut TranslationContext,
        use_sort: bool,
    ) -> RdbResult<Translation> {
        if let Some(text) = &query.text {
            for name in text.parameters.names() {
                ctx.reserve_parameter(name);
            }
            params.union(text.parameters.clone());
            return Ok(Translation::passthrough(text.text.clone()));
        }
        let query = self.rewrite_set_operations(query)?;
        let entity = query.entity.as_str();

        let conditions = self.compile_conditions(entity, &query.conditions, alias, params, ctx)?;
        let mut out = Translation {
            condition: conditions.text,
            has_or: conditions.has_or,
            with: conditions.with,
            recurve: conditions.recurve,
            ..Default::default()
        };

        if use_sort {
            for sort in &query.sorts {
                let field = self.formatter.criteria_field(
                    entity,
                    alias,
                    &sort.field,
                    sort.conversion.as_ref(),
                )?;
                out.sorts
                    .push(format!("{} {}", field, if sort.desc { "DESC" } else { "ASC" }));
            }
        }

        for combine in &query.combines {
            self.compile_combine(&query, combine.kind, &combine.query, params, ctx, &mut out)?;
        }

        for join in &query.joins {
            self.compile_join(&query, join, alias, params, ctx, &mut out)?;
        }

        if let Some(recurve) = &query.recurve {
            self.compile_recurve(entity, recurve, alias, ctx, &mut out);
        }

        Ok(out)
    }

    /// Rewrite INTERSECT/EXCEPT into joins on a derived copy of the query.
    fn rewrite_set_operations<'q>(&self, query: &'q Query) -> RdbResult<Cow<'q, Query>> {
        if !query
            .combines
            .iter()
            .any(|c| matches!(c.kind, CombineKind::Intersect | CombineKind::Except))
        {
            return Ok(Cow::Borrowed(query));
        }
        let mut derived = query.clone();
        let combines = std::mem::take(&mut derived.combines);
        for combine in combines {
            let kind = match combine.kind {
                CombineKind::Intersect => JoinKind::Inner,
                CombineKind::Except => JoinKind::Left,
                CombineKind::Union | CombineKind::UnionAll => {
                    derived.combines.push(combine);
                    continue;
                }
            };
            if combine.query.entity.is_empty() {
                return Err(RdbError::MissingEntity("combine"));
            }
            let fields = self.combine_fields(&combine.query)?;
            let mut entry = JoinEntry::new(kind, combine.query.clone());
            entry.fields = fields.iter().map(|f| (f.clone(), f.clone())).collect();
            if kind == JoinKind::Left {
                entry.extra = Some(Query::new(combine.query.entity.clone()).is_null(fields[0].clone()));
            }
            derived.joins.push(entry);
        }
        Ok(Cow::Owned(derived))
    }

    /// Fields matched by a rewritten set operation: the target's selection,
    /// else its primary keys, else its first queryable field.
    fn combine_fields(&self, target: &Query) -> RdbResult<Vec<String>> {
        if !target.fields.is_empty() {
            return Ok(target.fields.clone());
        }
        let keys = self.metadata.primary_keys(&target.entity);
        if !keys.is_empty() {
            return Ok(keys);
        }
        self.metadata
            .query_fields(&target.entity)
            .into_iter()
            .next()
            .map(|f| vec![f.property])
            .ok_or_else(|| {
                RdbError::Config(format!(
                    "entity '{}' has no fields to match a set operation on",
                    target.entity
                ))
            })
    }

    fn compile_combine(
        &self,
        source: &Query,
        kind: CombineKind,
        target: &Query,
        params: &mut ParameterSet,
        ctx: &mut TranslationContext,
        out: &mut Translation,
    ) -> RdbResult<()> {
        if target.entity.is_empty() && !target.is_text() {
            return Err(RdbError::MissingEntity("combine"));
        }
        let operator = combine_operator(kind)?;
        let alias = ctx.next_sub_alias();
        let translated = self.compile(target, &alias, params, ctx, false)?;
        let select = match &translated.text {
            Some(text) => text.clone(),
            None => sql_parts(&[
                format!(
                    "SELECT {} FROM {} AS {}",
                    self.formatter
                        .select_list(&alias, &source.entity, &source.fields, false),
                    quote_identifier(&self.metadata.object_name(&target.entity)),
                    alias
                ),
                translated.join_clause(),
                translated.where_clause(),
            ]),
        };
        out.combines.push(format!("{} {}", operator, select));
        absorb_nested(out, translated);
        Ok(())
    }

    fn compile_join(
        &self,
        source: &Query,
        join: &JoinEntry,
        alias: &str,
        params: &mut ParameterSet,
        ctx: &mut TranslationContext,
        out: &mut Translation,
    ) -> RdbResult<()> {
        if join.query.entity.is_empty() {
            return Err(RdbError::MissingEntity("join"));
        }
        let join_alias = ctx.next_sub_alias();
        let translated = self.compile(&join.query, &join_alias, params, ctx, false)?;
        let table = quote_identifier(&self.metadata.object_name(&join.query.entity));

        let (target_alias, target) = if translated.has_combine() {
            let wrap_alias = ctx.next_sub_alias();
            let inner = sql_parts(&[
                format!(
                    "SELECT {} FROM {} AS {}",
                    self.formatter.select_list(
                        &join_alias,
                        &join.query.entity,
                        &join.query.fields,
                        false
                    ),
                    table,
                    join_alias
                ),
                translated.join_clause(),
                translated.where_clause(),
                translated.combine_clause(),
            ]);
            let target = format!("({}) AS {}", inner, wrap_alias);
            (wrap_alias, target)
        } else {
            (join_alias.clone(), format!("{} AS {}", table, join_alias))
        };

        let mut on = self.join_condition(&source.entity, join, alias, &target_alias);
        if !translated.has_combine() {
            if !translated.condition.is_empty() {
                if translated.allow_join && join.kind != JoinKind::Cross {
                    on.push(translated.condition.clone());
                } else {
                    out.and_condition(&translated.condition);
                }
            }
            for extra in &translated.join_extra_condition {
                out.and_condition(extra);
            }
        }

        let mut clause = format!("{} {}", join.kind.sql(), target);
        if !on.is_empty() {
            clause.push_str(" ON ");
            clause.push_str(&on.join(" AND "));
        }
        out.joins.push(clause);

        if let Some(extra) = &join.extra {
            let mut extra = self.compile(extra, &target_alias, params, ctx, false)?;
            if !extra.condition.is_empty() {
                out.join_extra_condition.push(std::mem::take(&mut extra.condition));
            }
            absorb_nested(out, extra);
        }
        if !translated.has_combine() && translated.allow_join {
            out.joins.extend(translated.joins.iter().cloned());
        }
        absorb_nested(out, translated);
        Ok(())
    }

    /// ON predicates: explicit pairs, else primary keys of a self join, else a
    /// declared relation in either direction.
    fn join_condition(
        &self,
        source: &str,
        join: &JoinEntry,
        source_alias: &str,
        target_alias: &str,
    ) -> Vec<String> {
        if join.kind == JoinKind::Cross {
            return Vec::new();
        }
        let target = join.query.entity.as_str();
        let pairs: Vec<(String, String)> = if !join.fields.is_empty() {
            join.fields.clone()
        } else if source == target {
            self.metadata
                .primary_keys(source)
                .into_iter()
                .map(|k| (k.clone(), k))
                .collect()
        } else {
            let forward = self.metadata.relation_fields(source, target);
            if forward.is_empty() {
                self.metadata
                    .relation_fields(target, source)
                    .into_iter()
                    .map(|(t, s)| (s, t))
                    .collect()
            } else {
                forward
            }
        };
        pairs
            .iter()
            .filter(|(s, t)| !s.is_empty() && !t.is_empty())
            .map(|(s, t)| {
                format!(
                    "{} {} {}",
                    qualify(source_alias, self.metadata.field(source, s).column()),
                    join.operator.sql(),
                    qualify(target_alias, self.metadata.field(target, t).column())
                )
            })
            .collect()
    }

    /// Replace the condition with membership in a recursive closure table
    /// seeded by the current condition and joins.
    fn compile_recurve(
        &self,
        entity: &str,
        recurve: &RecurveSpec,
        alias: &str,
        ctx: &mut TranslationContext,
        out: &mut Translation,
    ) {
        out.allow_join = false;
        out.merge_join_extra();

        let data = quote_identifier(self.metadata.field(entity, &recurve.data_field).column());
        let relation =
            quote_identifier(self.metadata.field(entity, &recurve.relation_field).column());
        let table = quote_identifier(&self.metadata.object_name(entity));
        let closure = ctx.next_recurve_table();

        let projection = format!("SELECT {alias}.{data},{alias}.{relation} FROM {table} AS {alias}");
        let anchor = sql_parts(&[projection.clone(), out.joins.join(" "), out.where_clause()]);
        let step_on = match recurve.direction {
            RecurveDirection::Up => format!("{alias}.{data}={}.{relation}", closure.alias),
            RecurveDirection::Down => format!("{alias}.{relation}={}.{data}", closure.alias),
        };
        let step = format!(
            "{} JOIN {} AS {} ON {}",
            projection,
            quote_identifier(&closure.name),
            closure.alias,
            step_on
        );
        out.with.push(format!("{} AS ({} UNION ALL {})", closure.name, anchor, step));
        out.condition = format!(
            "{alias}.{data} IN (SELECT {}.{data} FROM {} AS {})",
            closure.alias,
            quote_identifier(&closure.name),
            closure.alias
        );
        out.has_or = false;
        out.recurve = Some(closure);
    }
}

/// Native MySQL set operator for a combine kind.
pub fn combine_operator(kind: CombineKind) -> RdbResult<&'static str> {
    match kind {
        CombineKind::Union => Ok("UNION"),
        CombineKind::UnionAll => Ok("UNION ALL"),
        CombineKind::Intersect | CombineKind::Except => {
            Err(RdbError::UnsupportedCombine(kind.to_string()))
        }
    }
}

/// Pull closure definitions up from a nested translation.
fn absorb_nested(out: &mut Translation, nested: Translation) {
    out.with.extend(nested.with);
    if nested.recurve.is_some() {
        out.recurve = nested.recurve;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CombineKind;

    #[test]
    fn test_native_combine_operators() {
        assert_eq!(combine_operator(CombineKind::Union).unwrap(), "UNION");
        assert_eq!(combine_operator(CombineKind::UnionAll).unwrap(), "UNION ALL");
        assert!(matches!(
            combine_operator(CombineKind::Except),
            Err(RdbError::UnsupportedCombine(kind)) if kind == "EXCEPT"
        ));
    }
}
