//! Read statements: select, paging, exists and aggregates.

use crate::ast::{CombineKind, Query};
use crate::error::{RdbError, RdbResult};
use crate::metadata::{EntityField, EntityMetadata};
use crate::params::ParameterSet;

use super::fields::FieldConverter;
use super::{
    qualify, quote_identifier, sql_parts, QueryTranslator, Translation, TranslationContext,
    OBJECT_ALIAS, PAGING_TABLE_NAME, TOTAL_COUNT_COLUMN,
};

/// Page size used when a paging request carries none.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// A single read statement with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub parameters: ParameterSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Max,
    Min,
    Sum,
    Avg,
}

impl AggregateFunction {
    pub fn sql(self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
        }
    }
}

pub struct StatementBuilder<'a> {
    metadata: &'a dyn EntityMetadata,
    translator: QueryTranslator<'a>,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(metadata: &'a dyn EntityMetadata, converter: &'a dyn FieldConverter) -> Self {
        Self {
            metadata,
            translator: QueryTranslator::new(metadata, converter),
        }
    }

    fn table(&self, query: &Query) -> String {
        quote_identifier(&self.metadata.object_name(&query.entity))
    }

    /// `SELECT <fields> FROM <table> AS TB <joins> <where> [combine]`
    fn base_select(&self, query: &Query, t: &Translation, fields: &str) -> String {
        sql_parts(&[
            format!("SELECT {} FROM {} AS {}", fields, self.table(query), OBJECT_ALIAS),
            t.join_clause(),
            t.where_clause(),
            t.combine_clause(),
        ])
    }

    fn inner_fields(&self, query: &Query) -> String {
        self.translator
            .formatter()
            .select_list(OBJECT_ALIAS, &query.entity, &query.fields, false)
    }

    fn output_fields(&self, query: &Query) -> String {
        self.translator
            .formatter()
            .select_list(OBJECT_ALIAS, &query.entity, &query.fields, true)
    }

    fn default_field(&self, query: &Query) -> RdbResult<EntityField> {
        self.metadata.default_field(&query.entity).ok_or_else(|| {
            RdbError::Config(format!("entity '{}' has no key or queryable field", query.entity))
        })
    }

    pub fn select(&self, query: &Query, ctx: &mut TranslationContext) -> RdbResult<Statement> {
        let t = self.translator.translate(query, ctx)?;
        if let Some(text) = t.text {
            return Ok(Statement { text, parameters: t.parameters });
        }
        let limit = if query.size > 0 {
            format!("LIMIT 0,{}", query.size)
        } else {
            String::new()
        };
        let text = if t.has_combine() {
            let inner = self.base_select(query, &t, &self.inner_fields(query));
            sql_parts(&[
                t.pre_script(),
                format!("SELECT {} FROM ({}) AS {}", self.output_fields(query), inner, OBJECT_ALIAS),
                t.order_clause(),
                limit,
            ])
        } else {
            sql_parts(&[
                t.pre_script(),
                self.base_select(query, &t, &self.output_fields(query)),
                t.order_clause(),
                limit,
            ])
        };
        Ok(Statement { text, parameters: t.parameters })
    }

    /// Page of `query.paging` (or the first page of [`DEFAULT_PAGE_SIZE`]).
    pub fn paging(&self, query: &Query, ctx: &mut TranslationContext) -> RdbResult<Statement> {
        let (offset, size) = match query.paging {
            Some(p) if p.size > 0 => (p.offset(), p.size),
            _ => (0, DEFAULT_PAGE_SIZE),
        };
        self.offset(query, offset, size, ctx)
    }

    /// Rows `offset..offset+size` plus the total row count in every row.
    pub fn offset(
        &self,
        query: &Query,
        offset: usize,
        size: usize,
        ctx: &mut TranslationContext,
    ) -> RdbResult<Statement> {
        let t = self.translator.translate(query, ctx)?;
        if let Some(text) = t.text {
            return Ok(Statement { text, parameters: t.parameters });
        }
        let default_field = self.default_field(query)?;
        let inner = self.base_select(query, &t, &self.inner_fields(query));
        let with = if t.has_pre_script() {
            format!("{},{} AS ({})", t.pre_script(), PAGING_TABLE_NAME, inner)
        } else {
            format!("WITH {} AS ({})", PAGING_TABLE_NAME, inner)
        };
        let order = if t.sorts.is_empty() {
            format!("{} DESC", qualify(OBJECT_ALIAS, default_field.column()))
        } else {
            t.sorts.join(",")
        };
        let text = format!(
            "{} SELECT (SELECT COUNT({}) FROM {}) AS {},{} FROM {} AS {} ORDER BY {} LIMIT {},{}",
            with,
            quote_identifier(default_field.column()),
            PAGING_TABLE_NAME,
            TOTAL_COUNT_COLUMN,
            self.output_fields(query),
            PAGING_TABLE_NAME,
            OBJECT_ALIAS,
            order,
            offset,
            size
        );
        Ok(Statement { text, parameters: t.parameters })
    }

    /// `SELECT EXISTS(...)` over the entity keys.
    pub fn exists(&self, query: &Query, ctx: &mut TranslationContext) -> RdbResult<Statement> {
        let mut probe = query.clone();
        probe.fields = self.key_fields(query)?;
        let t = self.translator.translate(&probe, ctx)?;
        if let Some(text) = t.text {
            return Ok(Statement { text, parameters: t.parameters });
        }
        let text = sql_parts(&[
            t.pre_script(),
            format!(
                "SELECT EXISTS({})",
                self.base_select(&probe, &t, &self.inner_fields(&probe))
            ),
        ]);
        Ok(Statement { text, parameters: t.parameters })
    }

    pub fn aggregate(
        &self,
        function: AggregateFunction,
        query: &Query,
        ctx: &mut TranslationContext,
    ) -> RdbResult<Statement> {
        let field = match function {
            AggregateFunction::Count => self.default_field(query)?,
            _ => match query.fields.first() {
                Some(property) => self.metadata.field(&query.entity, property),
                None => {
                    return Err(RdbError::MissingAggregateField {
                        function: function.sql(),
                    })
                }
            },
        };

        let mut source = query.clone();
        if !source.combines.is_empty() {
            // The combined rows must carry the aggregated column.
            let mut keys = self.metadata.primary_keys(&query.entity);
            if !keys.contains(&field.property) {
                keys.push(field.property.clone());
            }
            source.fields = keys.clone();
            for combine in &mut source.combines {
                if matches!(combine.kind, CombineKind::Union | CombineKind::UnionAll) {
                    combine.query.fields = keys.clone();
                }
            }
        }
        let t = self.translator.translate(&source, ctx)?;
        if let Some(text) = t.text {
            return Ok(Statement { text, parameters: t.parameters });
        }
        let expr = format!(
            "{}({})",
            function.sql(),
            qualify(OBJECT_ALIAS, field.column())
        );
        let text = if t.has_combine() {
            let inner = self.base_select(&source, &t, &self.inner_fields(&source));
            sql_parts(&[
                t.pre_script(),
                format!("SELECT {} FROM ({}) AS {}", expr, inner, OBJECT_ALIAS),
            ])
        } else {
            sql_parts(&[
                t.pre_script(),
                format!("SELECT {} FROM {} AS {}", expr, self.table(&source), OBJECT_ALIAS),
                t.join_clause(),
                t.where_clause(),
            ])
        };
        Ok(Statement { text, parameters: t.parameters })
    }

    fn key_fields(&self, query: &Query) -> RdbResult<Vec<String>> {
        let keys = self.metadata.primary_keys(&query.entity);
        if !keys.is_empty() {
            return Ok(keys);
        }
        let fields: Vec<String> = self
            .metadata
            .query_fields(&query.entity)
            .into_iter()
            .map(|f| f.property)
            .collect();
        if !fields.is_empty() {
            return Ok(fields);
        }
        Ok(vec![self.default_field(query)?.property])
    }
}
