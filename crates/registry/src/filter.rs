//! Structured WHERE-clause builder for target queries.
//!
//! Filters are plain data and render to SQL text plus an ordered list of bind
//! values, so the query shape can be checked without a database. Rendered
//! fragments assume the targets table is aliased as `t`.

use crate::models::Visibility;
use crate::tags::PairTable;
use promhub_core::{KeyValue, KvKind};

/// A value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bind {
    Text(String),
    Int(i64),
    Bool(bool),
}

/// Target columns a filter may compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Id,
    Scheme,
    Address,
    MetricPath,
    ScrapeInterval,
    ScrapeTimeout,
    BearerToken,
    BaseAuth,
    Deleted,
}

impl Column {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Id => "t.id",
            Self::Scheme => "t.scheme",
            Self::Address => "t.address",
            Self::MetricPath => "t.metric_path",
            Self::ScrapeInterval => "t.scrape_interval_secs",
            Self::ScrapeTimeout => "t.scrape_timeout_secs",
            Self::BearerToken => "t.bearer_token",
            Self::BaseAuth => "t.base_auth",
            Self::Deleted => "t.deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(Column, Bind),
    /// Target is associated with exactly this pair.
    HasPair(KvKind, KeyValue),
    /// Disjunction. Empty means false.
    AnyOf(Vec<Filter>),
    /// Conjunction. Empty means true.
    AllOf(Vec<Filter>),
}

impl Filter {
    pub fn eq_text(column: Column, value: impl Into<String>) -> Self {
        Self::Eq(column, Bind::Text(value.into()))
    }

    pub fn eq_int(column: Column, value: i64) -> Self {
        Self::Eq(column, Bind::Int(value))
    }

    pub fn live() -> Self {
        Self::Eq(Column::Deleted, Bind::Bool(false))
    }

    pub fn deleted() -> Self {
        Self::Eq(Column::Deleted, Bind::Bool(true))
    }

    /// Any of the pairs is associated with the target.
    pub fn any_pair<'a>(kind: KvKind, pairs: impl IntoIterator<Item = &'a KeyValue>) -> Self {
        Self::AnyOf(
            pairs
                .into_iter()
                .map(|p| Self::HasPair(kind, p.clone()))
                .collect(),
        )
    }

    /// Conjunction with the visibility predicate applied.
    pub fn visible(self, visibility: Visibility) -> Self {
        match visibility {
            Visibility::LiveOnly => Self::AllOf(vec![Self::live(), self]),
            Visibility::IncludeDeleted => self,
        }
    }

    /// Render to SQL text and bind values in placeholder order.
    pub fn render(&self) -> (String, Vec<Bind>) {
        let mut sql = String::new();
        let mut binds = Vec::new();
        self.render_into(&mut sql, &mut binds);
        (sql, binds)
    }

    fn render_into(&self, sql: &mut String, binds: &mut Vec<Bind>) {
        match self {
            Self::Eq(column, value) => {
                sql.push_str(column.as_sql());
                sql.push_str(" = ?");
                binds.push(value.clone());
            }
            Self::HasPair(kind, pair) => {
                let table = PairTable::of(*kind);
                sql.push_str(&format!(
                    "EXISTS (SELECT 1 FROM {join} j JOIN {table} p ON p.id = j.{fk} \
                     WHERE j.target_id = t.id AND p.key = ? AND p.value = ?)",
                    join = table.join,
                    table = table.table,
                    fk = table.fk,
                ));
                binds.push(Bind::Text(pair.key.clone()));
                binds.push(Bind::Text(pair.value.clone()));
            }
            Self::AnyOf(parts) => render_group(parts, " OR ", "0", sql, binds),
            Self::AllOf(parts) => render_group(parts, " AND ", "1", sql, binds),
        }
    }
}

fn render_group(
    parts: &[Filter],
    joiner: &str,
    empty: &str,
    sql: &mut String,
    binds: &mut Vec<Bind>,
) {
    if parts.is_empty() {
        sql.push_str(empty);
        return;
    }
    sql.push('(');
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            sql.push_str(joiner);
        }
        part.render_into(sql, binds);
    }
    sql.push(')');
}
