//! imock query: the `GET /resource` pipeline.
//!
//! Stages run in a fixed order over a detached copy of the collection:
//! search (`q`) -> field filters (`field=value`) -> sort (`_sort`, `_order`) ->
//! paginate (`_page`, `_limit`). Every value is compared through its stringified form.

#![forbid(unsafe_code)]

use imock_core::{stringify, Collection, Record};
use serde::Serialize;
use tracing::trace;

pub const SEARCH_PARAM: &str = "q";
pub const SORT_PARAM: &str = "_sort";
pub const ORDER_PARAM: &str = "_order";
pub const PAGE_PARAM: &str = "_page";
pub const LIMIT_PARAM: &str = "_limit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Self { if s.eq_ignore_ascii_case("desc") { Self::Desc } else { Self::Asc } }
}

/// Parsed list parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub search: Option<String>,
    /// Exact-match filters, first occurrence of each key only.
    pub filters: Vec<(String, String)>,
    pub sort: Option<String>,
    pub order: SortOrder,
    /// Raw `_page`; unparseable or absent is 0.
    pub page: i64,
    /// Raw `_limit`; pagination applies only when > 0.
    pub limit: i64,
}

impl ListQuery {
    /// Build from decoded query-string pairs, in request order.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut out = Self::default();
        let mut seen_page = false;
        let mut seen_limit = false;
        let mut seen_order = false;
        for (k, v) in pairs {
            let (k, v) = (k.as_ref(), v.as_ref());
            match k {
                SEARCH_PARAM => {
                    if out.search.is_none() && !v.is_empty() { out.search = Some(v.to_string()); }
                }
                SORT_PARAM => {
                    if out.sort.is_none() && !v.is_empty() { out.sort = Some(v.to_string()); }
                }
                ORDER_PARAM if !seen_order => { out.order = SortOrder::parse(v); seen_order = true; }
                PAGE_PARAM if !seen_page => { out.page = v.trim().parse().unwrap_or(0); seen_page = true; }
                LIMIT_PARAM if !seen_limit => { out.limit = v.trim().parse().unwrap_or(0); seen_limit = true; }
                _ if k.starts_with('_') => {}
                _ => {
                    if !out.filters.iter().any(|(fk, _)| fk == k) {
                        out.filters.push((k.to_string(), v.to_string()));
                    }
                }
            }
        }
        out
    }

    pub fn paginates(&self) -> bool { self.limit > 0 }
}

/// Pagination metadata reflecting the pre-slice total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub total: usize,
    pub page: i64,
    pub limit: i64,
}

/// Candidate counts after each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueryExplain {
    pub total: usize,
    pub after_search: usize,
    pub after_filters: usize,
    pub returned: usize,
}

#[derive(Debug, Clone)]
pub struct ListResult {
    pub items: Collection,
    pub page: Option<Page>,
    pub explain: QueryExplain,
}

/// True when any field's stringified value contains `needle` (already lowercased).
pub fn record_matches_search(record: &Record, needle: &str) -> bool {
    record.values().any(|v| stringify(v).to_lowercase().contains(needle))
}

/// True when the record has `field` and its stringified value equals `expected`.
pub fn record_matches_filter(record: &Record, field: &str, expected: &str) -> bool {
    record.get(field).map(|v| stringify(v) == expected).unwrap_or(false)
}

/// Sort key for `field`; absent fields sort as the empty string.
fn sort_key(record: &Record, field: &str) -> String {
    record.get(field).map(|v| stringify(v).into_owned()).unwrap_or_default()
}

/// Slice bounds for `_page`/`_limit` over `len` items, or `None` when past the end.
pub fn page_bounds(page: i64, limit: i64, len: usize) -> Option<(usize, usize)> {
    if limit <= 0 {
        return Some((0, len));
    }
    let limit = limit as u64;
    let start = if page > 0 { (page as u64 - 1).saturating_mul(limit) } else { 0 };
    if start > len as u64 {
        return None;
    }
    let start = start as usize;
    let end = start.saturating_add(limit.min(usize::MAX as u64) as usize).min(len);
    Some((start, end))
}

/// Run the full pipeline over `items`.
pub fn run(mut items: Collection, query: &ListQuery) -> ListResult {
    let mut explain = QueryExplain { total: items.len(), ..QueryExplain::default() };

    if let Some(q) = query.search.as_deref() {
        let needle = q.to_lowercase();
        items.retain(|r| record_matches_search(r, &needle));
    }
    explain.after_search = items.len();

    for (field, expected) in query.filters.iter() {
        items.retain(|r| record_matches_filter(r, field, expected));
    }
    explain.after_filters = items.len();

    if let Some(field) = query.sort.as_deref() {
        let mut keyed: Vec<(String, Record)> = items.into_iter().map(|r| (sort_key(&r, field), r)).collect();
        match query.order {
            SortOrder::Asc => keyed.sort_by(|a, b| a.0.cmp(&b.0)),
            SortOrder::Desc => keyed.sort_by(|a, b| b.0.cmp(&a.0)),
        }
        items = keyed.into_iter().map(|(_, r)| r).collect();
    }

    let page = if query.paginates() {
        let total = items.len();
        items = match page_bounds(query.page, query.limit, total) {
            Some((start, end)) => items.drain(start..end).collect(),
            None => Vec::new(),
        };
        Some(Page { total, page: query.page, limit: query.limit })
    } else {
        None
    };
    explain.returned = items.len();
    trace!(?explain, "query: pipeline done");

    ListResult { items, page, explain }
}
