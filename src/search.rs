//! Multi-source cursor-paged search: parallel fetch, k-way merge with
//! dedup, and stable pagination via unique-sort augmentation plus a
//! cursor-to-filter rewrite that turns compound sorts into a sequence of
//! light-weight seek sub-queries.
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;

use crate::error::DbError;
use crate::filter::{IS_NOT_NULL, IS_NULL};
use crate::page_token::PageToken;
use crate::select::{OrderSpec, SelectCtrl, parse_order};

/// Row-type capabilities the engine needs: sort-field metadata, cursor
/// extraction, per-field comparison, and an explicit identity predicate
/// for cross-source dedup (ties under the sort order are not identity).
pub trait SearchRow: Clone + Send + Sync + 'static {
    /// Whether values of `field` are unique across the whole data set.
    fn unique(field: &str) -> bool;

    /// Whether `field` may hold nulls.
    fn nullable(field: &str) -> bool;

    /// The unique non-nullable tiebreaker appended when a sort is not
    /// already total.
    fn id_field() -> &'static str {
        "id"
    }

    /// Stringified sort-key value of `field`; `None` when null.
    fn cursor_value(&self, field: &str) -> Result<Option<String>, DbError>;

    /// Compare two rows on one field, nulls first.
    fn cmp_field(&self, other: &Self, field: &str) -> Ordering;

    /// Identity equality used when the same row surfaces from two
    /// sources at once.
    fn same(&self, other: &Self) -> bool;
}

/// One searchable backend. `name` keys the per-source offset map.
#[async_trait]
pub trait SearchSource<T>: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, ctrl: &SelectCtrl) -> Result<(Vec<T>, i64), DbError>;
}

/// Inputs of one paged call.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub token: PageToken,
    pub limit: i64,
    /// resume from the last row's sort keys instead of numeric offsets
    pub cursor_mode: bool,
}

/// One page of merged results. `next` is `None` when the page came back
/// short, i.e. the result set is exhausted.
#[derive(Debug, Clone)]
pub struct SearchPage<T> {
    pub items: Vec<T>,
    pub count: i64,
    pub next: Option<PageToken>,
}

/// Append a unique tiebreaker to `order` unless some sort field already
/// makes it total. The tiebreaker direction follows the cumulative
/// direction of the explicit fields (ascending wins ties). Applying this
/// twice yields the same list.
pub fn augment_order<T: SearchRow>(
    order: &[String],
    cursor: &BTreeMap<String, String>,
) -> Result<Vec<String>, DbError> {
    let mut balance = 0i64;
    let mut total = false;
    for raw in order {
        let spec = parse_order(raw)?;
        match &spec {
            OrderSpec::Asc(_) => balance += 1,
            OrderSpec::Desc(_) => balance -= 1,
            OrderSpec::Nearest { .. } => continue,
        }
        let field = spec.field();
        if T::unique(field) {
            if !T::nullable(field) {
                total = true;
            } else if spec.is_desc()
                && cursor.get(field).map(|v| v != IS_NULL).unwrap_or(false)
            {
                // a nullable unique key with a non-null cursor behind it
                // cannot repeat values on the descending side
                total = true;
            }
        }
    }
    let mut out = order.to_vec();
    if !total {
        let direction = if balance >= 0 { "asc" } else { "desc" };
        out.push(format!("{direction}({})", T::id_field()));
    }
    Ok(out)
}

/// Rewrite a cursor-carrying token into seek sub-queries, one per sort
/// field, most-specific first. Sub-query `i` pins every sort field
/// before `i` to its cursor value and applies a directional boundary on
/// field `i`; its order list is truncated at the first field that makes
/// the remaining sort total, so the seek key is always the leading sort
/// field.
pub fn split_query_on_lightweight_queries<T: SearchRow>(
    token: &PageToken,
) -> Result<Vec<PageToken>, DbError> {
    if token.cursor.is_empty() {
        return Ok(vec![token.clone()]);
    }
    let mut specs = Vec::with_capacity(token.order.len());
    for raw in &token.order {
        specs.push(parse_order(raw)?);
    }

    let mut subqueries = Vec::new();
    for i in (0..specs.len()).rev() {
        let spec = &specs[i];
        if matches!(spec, OrderSpec::Nearest { .. }) {
            continue;
        }
        let field = spec.field().to_string();
        let cursor_value = token.cursor.get(&field).ok_or_else(|| {
            DbError::BadInput(format!("page token cursor is missing field {field:?}"))
        })?;

        let mut filter = token.filter.clone();
        if cursor_value == IS_NULL {
            if spec.is_desc() {
                // descending ends in the null band; nothing follows it
                continue;
            }
            // ascending leaves the null band: earlier pins drop out
            filter.insert(field.clone(), vec![IS_NOT_NULL.to_string()]);
        } else {
            for prior in &specs[..i] {
                let prior_field = prior.field().to_string();
                let prior_value = token.cursor.get(&prior_field).ok_or_else(|| {
                    DbError::BadInput(format!(
                        "page token cursor is missing field {prior_field:?}"
                    ))
                })?;
                filter
                    .entry(prior_field)
                    .or_default()
                    .push(prior_value.clone());
            }
            let op = if spec.is_desc() { "lt" } else { "gt" };
            filter
                .entry(field.clone())
                .or_default()
                .push(format!("{op}({cursor_value})"));
        }

        let mut order = Vec::new();
        for spec in &specs[i..] {
            order.push(spec.raw());
            let f = spec.field();
            let seek_total = T::unique(f)
                && (!T::nullable(f)
                    || token.cursor.get(f).map(|v| v != IS_NULL).unwrap_or(false));
            if seek_total {
                break;
            }
        }

        subqueries.push(PageToken {
            fields: token.fields.clone(),
            filter,
            order,
            offsets: BTreeMap::new(),
            cursor: BTreeMap::new(),
        });
    }
    Ok(subqueries)
}

fn less_by<T: SearchRow>(a: &T, b: &T, specs: &[OrderSpec]) -> bool {
    for spec in specs {
        if matches!(spec, OrderSpec::Nearest { .. }) {
            continue;
        }
        let mut ord = a.cmp_field(b, spec.field());
        if spec.is_desc() {
            ord = ord.reverse();
        }
        match ord {
            Ordering::Less => return true,
            Ordering::Greater => return false,
            Ordering::Equal => {}
        }
    }
    false
}

struct SourceState<T> {
    index: usize,
    items: VecDeque<T>,
}

/// K-way merge of per-source sorted batches. Returns the merged prefix
/// of at most `limit` items plus the per-source consumed counts
/// (deduplicated rows count against the source they were dropped from).
pub(crate) fn merge_sorted<T: SearchRow>(
    batches: Vec<Vec<T>>,
    specs: &[OrderSpec],
    limit: usize,
) -> (Vec<T>, Vec<usize>) {
    let mut consumed = vec![0usize; batches.len()];
    let mut sources: Vec<SourceState<T>> = batches
        .into_iter()
        .enumerate()
        .filter(|(_, batch)| !batch.is_empty())
        .map(|(index, batch)| SourceState {
            index,
            items: batch.into(),
        })
        .collect();
    let mut out: Vec<T> = Vec::new();

    while out.len() < limit && !sources.is_empty() {
        if sources.len() == 1 {
            let src = &mut sources[0];
            while out.len() < limit {
                let Some(item) = src.items.pop_front() else {
                    break;
                };
                consumed[src.index] += 1;
                out.push(item);
            }
            if src.items.is_empty() {
                sources.clear();
            }
            continue;
        }

        // Heads already ascend within each source; order the sources so
        // source 0 holds the global minimum and source 1 the boundary.
        sources.sort_by(|a, b| {
            let (ha, hb) = (
                a.items.front().expect("non-empty source"),
                b.items.front().expect("non-empty source"),
            );
            if less_by(ha, hb, specs) {
                Ordering::Less
            } else if less_by(hb, ha, specs) {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        });
        let (first, rest) = sources.split_at_mut(1);
        let src = &mut first[0];
        let boundary_src = &mut rest[0];
        let mut progressed = false;

        // greedy strictly-less prefix from the minimum source
        while out.len() < limit {
            let Some(head) = src.items.front() else { break };
            let boundary = boundary_src.items.front().expect("non-empty source");
            if !less_by(head, boundary, specs) {
                break;
            }
            let item = src.items.pop_front().expect("head present");
            consumed[src.index] += 1;
            out.push(item);
            progressed = true;
        }

        // cross-source duplicates: keep one copy, advance both sources
        while out.len() < limit {
            let (Some(head), Some(boundary)) =
                (src.items.front(), boundary_src.items.front())
            else {
                break;
            };
            if !head.same(boundary) {
                break;
            }
            let item = src.items.pop_front().expect("head present");
            consumed[src.index] += 1;
            boundary_src.items.pop_front();
            consumed[boundary_src.index] += 1;
            out.push(item);
            progressed = true;
        }

        // equal-but-distinct heads: force one through to avoid spinning
        if !progressed && out.len() < limit {
            if let Some(item) = src.items.pop_front() {
                consumed[src.index] += 1;
                out.push(item);
            }
        }

        sources.retain(|s| !s.items.is_empty());
    }
    (out, consumed)
}

fn ctrl_from(sub: &PageToken, limit: i64, offset: i64) -> SelectCtrl {
    SelectCtrl {
        fields: sub.fields.clone(),
        where_cond: sub.filter.clone(),
        order: sub.order.clone(),
        page: crate::select::Page { limit, offset },
        optimize_conditions: true,
    }
}

/// Run one paged search across `sources`. Count queries (empty `fields`)
/// sum the per-source counts and skip all merge work.
pub async fn search_paged<T: SearchRow>(
    sources: &[Arc<dyn SearchSource<T>>],
    request: &SearchRequest,
) -> Result<SearchPage<T>, DbError> {
    let token = &request.token;
    let limit = request.limit.max(0);

    let order = augment_order::<T>(&token.order, &token.cursor)?;
    let mut augmented = token.clone();
    augmented.order = order.clone();
    let subqueries = split_query_on_lightweight_queries::<T>(&augmented)?;

    if token.fields.is_empty() {
        let mut total = 0i64;
        for sub in &subqueries {
            let mut count_sub = sub.clone();
            count_sub.order = Vec::new();
            let ctrl = ctrl_from(&count_sub, 0, 0);
            let fetched = join_all(sources.iter().map(|s| s.search(&ctrl))).await;
            for result in fetched {
                let (_, count) = result?;
                total += count;
            }
        }
        return Ok(SearchPage {
            items: Vec::new(),
            count: total,
            next: None,
        });
    }

    let mut specs = Vec::with_capacity(order.len());
    for raw in &order {
        specs.push(parse_order(raw)?);
    }

    let mut items: Vec<T> = Vec::new();
    // carried offsets (offset mode); negative values are tombstones
    let mut offsets: BTreeMap<String, i64> = token.offsets.clone();

    for sub in &subqueries {
        let want = limit - items.len() as i64;
        if want <= 0 {
            break;
        }
        let active: Vec<&Arc<dyn SearchSource<T>>> = sources
            .iter()
            .filter(|s| offsets.get(s.name()).map(|o| *o >= 0).unwrap_or(true))
            .collect();
        if active.is_empty() {
            break;
        }

        let fetched = join_all(active.iter().map(|source| {
            let offset = if request.cursor_mode {
                0
            } else {
                offsets.get(source.name()).copied().unwrap_or(0)
            };
            let ctrl = ctrl_from(sub, want, offset);
            async move { (source.name().to_string(), source.search(&ctrl).await) }
        }))
        .await;

        let mut names = Vec::with_capacity(fetched.len());
        let mut batches = Vec::with_capacity(fetched.len());
        let mut backend_exhausted = Vec::with_capacity(fetched.len());
        for (name, result) in fetched {
            let (rows, _count) = result?;
            backend_exhausted.push((rows.len() as i64) < want);
            names.push(name);
            batches.push(rows);
        }
        let batch_sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();

        let (merged, consumed) = merge_sorted(batches, &specs, want as usize);
        for (i, name) in names.iter().enumerate() {
            let fully_drained = consumed[i] == batch_sizes[i];
            let entry = offsets.entry(name.clone()).or_insert(0);
            if backend_exhausted[i] && fully_drained {
                *entry = -1;
            } else {
                *entry += consumed[i] as i64;
            }
        }
        items.extend(merged);
    }

    let next = if items.is_empty() || (items.len() as i64) < limit {
        None
    } else if request.cursor_mode {
        let last = items.last().expect("non-empty page");
        let mut cursor = BTreeMap::new();
        for spec in &specs {
            if matches!(spec, OrderSpec::Nearest { .. }) {
                continue;
            }
            let value = last.cursor_value(spec.field())?;
            cursor.insert(
                spec.field().to_string(),
                value.unwrap_or_else(|| IS_NULL.to_string()),
            );
        }
        Some(PageToken {
            fields: token.fields.clone(),
            filter: token.filter.clone(),
            order: order.clone(),
            offsets: BTreeMap::new(),
            cursor,
        })
    } else {
        Some(PageToken {
            fields: token.fields.clone(),
            filter: token.filter.clone(),
            order: order.clone(),
            offsets,
            cursor: BTreeMap::new(),
        })
    };

    let count = items.len() as i64;
    Ok(SearchPage { items, count, next })
}
