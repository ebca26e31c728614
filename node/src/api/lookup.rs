//! Bulk and sortable lookup endpoints. These power wallet sync and
//! explorer tables: fetch many addresses in one round trip, or page
//! through blocks/transactions/names ordered by an arbitrary column.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use tessera_protocol::NodeError;

use super::{ApiResult, AppState, Pagination};

/// Upper bound on a bulk address lookup.
const MAX_BULK_ADDRESSES: usize = 128;

#[derive(Debug, Default, Deserialize)]
pub struct SortedQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    #[serde(rename = "orderBy")]
    pub order_by: Option<String>,
    pub order: Option<String>,
}

impl SortedQuery {
    fn page(&self) -> Pagination {
        Pagination {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// `true` for descending order; validates the `order` parameter.
fn descending(query: &SortedQuery) -> ApiResult<bool> {
    match query.order.as_deref() {
        None => Ok(false),
        Some(o) if o.eq_ignore_ascii_case("asc") => Ok(false),
        Some(o) if o.eq_ignore_ascii_case("desc") => Ok(true),
        Some(_) => Err(NodeError::InvalidParameter("order".to_string()).into()),
    }
}

fn order_by<'q>(query: &'q SortedQuery, allowed: &[&str], default: &'q str) -> ApiResult<&'q str> {
    match query.order_by.as_deref() {
        None => Ok(default),
        Some(field) if allowed.contains(&field) => Ok(field),
        Some(_) => Err(NodeError::InvalidParameter("orderBy".to_string()).into()),
    }
}

/// `GET /lookup/addresses/{addresses}` — comma-separated bulk fetch.
pub async fn addresses(
    State(state): State<AppState>,
    Path(list): Path<String>,
) -> ApiResult<Json<Value>> {
    let wanted: Vec<&str> = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if wanted.is_empty() {
        return Err(NodeError::MissingParameter("addresses".to_string()).into());
    }
    if wanted.len() > MAX_BULK_ADDRESSES {
        return Err(NodeError::LargeParameter("addresses".to_string()).into());
    }

    let mut found = 0usize;
    let mut results: BTreeMap<String, Value> = BTreeMap::new();
    for address in wanted {
        match state.ledger.get(address)? {
            Some(row) => {
                found += 1;
                results.insert(address.to_string(), row.to_json());
            }
            None => {
                results.insert(address.to_string(), Value::Null);
            }
        }
    }

    Ok(Json(json!({
        "ok": true,
        "found": found,
        "notFound": results.len() - found,
        "addresses": results,
    })))
}

/// `GET /lookup/blocks`
pub async fn blocks(
    State(state): State<AppState>,
    Query(query): Query<SortedQuery>,
) -> ApiResult<Json<Value>> {
    let desc = descending(&query)?;
    let field = order_by(&query, &["height", "time", "difficulty", "value"], "height")?;
    let (limit, offset) = query.page().clamp();

    let total = state.store.block_count()?;
    let mut rows = state.store.blocks_asc(total, 0)?;
    rows.sort_by(|a, b| match field {
        "time" => a.time.cmp(&b.time),
        "difficulty" => a.difficulty.cmp(&b.difficulty),
        "value" => a.value.cmp(&b.value),
        _ => a.id.cmp(&b.id),
    });
    if desc {
        rows.reverse();
    }

    let page: Vec<Value> = rows
        .iter()
        .skip(offset)
        .take(limit)
        .map(|b| b.to_json())
        .collect();
    Ok(Json(json!({
        "ok": true,
        "count": page.len(),
        "total": total,
        "blocks": page,
    })))
}

/// `GET /lookup/transactions`
pub async fn transactions(
    State(state): State<AppState>,
    Query(query): Query<SortedQuery>,
) -> ApiResult<Json<Value>> {
    let desc = descending(&query)?;
    let field = order_by(&query, &["id", "time", "value"], "id")?;
    let (limit, offset) = query.page().clamp();

    let total = state.store.transaction_count()?;
    let (mut rows, _) = state.store.transactions_where(|_| true, total, 0, false)?;
    rows.sort_by(|a, b| match field {
        "time" => a.time.cmp(&b.time),
        "value" => a.value.cmp(&b.value),
        _ => a.id.cmp(&b.id),
    });
    if desc {
        rows.reverse();
    }

    let page: Vec<Value> = rows
        .iter()
        .skip(offset)
        .take(limit)
        .map(|t| t.to_json())
        .collect();
    Ok(Json(json!({
        "ok": true,
        "count": page.len(),
        "total": total,
        "transactions": page,
    })))
}

/// `GET /lookup/names`
pub async fn names(
    State(state): State<AppState>,
    Query(query): Query<SortedQuery>,
) -> ApiResult<Json<Value>> {
    let desc = descending(&query)?;
    let field = order_by(&query, &["name", "registered", "updated", "unpaid"], "name")?;
    let (limit, offset) = query.page().clamp();

    let mut rows = state.store.names()?;
    let total = rows.len();
    rows.sort_by(|a, b| match field {
        "registered" => a.registered.cmp(&b.registered),
        "updated" => a.updated.cmp(&b.updated),
        "unpaid" => a.unpaid.cmp(&b.unpaid),
        _ => a.name.cmp(&b.name),
    });
    if desc {
        rows.reverse();
    }

    let page: Vec<&tessera_protocol::names::Name> =
        rows.iter().skip(offset).take(limit).collect();
    Ok(Json(json!({
        "ok": true,
        "count": page.len(),
        "total": total,
        "names": page,
    })))
}
