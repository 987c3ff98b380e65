//! Compiles [`SearchRequest`]s into Elasticsearch-style query bodies and
//! turns raw hits back into [`SearchResponse`]s.
//!
//! `MATCH` runs against the analyzed field; `REGEX` and sort keys use the
//! `.keyword` subfield so they see the whole raw value. Conditions on a path
//! inside the submodel array are wrapped in a `nested` query so that matching
//! happens per submodel element. The nested scope asks for inner hits, which
//! [`collect`] uses to shrink every returned shell to the submodels that
//! actually matched.
//!
//! Deep scans page with a `search_after` cursor ([`CompiledQuery::after`])
//! instead of offsets, which search servers cap at their result window.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use twinreg_core::{
    is_submodel_path, QueryType, SearchRequest, SearchResponse, ShellDescriptor, SortDirection,
    SUBMODELS_FIELD,
};

use crate::error::RegistryError;

/// Upper bound on matching submodels recovered per shell.
pub const MAX_INNER_HITS: u32 = 100;

/// Page size used when a request carries no page.
pub const MAX_RESULT_WINDOW: u32 = 10_000;

/// Subfield holding the unanalyzed value of a string field.
pub const KEYWORD_SUBFIELD: &str = "keyword";

/// Name under which nested matches are reported in a hit.
pub const INNER_HITS_NAME: &str = "submodels";

/// A backend query body plus what is needed to interpret its hits.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub body: Value,
    /// True if the query used a nested scope with inner hits.
    pub nested: bool,
}

impl CompiledQuery {
    /// Continues the sorted result list strictly after the hit whose sort
    /// values are `cursor`. The offset is reset to zero.
    pub fn after(mut self, cursor: Vec<Value>) -> Self {
        self.body["from"] = json!(0);
        self.body["search_after"] = Value::Array(cursor);
        self
    }
}

/// One document returned by a backend search.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: String,
    pub source: Value,
    /// Matching nested elements, keyed by inner-hits name.
    pub inner_hits: HashMap<String, Vec<Value>>,
    /// Sort values of the hit, one per sort clause. Empty for unsorted
    /// searches.
    pub sort: Vec<Value>,
}

/// Raw result of a backend search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
    /// Matching documents across all pages.
    pub total: u64,
    pub hits: Vec<Hit>,
}

/// Compiles a search request into a query body.
pub fn compile(request: &SearchRequest) -> Result<CompiledQuery, RegistryError> {
    let (query, nested) = match &request.query {
        None => (json!({ "match_all": {} }), false),
        Some(q) => {
            if q.path.is_empty() {
                return Err(RegistryError::InvalidQuery("empty field path".into()));
            }
            let condition = match q.query_type {
                QueryType::Match => keyed(
                    "match",
                    &q.path,
                    json!({ "query": q.value, "operator": "and" }),
                ),
                QueryType::Regex => keyed(
                    "regexp",
                    &keyword_field(&q.path),
                    json!({ "value": q.value }),
                ),
            };
            if q.targets_submodels() {
                let scoped = json!({
                    "nested": {
                        "path": SUBMODELS_FIELD,
                        "query": condition,
                        "inner_hits": { "name": INNER_HITS_NAME, "size": MAX_INNER_HITS },
                    }
                });
                (scoped, true)
            } else {
                (condition, false)
            }
        }
    };

    let (from, size) = match request.page {
        Some(page) => (page.offset(), page.size),
        None => (0, MAX_RESULT_WINDOW),
    };

    let mut body = json!({
        "query": query,
        "from": from,
        "size": size,
        "track_total_hits": true,
    });
    if !request.sort.is_empty() {
        let sort: Vec<Value> = request
            .sort
            .iter()
            .map(|key| {
                let order = match key.direction() {
                    SortDirection::Asc => "asc",
                    SortDirection::Desc => "desc",
                };
                let mut spec = json!({ "order": order });
                if is_submodel_path(&key.field) {
                    spec["nested"] = json!({ "path": SUBMODELS_FIELD });
                }
                keyed_value(&keyword_field(&key.field), spec)
            })
            .collect();
        body["sort"] = Value::Array(sort);
    }

    Ok(CompiledQuery { body, nested })
}

/// Converts raw hits into a response, shrinking submodel arrays to the
/// inner hits when the query was nested.
pub fn collect(
    compiled: &CompiledQuery,
    hits: SearchHits,
) -> Result<SearchResponse, RegistryError> {
    let mut shells = Vec::with_capacity(hits.hits.len());
    for mut hit in hits.hits {
        let mut shell: ShellDescriptor = serde_json::from_value(hit.source)?;
        if compiled.nested {
            let matched = hit.inner_hits.remove(INNER_HITS_NAME).unwrap_or_default();
            shell.submodel_descriptors = matched
                .into_iter()
                .map(serde_json::from_value)
                .collect::<Result<_, _>>()?;
        }
        shells.push(shell);
    }
    Ok(SearchResponse {
        total: hits.total,
        hits: shells,
    })
}

/// Raw-value subfield of a string field.
pub fn keyword_field(path: &str) -> String {
    format!("{path}.{KEYWORD_SUBFIELD}")
}

/// `{ kind: { field: spec } }`
fn keyed(kind: &str, field: &str, spec: Value) -> Value {
    keyed_value(kind, keyed_value(field, spec))
}

fn keyed_value(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}
