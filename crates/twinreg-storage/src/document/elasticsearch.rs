//! [`DocumentIndex`] over the Elasticsearch REST API.
//!
//! Uses the blocking `reqwest` client. Transport failures surface as
//! [`RegistryError::Transport`]; non-success statuses other than the ones a
//! call expects (404 for absent documents, 409 for exhausted conflict
//! retries) surface as [`RegistryError::Backend`].

use std::collections::HashMap;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use twinreg_core::SUBMODELS_FIELD;

use crate::document::index::{DocumentIndex, Refresh, ScriptedUpdate, UpdateOutcome};
use crate::error::RegistryError;
use crate::query::{Hit, SearchHits, KEYWORD_SUBFIELD};

/// Default request timeout of the HTTP client.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest `retry_on_conflict` the server accepts (a Java `int`).
const MAX_RETRY_ON_CONFLICT: u32 = i32::MAX as u32;

/// Elasticsearch-backed document index.
#[derive(Debug, Clone)]
pub struct ElasticsearchIndex {
    client: Client,
    base_url: Url,
    index: String,
}

impl ElasticsearchIndex {
    /// Creates a client for `index` on the cluster at `base_url`.
    pub fn new(base_url: &str, index: &str) -> Result<Self, RegistryError> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Self::with_client(client, base_url, index)
    }

    /// Creates an index handle using a preconfigured HTTP client.
    pub fn with_client(client: Client, base_url: &str, index: &str) -> Result<Self, RegistryError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            RegistryError::Configuration(format!("invalid search backend URL '{base_url}': {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RegistryError::Configuration(format!(
                "search backend URL '{base_url}' cannot carry a path"
            )));
        }
        if index.is_empty() {
            return Err(RegistryError::Configuration("empty index name".into()));
        }
        Ok(ElasticsearchIndex {
            client,
            base_url,
            index: index.to_string(),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// Creates the index with the nested submodel mapping if it does not
    /// exist yet.
    pub fn ensure_index(&self) -> Result<(), RegistryError> {
        let url = self.url(&[])?;
        let response = self.client.head(url.clone()).send()?;
        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response));
        }
        info!(index = %self.index, "creating search index");
        let response = self.client.put(url).json(&index_mapping()).send()?;
        expect_success(response)?;
        Ok(())
    }

    /// `{base}/{index}/{segments...}` with every segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, RegistryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RegistryError::Configuration(format!("'{}' cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .push(&self.index)
            .extend(segments);
        Ok(url)
    }
}

/// Index creation body. Submodels are nested so each element matches on its
/// own. Every string field is analyzed text with an untruncated `.keyword`
/// subfield: the dynamic default skips values over 256 characters, which
/// would hide long URN and URL ids from regex queries and id sorting.
pub fn index_mapping() -> Value {
    json!({
        "mappings": {
            "dynamic_templates": [{
                "strings": {
                    "match_mapping_type": "string",
                    "mapping": {
                        "type": "text",
                        "fields": { KEYWORD_SUBFIELD: { "type": "keyword" } }
                    }
                }
            }],
            "properties": {
                SUBMODELS_FIELD: { "type": "nested" }
            }
        }
    })
}

impl DocumentIndex for ElasticsearchIndex {
    fn get(&self, id: &str) -> Result<Option<Value>, RegistryError> {
        let response = self.client.get(self.url(&["_doc", id])?).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: GetBody = expect_success(response)?.json()?;
        Ok(body.found.then_some(body.source))
    }

    fn index(&self, id: &str, document: &Value, refresh: Refresh) -> Result<(), RegistryError> {
        debug!(index = %self.index, id, "indexing document");
        let response = self
            .client
            .put(self.url(&["_doc", id])?)
            .query(&[("refresh", refresh.as_param())])
            .json(document)
            .send()?;
        expect_success(response)?;
        Ok(())
    }

    fn delete(&self, id: &str, refresh: Refresh) -> Result<bool, RegistryError> {
        let response = self
            .client
            .delete(self.url(&["_doc", id])?)
            .query(&[("refresh", refresh.as_param())])
            .send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let body: WriteBody = expect_success(response)?.json()?;
        Ok(body.result == "deleted")
    }

    fn update(&self, id: &str, update: &ScriptedUpdate) -> Result<UpdateOutcome, RegistryError> {
        let retries = update.retry_on_conflict.min(MAX_RETRY_ON_CONFLICT).to_string();
        let response = self
            .client
            .post(self.url(&["_update", id])?)
            .query(&[
                ("retry_on_conflict", retries.as_str()),
                ("refresh", update.refresh.as_param()),
            ])
            .json(&json!({ "script": update.script_body() }))
            .send()?;
        match response.status() {
            StatusCode::NOT_FOUND => return Ok(UpdateOutcome::Missing),
            StatusCode::CONFLICT => return Err(RegistryError::VersionConflict(id.to_string())),
            _ => {}
        }
        let body: WriteBody = expect_success(response)?.json()?;
        Ok(match body.result.as_str() {
            "noop" => UpdateOutcome::Noop,
            _ => UpdateOutcome::Updated,
        })
    }

    fn search(&self, body: &Value) -> Result<SearchHits, RegistryError> {
        let response = self.client.post(self.url(&["_search"])?).json(body).send()?;
        let body: SearchBody = expect_success(response)?.json()?;
        Ok(body.into_hits())
    }
}

fn expect_success(response: Response) -> Result<Response, RegistryError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(backend_error(response))
    }
}

fn backend_error(response: Response) -> RegistryError {
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    RegistryError::Backend { status, body }
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GetBody {
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source", default)]
    source: Value,
}

#[derive(Debug, Deserialize)]
struct WriteBody {
    result: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchBody {
    hits: HitsBody,
}

#[derive(Debug, Deserialize)]
struct HitsBody {
    #[serde(default)]
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct TotalHits {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
    #[serde(default)]
    inner_hits: HashMap<String, InnerHitsBody>,
    #[serde(default)]
    sort: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct InnerHitsBody {
    hits: InnerHitList,
}

#[derive(Debug, Deserialize)]
struct InnerHitList {
    #[serde(default)]
    hits: Vec<InnerHit>,
}

#[derive(Debug, Deserialize)]
struct InnerHit {
    #[serde(rename = "_source")]
    source: Value,
}

impl SearchBody {
    pub(crate) fn into_hits(self) -> SearchHits {
        let hits: Vec<Hit> = self
            .hits
            .hits
            .into_iter()
            .map(|raw| Hit {
                id: raw.id,
                source: raw.source,
                inner_hits: raw
                    .inner_hits
                    .into_iter()
                    .map(|(name, inner)| {
                        (name, inner.hits.hits.into_iter().map(|h| h.source).collect())
                    })
                    .collect(),
                sort: raw.sort,
            })
            .collect();
        let total = self
            .hits
            .total
            .map_or(hits.len() as u64, |total| total.value);
        SearchHits { total, hits }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::INNER_HITS_NAME;

    #[test]
    fn test_parse_search_response_with_inner_hits() {
        let raw = json!({
            "took": 3,
            "hits": {
                "total": { "value": 7, "relation": "eq" },
                "hits": [{
                    "_index": "shell-descriptors",
                    "_id": "urn:shell:1",
                    "_source": { "id": "urn:shell:1", "submodelDescriptors": [{ "id": "a" }, { "id": "b" }] },
                    "inner_hits": {
                        "submodels": {
                            "hits": {
                                "total": { "value": 1, "relation": "eq" },
                                "hits": [{ "_nested": { "field": "submodelDescriptors", "offset": 1 }, "_source": { "id": "b" } }]
                            }
                        }
                    }
                }]
            }
        });
        let body: SearchBody = serde_json::from_value(raw).unwrap();
        let hits = body.into_hits();
        assert_eq!(hits.total, 7);
        assert_eq!(hits.hits[0].id, "urn:shell:1");
        assert_eq!(hits.hits[0].inner_hits[INNER_HITS_NAME], vec![json!({ "id": "b" })]);
    }

    #[test]
    fn test_parse_sort_values_for_cursor() {
        let raw = json!({ "hits": { "hits": [{ "_id": "a", "_source": {}, "sort": ["a"] }] } });
        let body: SearchBody = serde_json::from_value(raw).unwrap();
        assert_eq!(body.into_hits().hits[0].sort, vec![json!("a")]);
    }

    #[test]
    fn test_parse_search_response_without_sources() {
        let raw = json!({ "hits": { "hits": [{ "_id": "a" }, { "_id": "b" }] } });
        let body: SearchBody = serde_json::from_value(raw).unwrap();
        let hits = body.into_hits();
        assert_eq!(hits.total, 2);
        assert!(hits.hits[1].source.is_null());
    }

    #[test]
    fn test_document_urls_are_percent_encoded() {
        let index = ElasticsearchIndex::new("http://localhost:9200/", "shells").unwrap();
        let url = index.url(&["_doc", "https://example.com/ids/aas/1"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9200/shells/_doc/https:%2F%2Fexample.com%2Fids%2Faas%2F1"
        );
    }

    #[test]
    fn test_invalid_configuration_rejected() {
        assert!(matches!(
            ElasticsearchIndex::new("not a url", "shells"),
            Err(RegistryError::Configuration(_))
        ));
        assert!(matches!(
            ElasticsearchIndex::new("http://localhost:9200", ""),
            Err(RegistryError::Configuration(_))
        ));
    }

    #[test]
    fn test_mapping_nests_submodels() {
        assert_eq!(
            index_mapping()["mappings"]["properties"][SUBMODELS_FIELD]["type"],
            "nested"
        );
    }

    #[test]
    fn test_mapping_keeps_long_keyword_values() {
        let mapping = index_mapping();
        let strings = &mapping["mappings"]["dynamic_templates"][0]["strings"];
        assert_eq!(strings["match_mapping_type"], "string");
        assert_eq!(strings["mapping"]["type"], "text");
        let keyword = &strings["mapping"]["fields"][KEYWORD_SUBFIELD];
        assert_eq!(keyword["type"], "keyword");
        assert!(keyword.get("ignore_above").is_none());
    }
}
