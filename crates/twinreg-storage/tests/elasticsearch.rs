//! HTTP behavior of the Elasticsearch index against a mock cluster.

use serde_json::{json, Value};
use tokio::runtime::Runtime;
use wiremock::matchers::{body_json, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use twinreg_core::{ShellDescriptor, SubmodelDescriptor};
use twinreg_storage::document::elasticsearch::index_mapping;
use twinreg_storage::document::{
    DocumentStore, Refresh, ScriptedUpdate, UpdateScript, CLEAR_BATCH_SIZE,
};
use twinreg_storage::{DocumentIndex, ElasticsearchIndex, RegistryError, ShellRegistry};

const INDEX: &str = "shells";

/// A mock cluster driven from synchronous tests. The server runs on its own
/// runtime; the blocking client is only used outside of it.
struct Cluster {
    server: MockServer,
    runtime: Runtime,
}

impl Cluster {
    fn start() -> Self {
        let runtime = Runtime::new().unwrap();
        let server = runtime.block_on(MockServer::start());
        Cluster { server, runtime }
    }

    fn mount(&self, mock: Mock) {
        self.runtime.block_on(self.server.register(mock));
    }

    fn index(&self) -> ElasticsearchIndex {
        ElasticsearchIndex::new(&self.server.uri(), INDEX).unwrap()
    }

    fn store(&self) -> DocumentStore<ElasticsearchIndex> {
        DocumentStore::new(self.index())
    }

    /// Panics unless every mock saw its expected number of calls.
    fn verify(&self) {
        self.runtime.block_on(self.server.verify());
    }
}

fn result(value: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "_index": INDEX, "result": value }))
}

fn not_found() -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({
        "error": { "type": "document_missing_exception" },
        "status": 404
    }))
}

#[test]
fn test_update_of_missing_document_is_shell_not_found() {
    let cluster = Cluster::start();
    cluster.mount(
        Mock::given(method("POST"))
            .and(path("/shells/_update/ghost"))
            .respond_with(not_found())
            .expect(2),
    );

    let store = cluster.store();
    let err = store
        .append_or_replace_submodel("ghost", SubmodelDescriptor::new("a", "alpha"))
        .unwrap_err();
    assert!(matches!(err, RegistryError::ShellNotFound(ref id) if id == "ghost"));
    let err = store.remove_submodel("ghost", "a").unwrap_err();
    assert!(matches!(err, RegistryError::ShellNotFound(_)));
    cluster.verify();
}

#[test]
fn test_update_retries_without_bound_and_refreshes() {
    let cluster = Cluster::start();
    cluster.mount(
        Mock::given(method("POST"))
            .and(path("/shells/_update/s1"))
            .and(query_param("retry_on_conflict", i32::MAX.to_string()))
            .and(query_param("refresh", "true"))
            .and(body_partial_json(json!({
                "script": { "lang": "painless", "params": { "submodel": { "id": "a" } } }
            })))
            .respond_with(result("updated"))
            .expect(1),
    );

    cluster
        .store()
        .append_or_replace_submodel("s1", SubmodelDescriptor::new("a", "alpha"))
        .unwrap();
    cluster.verify();
}

#[test]
fn test_noop_update_reports_absent_submodel() {
    let cluster = Cluster::start();
    cluster.mount(
        Mock::given(method("POST"))
            .and(path("/shells/_update/s1"))
            .and(body_partial_json(json!({ "script": { "params": { "submodelId": "a" } } })))
            .respond_with(result("noop")),
    );

    assert!(!cluster.store().remove_submodel("s1", "a").unwrap());
}

#[test]
fn test_exhausted_conflict_retries_are_version_conflicts() {
    let cluster = Cluster::start();
    cluster.mount(
        Mock::given(method("POST"))
            .and(path("/shells/_update/s1"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": { "type": "version_conflict_engine_exception" },
                "status": 409
            }))),
    );

    let update = ScriptedUpdate::unbounded(UpdateScript::RemoveSubmodel {
        submodel_id: "a".into(),
    });
    let err = cluster.index().update("s1", &update).unwrap_err();
    assert!(matches!(err, RegistryError::VersionConflict(ref id) if id == "s1"));

    let err = cluster
        .store()
        .append_or_replace_submodel("s1", SubmodelDescriptor::new("a", "alpha"))
        .unwrap_err();
    assert!(matches!(err, RegistryError::VersionConflict(_)));
}

#[test]
fn test_delete_reads_result_field() {
    let cluster = Cluster::start();
    cluster.mount(
        Mock::given(method("DELETE"))
            .and(path("/shells/_doc/gone"))
            .and(query_param("refresh", "true"))
            .respond_with(result("deleted"))
            .expect(1),
    );
    cluster.mount(
        Mock::given(method("DELETE"))
            .and(path("/shells/_doc/raced"))
            .respond_with(result("not_found")),
    );
    cluster.mount(
        Mock::given(method("DELETE"))
            .and(path("/shells/_doc/absent"))
            .respond_with(not_found()),
    );

    let index = cluster.index();
    assert!(index.delete("gone", Refresh::Immediate).unwrap());
    assert!(!index.delete("raced", Refresh::Immediate).unwrap());
    assert!(!cluster.store().remove("absent").unwrap());
    cluster.verify();
}

#[test]
fn test_wait_for_refresh_is_sent_on_writes() {
    let cluster = Cluster::start();
    cluster.mount(
        Mock::given(method("PUT"))
            .and(path("/shells/_doc/s1"))
            .and(query_param("refresh", "wait_for"))
            .and(body_partial_json(json!({ "id": "s1", "idShort": "pump" })))
            .respond_with(result("created"))
            .expect(1),
    );
    cluster.mount(
        Mock::given(method("DELETE"))
            .and(path("/shells/_doc/s1"))
            .and(query_param("refresh", "wait_for"))
            .respond_with(result("deleted"))
            .expect(1),
    );

    let store = cluster.store().with_refresh(Refresh::WaitFor);
    store.add_or_replace(ShellDescriptor::new("s1", "pump")).unwrap();
    assert!(store.remove("s1").unwrap());
    cluster.verify();
}

#[test]
fn test_server_errors_surface_as_backend_errors() {
    let cluster = Cluster::start();
    cluster.mount(
        Mock::given(method("GET"))
            .and(path("/shells/_doc/s1"))
            .respond_with(ResponseTemplate::new(500).set_body_string("shard failure")),
    );
    cluster.mount(
        Mock::given(method("POST"))
            .and(path("/shells/_search"))
            .respond_with(ResponseTemplate::new(503)),
    );

    let store = cluster.store();
    let err = store.get_shell("s1").unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Backend { status: 500, ref body } if body == "shard failure"
    ));
    assert!(matches!(
        store.get_all_shells(),
        Err(RegistryError::Backend { status: 503, .. })
    ));
}

#[test]
fn test_get_all_shells_follows_cursor() {
    let cluster = Cluster::start();
    let page = |ids: Vec<String>| -> ResponseTemplate {
        let hits: Vec<Value> = ids
            .iter()
            .map(|id| json!({ "_id": id, "_source": { "id": id }, "sort": [id] }))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({
            "hits": { "total": { "value": CLEAR_BATCH_SIZE + 1, "relation": "eq" }, "hits": hits }
        }))
    };
    let first: Vec<String> = (0..CLEAR_BATCH_SIZE).map(|i| format!("s{i:03}")).collect();
    let last = first[first.len() - 1].clone();

    cluster.mount(
        Mock::given(method("POST"))
            .and(path("/shells/_search"))
            .and(body_partial_json(json!({ "from": 0, "search_after": [last] })))
            .respond_with(page(vec![format!("s{CLEAR_BATCH_SIZE:03}")]))
            .with_priority(1)
            .expect(1),
    );
    cluster.mount(
        Mock::given(method("POST"))
            .and(path("/shells/_search"))
            .and(body_partial_json(json!({
                "from": 0,
                "size": CLEAR_BATCH_SIZE,
                "sort": [{ "id.keyword": { "order": "asc" } }]
            })))
            .respond_with(page(first))
            .expect(1),
    );

    let shells = cluster.store().get_all_shells().unwrap();
    assert_eq!(shells.len(), CLEAR_BATCH_SIZE as usize + 1);
    assert_eq!(shells[CLEAR_BATCH_SIZE as usize].id, "s100");
    cluster.verify();
}

#[test]
fn test_ensure_index_creates_mapping_once() {
    let cluster = Cluster::start();
    cluster.mount(
        Mock::given(method("HEAD"))
            .and(path("/shells"))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1),
    );
    cluster.mount(
        Mock::given(method("HEAD"))
            .and(path("/shells"))
            .respond_with(ResponseTemplate::new(200)),
    );
    cluster.mount(
        Mock::given(method("PUT"))
            .and(path("/shells"))
            .and(body_json(index_mapping()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
            .expect(1),
    );

    let index = cluster.index();
    index.ensure_index().unwrap();
    index.ensure_index().unwrap();
    cluster.verify();
}
