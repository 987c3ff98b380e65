//! The [`DocumentIndex`] capability and the scripted updates it executes.
//!
//! A document index stores one JSON document per shell id, runs search
//! bodies produced by [`compile`](crate::query::compile), and applies
//! [`UpdateScript`]s atomically per document. Each script has a painless
//! source for search servers and a native interpreter ([`UpdateScript::apply`])
//! for in-process backends; both implement the same edit.

use serde_json::{json, Value};

use twinreg_core::SUBMODELS_FIELD;

use crate::error::RegistryError;
use crate::query::SearchHits;

/// `retry_on_conflict` value meaning "retry until the update lands".
pub const UNBOUNDED_RETRIES: u32 = u32::MAX;

const APPEND_OR_REPLACE_SOURCE: &str = "\
if (ctx._source.submodelDescriptors == null) { ctx._source.submodelDescriptors = []; } \
def submodels = ctx._source.submodelDescriptors; \
for (int i = 0; i < submodels.size(); i++) { \
  if (submodels[i].id == params.submodel.id) { submodels[i] = params.submodel; return; } \
} \
submodels.add(params.submodel);";

const REMOVE_SOURCE: &str = "\
def submodels = ctx._source.submodelDescriptors; \
if (submodels == null || !submodels.removeIf(sm -> sm.id == params.submodelId)) { ctx.op = 'noop'; }";

/// How a write becomes visible to search. Both policies return only once
/// the write is searchable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Refresh {
    /// Force a refresh of the affected shard.
    #[default]
    Immediate,
    /// Block until the next scheduled refresh. Cheaper under heavy write
    /// load, slower per call.
    WaitFor,
}

impl Refresh {
    /// Value of the `refresh` request parameter.
    pub fn as_param(self) -> &'static str {
        match self {
            Refresh::Immediate => "true",
            Refresh::WaitFor => "wait_for",
        }
    }
}

/// A server-side edit of a shell document's submodel array.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateScript {
    /// Replace the element with the payload's id in place, or append it.
    AppendOrReplaceSubmodel { submodel: Value },
    /// Delete the element with the given id; a no-op if it is absent.
    RemoveSubmodel { submodel_id: String },
}

/// Whether applying a script changed the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptEffect {
    Modified,
    Noop,
}

impl UpdateScript {
    /// Painless source of the script.
    pub fn source(&self) -> &'static str {
        match self {
            UpdateScript::AppendOrReplaceSubmodel { .. } => APPEND_OR_REPLACE_SOURCE,
            UpdateScript::RemoveSubmodel { .. } => REMOVE_SOURCE,
        }
    }

    /// Script parameters, referenced as `params.*` in the source.
    pub fn params(&self) -> Value {
        match self {
            UpdateScript::AppendOrReplaceSubmodel { submodel } => json!({ "submodel": submodel }),
            UpdateScript::RemoveSubmodel { submodel_id } => json!({ "submodelId": submodel_id }),
        }
    }

    /// Applies the script to a document in place.
    pub fn apply(&self, document: &mut Value) -> Result<ScriptEffect, RegistryError> {
        let fields = document.as_object_mut().ok_or_else(|| {
            RegistryError::InvalidQuery("scripted update on a non-object document".into())
        })?;
        match self {
            UpdateScript::AppendOrReplaceSubmodel { submodel } => {
                let slot = fields
                    .entry(SUBMODELS_FIELD)
                    .or_insert_with(|| Value::Array(Vec::new()));
                if slot.is_null() {
                    *slot = Value::Array(Vec::new());
                }
                let submodels = slot.as_array_mut().ok_or_else(|| {
                    RegistryError::InvalidQuery(format!("'{SUBMODELS_FIELD}' is not an array"))
                })?;
                let id = &submodel["id"];
                match submodels.iter_mut().find(|sm| &sm["id"] == id) {
                    Some(existing) => *existing = submodel.clone(),
                    None => submodels.push(submodel.clone()),
                }
                Ok(ScriptEffect::Modified)
            }
            UpdateScript::RemoveSubmodel { submodel_id } => {
                let Some(submodels) = fields.get_mut(SUBMODELS_FIELD).and_then(Value::as_array_mut)
                else {
                    return Ok(ScriptEffect::Noop);
                };
                let before = submodels.len();
                submodels.retain(|sm| sm["id"].as_str() != Some(submodel_id.as_str()));
                if submodels.len() < before {
                    Ok(ScriptEffect::Modified)
                } else {
                    Ok(ScriptEffect::Noop)
                }
            }
        }
    }
}

/// A scripted update request for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedUpdate {
    pub script: UpdateScript,
    /// How often the backend re-runs the script after a version conflict.
    pub retry_on_conflict: u32,
    pub refresh: Refresh,
}

impl ScriptedUpdate {
    /// An update that retries on conflict until it lands and is visible on
    /// return.
    pub fn unbounded(script: UpdateScript) -> Self {
        ScriptedUpdate {
            script,
            retry_on_conflict: UNBOUNDED_RETRIES,
            refresh: Refresh::Immediate,
        }
    }

    /// The `script` object of an update request body.
    pub fn script_body(&self) -> Value {
        json!({
            "lang": "painless",
            "source": self.script.source(),
            "params": self.script.params(),
        })
    }
}

/// Result of a scripted update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// The script ran and left the document unchanged.
    Noop,
    /// No document with that id exists.
    Missing,
}

/// Document storage and search surface of a search backend.
pub trait DocumentIndex: Send + Sync {
    /// Returns the document source, or `None` if absent.
    fn get(&self, id: &str) -> Result<Option<Value>, RegistryError>;

    /// Creates or overwrites a document.
    fn index(&self, id: &str, document: &Value, refresh: Refresh) -> Result<(), RegistryError>;

    /// Deletes a document. Returns false if it was absent.
    fn delete(&self, id: &str, refresh: Refresh) -> Result<bool, RegistryError>;

    /// Runs a scripted update atomically against the latest version of the
    /// document.
    fn update(&self, id: &str, update: &ScriptedUpdate) -> Result<UpdateOutcome, RegistryError>;

    /// Executes a search body.
    fn search(&self, body: &Value) -> Result<SearchHits, RegistryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Value {
        json!({
            "id": "s1",
            "submodelDescriptors": [
                { "id": "a", "idShort": "first" },
                { "id": "b", "idShort": "second" }
            ]
        })
    }

    #[test]
    fn test_append_or_replace_keeps_position() {
        let mut document = doc();
        let script = UpdateScript::AppendOrReplaceSubmodel {
            submodel: json!({ "id": "a", "idShort": "renamed" }),
        };
        assert_eq!(script.apply(&mut document).unwrap(), ScriptEffect::Modified);
        assert_eq!(document["submodelDescriptors"][0]["idShort"], "renamed");
        assert_eq!(document["submodelDescriptors"].as_array().unwrap().len(), 2);

        let script = UpdateScript::AppendOrReplaceSubmodel {
            submodel: json!({ "id": "c", "idShort": "third" }),
        };
        script.apply(&mut document).unwrap();
        assert_eq!(document["submodelDescriptors"][2]["id"], "c");
    }

    #[test]
    fn test_append_creates_missing_array() {
        let mut document = json!({ "id": "s1", "submodelDescriptors": null });
        let script = UpdateScript::AppendOrReplaceSubmodel {
            submodel: json!({ "id": "a" }),
        };
        script.apply(&mut document).unwrap();
        assert_eq!(document["submodelDescriptors"], json!([{ "id": "a" }]));
    }

    #[test]
    fn test_remove_reports_noop_for_absent_id() {
        let mut document = doc();
        let remove = |id: &str| UpdateScript::RemoveSubmodel {
            submodel_id: id.to_string(),
        };
        assert_eq!(remove("a").apply(&mut document).unwrap(), ScriptEffect::Modified);
        assert_eq!(remove("a").apply(&mut document).unwrap(), ScriptEffect::Noop);
        assert_eq!(document["submodelDescriptors"], json!([{ "id": "b", "idShort": "second" }]));

        let mut bare = json!({ "id": "s2" });
        assert_eq!(remove("a").apply(&mut bare).unwrap(), ScriptEffect::Noop);
    }

    #[test]
    fn test_script_body_carries_params() {
        let update = ScriptedUpdate::unbounded(UpdateScript::RemoveSubmodel {
            submodel_id: "a".into(),
        });
        let body = update.script_body();
        assert_eq!(body["lang"], "painless");
        assert_eq!(body["params"]["submodelId"], "a");
        assert!(body["source"].as_str().unwrap().contains("removeIf"));
        assert_eq!(update.retry_on_conflict, UNBOUNDED_RETRIES);
        assert_eq!(update.refresh.as_param(), "true");
        assert_eq!(Refresh::WaitFor.as_param(), "wait_for");
    }
}
