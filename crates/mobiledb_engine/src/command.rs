//! JSON command execution.
//!
//! Requests are JSON objects naming one command and the database it runs
//! against:
//!
//! ```text
//! {"insert": "<coll>", "$db": "<db>", "documents": [{...}, ...]}
//! {"find":   "<coll>", "$db": "<db>", "filter": {...}}
//! {"delete": "<coll>", "$db": "<db>", "filter": {...}}
//! {"count":  "<coll>", "$db": "<db>", "filter": {...}}
//! {"drop":   "<coll>", "$db": "<db>"}
//! {"ping":   1}
//! ```
//!
//! Replies always carry `ok`. Failures reply
//! `{"ok": 0, "errmsg": "...", "code": <server code>}`.

use crate::error::{EngineError, EngineResult};
use crate::store::Store;
use serde_json::{json, Map, Value};

const COMMANDS: [&str; 6] = ["insert", "find", "delete", "count", "drop", "ping"];

/// Result of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    /// Command name, or `"unknown"`.
    pub name: &'static str,
    /// Reply document.
    pub reply: Value,
}

/// Runs one request against a store. Never fails; failures become error
/// replies.
pub fn execute(store: &mut Store, request: &[u8]) -> Executed {
    let parsed = serde_json::from_slice::<Value>(request)
        .map_err(EngineError::from)
        .and_then(|value| match value {
            Value::Object(map) => Ok(map),
            _ => Err(EngineError::failed_to_parse("request is not a document")),
        });

    let request = match parsed {
        Ok(request) => request,
        Err(err) => {
            return Executed {
                name: "unknown",
                reply: error_reply(&err),
            }
        }
    };

    let Some(name) = COMMANDS.into_iter().find(|name| request.contains_key(*name)) else {
        return Executed {
            name: "unknown",
            reply: error_reply(&EngineError::CommandNotFound),
        };
    };

    let reply = match run(store, name, &request) {
        Ok(reply) => reply,
        Err(err) => error_reply(&err),
    };
    Executed { name, reply }
}

fn run(store: &mut Store, name: &str, request: &Map<String, Value>) -> EngineResult<Value> {
    if name == "ping" {
        return Ok(json!({ "ok": 1 }));
    }

    let namespace = namespace(name, request)?;
    match name {
        "insert" => insert(store, namespace, request),
        "find" => {
            let filter = filter(request)?;
            let docs: Vec<Value> = store
                .collections
                .get(&namespace)
                .map(|docs| docs.iter().filter(|doc| matches(doc, filter)).cloned().collect())
                .unwrap_or_default();
            Ok(json!({ "ok": 1, "cursor": { "ns": namespace, "firstBatch": docs } }))
        }
        "delete" => {
            let filter = filter(request)?;
            let mut removed = 0u64;
            if let Some(docs) = store.collections.get_mut(&namespace) {
                docs.retain(|doc| {
                    let hit = matches(doc, filter);
                    removed += u64::from(hit);
                    !hit
                });
            }
            Ok(json!({ "ok": 1, "n": removed }))
        }
        "count" => {
            let filter = filter(request)?;
            let n = store
                .collections
                .get(&namespace)
                .map_or(0, |docs| docs.iter().filter(|doc| matches(doc, filter)).count());
            Ok(json!({ "ok": 1, "n": n }))
        }
        "drop" => match store.collections.remove(&namespace) {
            Some(_) => Ok(json!({ "ok": 1, "ns": namespace })),
            None => Err(EngineError::NamespaceNotFound { namespace }),
        },
        _ => Err(EngineError::CommandNotFound),
    }
}

fn insert(store: &mut Store, namespace: String, request: &Map<String, Value>) -> EngineResult<Value> {
    let documents = match request.get("documents") {
        Some(Value::Array(documents)) => documents,
        _ => return Err(EngineError::bad_value("insert requires a documents array")),
    };

    let mut prepared = Vec::with_capacity(documents.len());
    for document in documents {
        let Value::Object(fields) = document else {
            return Err(EngineError::bad_value("documents must be objects"));
        };
        let mut fields = fields.clone();
        if !fields.contains_key("_id") {
            fields.insert("_id".into(), store.generate_id());
        }
        prepared.push(Value::Object(fields));
    }

    let collection = store.collections.entry(namespace.clone()).or_default();
    for (index, document) in prepared.iter().enumerate() {
        let id = &document["_id"];
        let earlier = &prepared[..index];
        if collection
            .iter()
            .chain(earlier)
            .any(|existing| &existing["_id"] == id)
        {
            return Err(EngineError::DuplicateKey {
                namespace,
                id: id.to_string(),
            });
        }
    }

    let ids: Vec<Value> = prepared.iter().map(|doc| doc["_id"].clone()).collect();
    let n = prepared.len();
    collection.extend(prepared);
    Ok(json!({ "ok": 1, "n": n, "insertedIds": ids }))
}

fn namespace(name: &str, request: &Map<String, Value>) -> EngineResult<String> {
    let collection = match request.get(name) {
        Some(Value::String(collection)) if !collection.is_empty() => collection,
        _ => {
            return Err(EngineError::bad_value(format!(
                "{name} requires a collection name"
            )))
        }
    };
    let db = match request.get("$db") {
        Some(Value::String(db)) if !db.is_empty() => db,
        _ => return Err(EngineError::bad_value("$db is required")),
    };
    Ok(format!("{db}.{collection}"))
}

fn filter(request: &Map<String, Value>) -> EngineResult<Option<&Map<String, Value>>> {
    match request.get("filter") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(filter)) => Ok(Some(filter)),
        Some(_) => Err(EngineError::bad_value("filter must be a document")),
    }
}

/// Top-level equality match.
fn matches(document: &Value, filter: Option<&Map<String, Value>>) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    filter
        .iter()
        .all(|(field, expected)| document.get(field) == Some(expected))
}

fn error_reply(err: &EngineError) -> Value {
    json!({ "ok": 0, "errmsg": err.to_string(), "code": err.server_code() })
}
