// Shared fixtures: a todo service served in memory, its schema, and two
// user mods built on the tree walker.

#![allow(dead_code)]

use chrono::{DateTime, NaiveDateTime};
use futures::StreamExt;
use rpcmod_client::{deep_apply_mod, ModError, Predicate, SchemaNode};
use rpcmod_core::{FieldDefinition, MessageDefinition, SchemaRegistry};
use rpcmod_transport::{Code, MemoryClient, MemoryService, Metadata, RequestStream, Status};
use serde_json::{json, Value};
use std::time::Duration;

pub const DATE_FORMAT: &str = "%a %b %d %Y %H:%M:%S";

pub fn todos() -> Vec<Value> {
    vec![
        json!({ "id": "1", "label": "Write the schema", "created": 1_514_764_800_000_i64, "completed": 1_514_772_000_000_i64 }),
        json!({ "id": "2", "label": "Bind the client", "created": 1_514_851_200_000_i64, "completed": 1_514_856_900_000_i64 }),
        json!({ "id": "3", "label": "Add mods", "created": 1_514_937_600_000_i64 }),
        json!({ "id": "4", "label": "Ship it", "created": 1_515_024_000_000_i64 }),
    ]
}

pub fn schema() -> SchemaRegistry {
    SchemaRegistry::new(&schema_definitions())
}

pub fn schema_definitions() -> Vec<MessageDefinition> {
    vec![
        MessageDefinition::new("Empty", vec![]),
        MessageDefinition::new("TodoRequest", vec![FieldDefinition::new("id", "string")]),
        MessageDefinition::new(
            "Todo",
            vec![
                FieldDefinition::new("id", "string"),
                FieldDefinition::new("label", "string"),
                FieldDefinition::new("created", "int64"),
                FieldDefinition::new("completed", "int64"),
            ],
        ),
        MessageDefinition::new("TodoList", vec![FieldDefinition::new("data", "Todo").repeated()]),
        MessageDefinition::new(
            "MetadataEntry",
            vec![
                FieldDefinition::new("key", "string"),
                FieldDefinition::new("value", "string"),
            ],
        ),
    ]
}

fn find_todo(id: &Value) -> Option<Value> {
    todos().into_iter().find(|todo| todo["id"] == *id)
}

fn db_read_error() -> Status {
    let mut metadata = Metadata::new();
    metadata.insert("status", "UNKNOWN");
    Status::new(Code::Unknown, "Couldn't read from the database").with_metadata(metadata)
}

fn metadata_entries(metadata: &Metadata) -> Vec<Value> {
    metadata
        .iter()
        .map(|(key, value)| json!({ "key": key, "value": value }))
        .collect()
}

async fn collect_todos(
    mut requests: RequestStream,
    fail_after: Option<usize>,
) -> Result<Value, Status> {
    let mut docs = Vec::new();
    while let Some(request) = requests.next().await {
        if fail_after == Some(docs.len()) {
            return Err(db_read_error());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        if let Some(todo) = find_todo(&request["id"]) {
            docs.push(todo);
        }
    }
    Ok(json!({ "data": docs }))
}

pub fn todo_service() -> MemoryService {
    MemoryService::new("test.TestService", schema())
        .unary("Unary", "TodoRequest", "Todo", |request, _| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            find_todo(&request["id"])
                .ok_or_else(|| Status::not_found("Requested resource was not found"))
        })
        .unary("UnaryWithError", "TodoRequest", "Todo", |_, _| async move {
            let mut metadata = Metadata::new();
            metadata.insert("status", "NOT_FOUND");
            Err::<Value, Status>(
                Status::not_found("Requested resource was not found").with_metadata(metadata),
            )
        })
        .unary("UnaryWithMetadata", "Empty", "MetadataEntry", |_, metadata| async move {
            metadata_entries(&metadata)
                .into_iter()
                .next()
                .ok_or_else(|| Status::invalid_argument("no metadata"))
        })
        .client_streaming("ClientStream", "TodoRequest", "TodoList", |requests, _| {
            collect_todos(requests, None)
        })
        .client_streaming("ClientStreamWithError", "TodoRequest", "TodoList", |requests, _| {
            collect_todos(requests, Some(2))
        })
        .client_streaming(
            "ClientStreamWithMetadata",
            "Empty",
            "MetadataEntry",
            |_, metadata| async move {
                metadata_entries(&metadata)
                    .into_iter()
                    .next()
                    .ok_or_else(|| Status::invalid_argument("no metadata"))
            },
        )
        .server_streaming("ServerStream", "Empty", "Todo", |_, _, sink| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            for todo in todos() {
                sink.send(todo)?;
            }
            Ok::<(), Status>(())
        })
        .server_streaming("ServerStreamWithError", "Empty", "Todo", |_, _, _| async move {
            let mut metadata = Metadata::new();
            metadata.insert("status", "UNKNOWN");
            Err::<(), Status>(
                Status::new(Code::Unknown, "Oops! Something went wrong!").with_metadata(metadata),
            )
        })
        .server_streaming(
            "ServerStreamWithMetadata",
            "Empty",
            "MetadataEntry",
            |_, metadata, sink| async move {
                for entry in metadata_entries(&metadata) {
                    sink.send(entry)?;
                }
                Ok::<(), Status>(())
            },
        )
        .bidi_streaming("BidiStream", "TodoRequest", "Todo", |mut requests, _, sink| async move {
            while let Some(request) = requests.next().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
                if let Some(todo) = find_todo(&request["id"]) {
                    sink.send(todo)?;
                }
            }
            Ok::<(), Status>(())
        })
        .bidi_streaming(
            "BidiStreamWithError",
            "TodoRequest",
            "Todo",
            |mut requests, _, sink| async move {
                let mut sent = 0;
                while let Some(request) = requests.next().await {
                    if sent == 2 {
                        return Err(db_read_error());
                    }
                    if let Some(todo) = find_todo(&request["id"]) {
                        sink.send(todo)?;
                        sent += 1;
                    }
                }
                Ok::<(), Status>(())
            },
        )
        .bidi_streaming(
            "BidiStreamWithMetadata",
            "Empty",
            "MetadataEntry",
            |_, metadata, sink| async move {
                for entry in metadata_entries(&metadata) {
                    sink.send(entry)?;
                }
                Ok::<(), Status>(())
            },
        )
}

pub fn todo_client() -> MemoryClient {
    todo_service().into_client()
}

fn to_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s
            .parse::<i64>()
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, DATE_FORMAT)
                    .ok()
                    .map(|dt| dt.and_utc().timestamp_millis())
            }),
        _ => None,
    }
}

/// Rewrites `created` and `completed` from unix milliseconds to a date string.
pub fn unix_to_date_string(
    payload: Value,
    schema: Option<SchemaNode<'_>>,
) -> Result<Value, ModError> {
    let to_date = |value: &Value| -> Option<Value> {
        let formatted = to_millis(value)
            .and_then(DateTime::from_timestamp_millis)
            .map(|dt| Value::String(dt.format(DATE_FORMAT).to_string()));
        Some(formatted.unwrap_or_else(|| value.clone()))
    };
    let dates = Predicate::key(|key, _| key == "created" || key == "completed");
    Ok(deep_apply_mod(&payload, schema, &to_date, &dates))
}

/// Adds a human readable `duration` to every completed todo.
pub fn add_duration_prop(
    payload: Value,
    schema: Option<SchemaNode<'_>>,
) -> Result<Value, ModError> {
    match payload {
        Value::Object(mut todo) => {
            if let Some(Value::Array(items)) = todo.get_mut("data") {
                *items = std::mem::take(items)
                    .into_iter()
                    .map(|item| add_duration_prop(item, schema))
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(Value::Object(todo));
            }

            let created = todo.get("created").and_then(to_millis);
            let completed = todo.get("completed").and_then(to_millis);
            if let (Some(created), Some(completed)) = (created, completed) {
                let minutes_total = (completed - created) / 60_000;
                todo.insert(
                    "duration".to_string(),
                    json!(format!(
                        "{} hours and {} minutes",
                        minutes_total / 60,
                        minutes_total % 60
                    )),
                );
            }
            Ok(Value::Object(todo))
        }
        other => Err(ModError::unexpected_shape("object", &other)),
    }
}
