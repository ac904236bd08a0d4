// Todo client example
// Serves a small todo service in memory and calls it through a ModClient
// with noDefaults, enforceNumber and noNilProps enabled plus one user mod.
//
// Run with: RUST_LOG=rpcmod=debug cargo run --example todo_client

use anyhow::Result;
use futures::StreamExt;
use rpcmod_client::{init_logging, LogFormat, ModClient, ModConfig, ModError};
use rpcmod_core::{FieldDefinition, MessageDefinition, SchemaRegistry};
use rpcmod_transport::{MemoryService, Status};
use serde_json::{json, Value};
use tracing::info;

fn schema() -> SchemaRegistry {
    SchemaRegistry::new(&[
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
    ])
}

fn todos() -> Vec<Value> {
    vec![
        json!({ "id": "1", "label": "Write the schema", "created": 1_514_764_800_000_i64, "completed": 1_514_772_000_000_i64 }),
        json!({ "id": "2", "label": "Add mods", "created": 1_514_937_600_000_i64 }),
    ]
}

fn service() -> MemoryService {
    MemoryService::new("todo.TodoService", schema())
        .unary("GetTodo", "TodoRequest", "Todo", |request, _| async move {
            todos()
                .into_iter()
                .find(|todo| todo["id"] == request["id"])
                .ok_or_else(|| Status::not_found("todo not found"))
        })
        .server_streaming("ListTodos", "Empty", "Todo", |_, _, sink| async move {
            for todo in todos() {
                sink.send(todo)?;
            }
            Ok::<(), Status>(())
        })
}

/// Flags todos that are still open.
fn mark_open(mut todo: Value, _: Option<rpcmod_client::SchemaNode<'_>>) -> Result<Value, ModError> {
    if let Value::Object(fields) = &mut todo {
        let open = !fields.contains_key("completed");
        fields.insert("open".to_string(), json!(open));
    }
    Ok(todo)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(LogFormat::Text)?;

    let client = ModClient::builder()
        .client(service().into_client())
        .schema(schema())
        .config(
            ModConfig::default()
                .no_defaults(true)
                .enforce_number(true)
                .no_nil_props(true)
                .with_named_mod("markOpen", mark_open),
        )
        .build()?;

    let todo = client.unary("GetTodo", json!({ "id": "1" })).await?;
    info!("GetTodo -> {}", todo);

    let mut stream = client.server_stream("ListTodos", json!({}))?;
    while let Some(todo) = stream.next().await {
        info!("ListTodos -> {}", todo?);
    }

    match client.unary("GetTodo", json!({ "id": "404" })).await {
        Ok(todo) => info!("Unexpected todo: {}", todo),
        Err(e) => info!("GetTodo failed as expected: {}", e),
    }

    Ok(())
}
