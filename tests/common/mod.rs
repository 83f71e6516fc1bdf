use serde_json::Value;
use sessiondb::{DbConfig, Document};

/// Build a document literal from a `serde_json::json!` object.
pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected a JSON object"),
    }
}

/// Facade configuration over the in-memory engine with caching enabled.
pub fn memory_config() -> DbConfig {
    DbConfig::in_memory()
}
