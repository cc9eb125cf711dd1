//! Pluggable per-protocol validation.

use crux_net_secure::Schema;
use serde_json::Value;

/// Names a gateway protocol and decides which messages belong to it.
pub trait ProtocolHandler: Send + Sync {
    /// Protocol name; also part of the channel topic.
    fn name(&self) -> &str;

    fn validate_message(&self, message: &Value) -> bool;
}

/// A handler backed by a [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaHandler {
    name: String,
    schema: Schema,
}

impl SchemaHandler {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

impl ProtocolHandler for SchemaHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate_message(&self, message: &Value) -> bool {
        match self.schema.validate(message) {
            Ok(()) => true,
            Err(violation) => {
                tracing::debug!(protocol = %self.name, %violation, "gateway message rejected");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_handler() {
        let handler = SchemaHandler::new(
            "chat",
            Schema::object().required("text", Schema::string()),
        );
        assert_eq!(handler.name(), "chat");
        assert!(handler.validate_message(&json!({"text": "hi"})));
        assert!(!handler.validate_message(&json!({"text": 1})));
        assert!(!handler.validate_message(&json!({"text": "hi", "x": 1})));
    }
}
