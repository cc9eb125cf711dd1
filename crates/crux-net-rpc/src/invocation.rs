//! Request and response messages of the remote key protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crux_net_secure::{MessageSchema, ProtocolMessage, Schema, UUID_STR_LEN};

use crate::error::{Result, RpcError};
use crate::method::KeyMethod;

/// Message type of an invocation request.
pub const KEY_MANAGER_REQUEST: &str = "KEY_MANAGER_REQUEST";

/// Message type of an invocation response.
pub const KEY_MANAGER_RESPONSE: &str = "KEY_MANAGER_RESPONSE";

/// A request to run one key manager method on the remote holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    pub invocation_id: Uuid,
    pub method: KeyMethod,
    pub args: Vec<Value>,
}

impl Invocation {
    /// A fresh invocation with a random id.
    pub fn new(method: KeyMethod, args: Vec<Value>) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            method,
            args,
        }
    }

    pub fn to_message(&self) -> Result<ProtocolMessage> {
        let content = serde_json::to_value(self)
            .map_err(|e| RpcError::MalformedRequest(e.to_string()))?;
        Ok(ProtocolMessage::new(KEY_MANAGER_REQUEST, content))
    }
}

/// The answer to one [`Invocation`].
///
/// Peers may carry the value under `result` or `data`. `error` is set when
/// the holder refused or failed the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub invocation_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvocationResult {
    pub fn success(invocation_id: Uuid, result: Value) -> Self {
        Self {
            invocation_id,
            result: Some(result),
            data: None,
            error: None,
        }
    }

    pub fn failure(invocation_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            invocation_id,
            result: None,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn from_content(content: Value) -> Result<Self> {
        serde_json::from_value(content).map_err(|e| RpcError::MalformedResult(e.to_string()))
    }

    pub fn to_message(&self) -> Result<ProtocolMessage> {
        let content =
            serde_json::to_value(self).map_err(|e| RpcError::MalformedResult(e.to_string()))?;
        Ok(ProtocolMessage::new(KEY_MANAGER_RESPONSE, content))
    }

    /// The value, or the remote error.
    pub fn into_outcome(self) -> Result<Value> {
        if let Some(error) = self.error {
            return Err(RpcError::Remote(error));
        }
        self.result
            .or(self.data)
            .ok_or_else(|| RpcError::MalformedResult("response carries no result".into()))
    }
}

/// `{method: enum, args: array, invocationId: string(36)}`.
pub fn key_manager_request_schema() -> MessageSchema {
    MessageSchema::new(
        KEY_MANAGER_REQUEST,
        Schema::object()
            .required(
                "method",
                Schema::enumeration(KeyMethod::ALL.iter().map(KeyMethod::as_str)),
            )
            .required("args", Schema::Array(None))
            .required("invocationId", Schema::string_len(UUID_STR_LEN)),
    )
}

/// `{invocationId: string(36), result|data|error}`.
pub fn key_manager_response_schema() -> MessageSchema {
    MessageSchema::new(
        KEY_MANAGER_RESPONSE,
        Schema::object()
            .required("invocationId", Schema::string_len(UUID_STR_LEN))
            .optional("result", Schema::Any)
            .optional("data", Schema::Any)
            .optional("error", Schema::string())
            .any_of(&["result", "data", "error"]),
    )
}

/// Both schemas of the remote key protocol.
pub fn rpc_schemas() -> Vec<MessageSchema> {
    vec![key_manager_request_schema(), key_manager_response_schema()]
}
