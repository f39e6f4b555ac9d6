//! Typed view over JSON-RPC 2.0 payloads.
//!
//! A raw payload is classified exactly once, at parse time, into one of three
//! shapes:
//!
//! | `method` | `id` | Classification |
//! |----------|------|----------------|
//! | present  | present | [`Request`] (server → client) |
//! | absent   | present | [`Response`] |
//! | present  | absent  | [`Notification`] |
//!
//! A payload with neither field (or with `"id": null` and no method) cannot be
//! routed anywhere and is rejected with [`MessageError::Unclassifiable`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use super::capabilities::{error_codes, JSONRPC_VERSION};

/// JSON-RPC request identifier. Servers may use either integers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer identifier (what this client allocates).
    Number(i64),
    /// String identifier (accepted from servers and callers).
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::String(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self::String(id)
    }
}

impl RequestId {
    fn from_value(value: &Value) -> Result<Option<Self>, MessageError> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_i64()
                .map(|n| Some(Self::Number(n)))
                .ok_or_else(|| MessageError::InvalidId(value.to_string())),
            Value::String(s) => Ok(Some(Self::String(s.clone()))),
            other => Err(MessageError::InvalidId(other.to_string())),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::from(*n),
            Self::String(s) => Value::from(s.as_str()),
        }
    }
}

/// The `error` object of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseError {
    /// Standard `-32601` reply for server requests this client does not handle.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: error_codes::METHOD_NOT_FOUND,
            message: format!("method not found: {method}"),
            data: None,
        }
    }
}

/// A request carrying an id that expects a response.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation id.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Parameters, if any.
    pub params: Option<Value>,
}

/// A response to an earlier request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Id of the request being answered.
    pub id: RequestId,
    /// Success payload. `None` is read as JSON `null`.
    pub result: Option<Value>,
    /// Failure payload. Takes precedence over `result` when both are present.
    pub error: Option<ResponseError>,
}

impl Response {
    /// Collapse into the outcome a waiting caller sees.
    ///
    /// # Errors
    ///
    /// Returns the protocol-level error object when the server reported one.
    pub fn into_outcome(self) -> Result<Value, ResponseError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// A fire-and-forget message.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Method name.
    pub method: String,
    /// Parameters, if any.
    pub params: Option<Value>,
}

/// A classified JSON-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `method` and `id` both present.
    Request(Request),
    /// `id` present, `method` absent.
    Response(Response),
    /// `method` present, `id` absent.
    Notification(Notification),
}

/// Reasons a decoded JSON value is not a usable JSON-RPC message.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The payload was not a JSON object.
    #[error("JSON-RPC payload is not an object")]
    NotAnObject,

    /// The `id` field had an unsupported type.
    #[error("invalid JSON-RPC id: {0}")]
    InvalidId(String),

    /// The `method` field was not a string.
    #[error("JSON-RPC method is not a string")]
    InvalidMethod,

    /// The `error` field did not match the error-object shape.
    #[error("invalid JSON-RPC error object: {0}")]
    InvalidError(#[source] serde_json::Error),

    /// Neither a usable `id` nor a `method` was present.
    #[error("JSON-RPC payload has neither id nor method")]
    Unclassifiable,
}

impl Message {
    /// Build an outgoing request.
    #[must_use]
    pub fn request(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Request(Request {
            id,
            method: method.into(),
            params,
        })
    }

    /// Build an outgoing notification.
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification(Notification {
            method: method.into(),
            params,
        })
    }

    /// Build a successful response.
    #[must_use]
    pub fn response_ok(id: RequestId, result: Value) -> Self {
        Self::Response(Response {
            id,
            result: Some(result),
            error: None,
        })
    }

    /// Build an error response.
    #[must_use]
    pub fn response_err(id: RequestId, error: ResponseError) -> Self {
        Self::Response(Response {
            id,
            result: None,
            error: Some(error),
        })
    }

    /// The method name, for requests and notifications.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Response(_) => None,
        }
    }

    /// The id, for requests and responses.
    #[must_use]
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(r) => Some(&r.id),
            Self::Response(r) => Some(&r.id),
            Self::Notification(_) => None,
        }
    }

    /// Classify a decoded JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError`] when the value is not an object, carries
    /// mistyped fields, or matches no classification.
    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        let Value::Object(mut map) = value else {
            return Err(MessageError::NotAnObject);
        };

        let id = match map.get("id") {
            Some(raw) => RequestId::from_value(raw)?,
            None => None,
        };
        let method = match map.remove("method") {
            Some(Value::String(method)) => Some(method),
            Some(_) => return Err(MessageError::InvalidMethod),
            None => None,
        };
        let params = map.remove("params");

        match (method, id) {
            (Some(method), Some(id)) => Ok(Self::Request(Request { id, method, params })),
            (Some(method), None) => Ok(Self::Notification(Notification { method, params })),
            (None, Some(id)) => {
                let error = match map.remove("error") {
                    None | Some(Value::Null) => None,
                    Some(raw) => {
                        Some(serde_json::from_value(raw).map_err(MessageError::InvalidError)?)
                    }
                };
                Ok(Self::Response(Response {
                    id,
                    result: map.remove("result"),
                    error,
                }))
            }
            (None, None) => Err(MessageError::Unclassifiable),
        }
    }

    /// Render as a JSON-RPC 2.0 envelope.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("jsonrpc".into(), json!(JSONRPC_VERSION));
        match self {
            Self::Request(r) => {
                map.insert("id".into(), r.id.to_value());
                map.insert("method".into(), json!(r.method));
                if let Some(params) = &r.params {
                    map.insert("params".into(), params.clone());
                }
            }
            Self::Notification(n) => {
                map.insert("method".into(), json!(n.method));
                if let Some(params) = &n.params {
                    map.insert("params".into(), params.clone());
                }
            }
            Self::Response(r) => {
                map.insert("id".into(), r.id.to_value());
                if let Some(error) = &r.error {
                    map.insert(
                        "error".into(),
                        serde_json::to_value(error).unwrap_or(Value::Null),
                    );
                } else {
                    map.insert("result".into(), r.result.clone().unwrap_or(Value::Null));
                }
            }
        }
        Value::Object(map)
    }
}
