// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Synchronous API endpoints.
//!
//! An endpoint node turns the inbound HTTP request into the pipeline's first
//! value, dispatches its transitions, then polls the coordination store for
//! whatever an `api_response` edge leaves under the execution id. Polling is
//! the coordinator's only blocking wait and stops a safety margin short of
//! the invocation deadline.

use super::context::InvocationContext;
use super::keys;
use crate::errors::{CoordinatorError, DecodeError};
use crate::observability::messages::scaling::ApiResponseTimedOut;
use crate::observability::messages::StructuredLog;
use crate::traits::CoordinationStore;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::time::Instant;

const SERVER_HEADER: &str = "switchyard";

const TIMEOUT_BODY: &str = r#"{"msg":"The request to the backend has timed out.","success":false}"#;

const EXCEPTION_MESSAGE: &str = "An exception occurred while computing the response to the request. Please see the block execution logs for more information.";

/// Adds `raw_body`, `json` and `form` views of the request body.
pub fn enrich_request(request: Value) -> Value {
    let mut request = match request {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("body".to_string(), other);
            map
        }
    };

    let raw_body = match request.get("body") {
        Some(Value::String(body)) => {
            let encoded = request
                .get("isBase64Encoded")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if encoded {
                STANDARD
                    .decode(body)
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                    .unwrap_or_else(|_| body.clone())
            } else {
                body.clone()
            }
        }
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    let parsed = serde_json::from_str::<Value>(&raw_body).ok();
    let form = match &parsed {
        Some(_) => Value::Null,
        None => parse_form(&raw_body),
    };

    request.insert("raw_body".to_string(), Value::String(raw_body));
    request.insert("json".to_string(), parsed.unwrap_or(Value::Null));
    request.insert("form".to_string(), form);
    Value::Object(request)
}

/// `a=1&a=2&b=x+y` becomes `{"a": ["1", "2"], "b": ["x y"]}`. Null when
/// nothing parses as a pair.
fn parse_form(body: &str) -> Value {
    let mut form: Map<String, Value> = Map::new();
    for pair in body.split('&').filter(|p| !p.is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let (Ok(key), Ok(value)) = (
            urlencoding::decode(&key.replace('+', " ")).map(|k| k.into_owned()),
            urlencoding::decode(&value.replace('+', " ")).map(|v| v.into_owned()),
        ) else {
            continue;
        };
        if let Value::Array(values) = form
            .entry(key)
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            values.push(Value::String(value));
        }
    }
    if form.is_empty() {
        Value::Null
    } else {
        Value::Object(form)
    }
}

/// What a failing node leaves for the poller when it has an API-response edge.
pub fn exception_body() -> Value {
    json!({"success": false, "msg": EXCEPTION_MESSAGE})
}

pub fn timeout_response() -> Value {
    json!({
        "statusCode": 504,
        "headers": {},
        "body": TIMEOUT_BODY,
        "isBase64Encoded": false,
    })
}

/// An object that already carries `body` is a complete HTTP response.
/// Anything else becomes a JSON 200.
pub fn shape_response(value: Value) -> Value {
    if value.get("body").is_some() {
        return value;
    }
    json!({
        "statusCode": 200,
        "headers": {
            "Content-Type": "application/json",
            "X-Frame-Options": "deny",
            "X-Content-Type-Options": "nosniff",
            "X-XSS-Protection": "1; mode=block",
            "Cache-Control": "no-cache, no-store, must-revalidate",
            "Pragma": "no-cache",
            "Expires": "0",
            "Server": SERVER_HEADER,
        },
        "body": value.to_string(),
        "isBase64Encoded": false,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub safety_margin: Duration,
}

/// Waits for the execution's response, or returns the timeout response once
/// less than the safety margin remains.
pub async fn await_response(
    store: &dyn CoordinationStore,
    execution_id: &str,
    settings: PollSettings,
    ctx: &InvocationContext,
) -> Result<Value, CoordinatorError> {
    let key = keys::api_response(execution_id);
    let started = Instant::now();

    while ctx.remaining_time() > settings.safety_margin {
        if let Some(raw) = store.get_and_delete(&key).await? {
            let value = serde_json::from_str(&raw).map_err(|e| DecodeError::CorruptIndirect {
                key: key.clone(),
                reason: e.to_string(),
            })?;
            return Ok(shape_response(value));
        }
        tokio::time::sleep(settings.interval).await;
    }

    ApiResponseTimedOut {
        execution_id,
        waited: started.elapsed(),
    }
    .log();
    Ok(timeout_response())
}
