//! Built-in workers the local platform can run for a node's `worker` field.

use crate::engine::InvocationContext;
use crate::traits::{Worker, WorkerFailure, WorkerInput, WorkerOutput};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Factory for the built-in workers.
pub struct BuiltinWorkerFactory;

impl BuiltinWorkerFactory {
    /// Create a worker by name
    ///
    /// - "passthrough" -> PassthroughWorker
    /// - "split_words" -> SplitWordsWorker
    /// - "uppercase" -> UppercaseWorker
    /// - "count" -> CountWorker
    /// - "fail" -> FailWorker
    /// - "request_json" -> RequestJsonWorker
    pub fn create_worker(name: &str) -> Result<Arc<dyn Worker>, String> {
        match name {
            "passthrough" => Ok(Arc::new(PassthroughWorker)),
            "split_words" => Ok(Arc::new(SplitWordsWorker)),
            "uppercase" => Ok(Arc::new(UppercaseWorker)),
            "count" => Ok(Arc::new(CountWorker)),
            "fail" => Ok(Arc::new(FailWorker)),
            "request_json" => Ok(Arc::new(RequestJsonWorker)),
            _ => Err(format!("Unknown built-in worker: '{}'", name)),
        }
    }

    pub fn list_available_workers() -> Vec<&'static str> {
        vec![
            "passthrough",
            "split_words",
            "uppercase",
            "count",
            "fail",
            "request_json",
        ]
    }

    pub fn is_worker_available(name: &str) -> bool {
        Self::list_available_workers().contains(&name)
    }
}

/// Returns its input unchanged.
pub struct PassthroughWorker;

#[async_trait]
impl Worker for PassthroughWorker {
    async fn run(
        &self,
        input: WorkerInput,
        _ctx: &InvocationContext,
    ) -> Result<WorkerOutput, WorkerFailure> {
        Ok(WorkerOutput {
            value: input.payload,
            backpack: input.backpack,
        })
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

/// Splits a string into a list of words.
pub struct SplitWordsWorker;

#[async_trait]
impl Worker for SplitWordsWorker {
    async fn run(
        &self,
        input: WorkerInput,
        _ctx: &InvocationContext,
    ) -> Result<WorkerOutput, WorkerFailure> {
        let Value::String(text) = &input.payload else {
            return Err(WorkerFailure::new("split_words expects a string"));
        };
        let words = text
            .split_whitespace()
            .map(|word| Value::String(word.to_string()))
            .collect();
        Ok(WorkerOutput {
            value: Value::Array(words),
            backpack: input.backpack,
        })
    }

    fn name(&self) -> &str {
        "split_words"
    }
}

/// Uppercases every string in the input, recursing into lists and objects.
pub struct UppercaseWorker;

fn uppercase(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.to_uppercase()),
        Value::Array(items) => Value::Array(items.into_iter().map(uppercase).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, uppercase(v))).collect()),
        other => other,
    }
}

#[async_trait]
impl Worker for UppercaseWorker {
    async fn run(
        &self,
        input: WorkerInput,
        _ctx: &InvocationContext,
    ) -> Result<WorkerOutput, WorkerFailure> {
        Ok(WorkerOutput {
            value: uppercase(input.payload),
            backpack: input.backpack,
        })
    }

    fn name(&self) -> &str {
        "uppercase"
    }
}

/// Length of a list, string or object.
pub struct CountWorker;

#[async_trait]
impl Worker for CountWorker {
    async fn run(
        &self,
        input: WorkerInput,
        _ctx: &InvocationContext,
    ) -> Result<WorkerOutput, WorkerFailure> {
        let count = match &input.payload {
            Value::Array(items) => items.len(),
            Value::String(text) => text.chars().count(),
            Value::Object(map) => map.len(),
            other => {
                return Err(WorkerFailure::new(format!("count cannot measure {}", other)));
            }
        };
        Ok(WorkerOutput {
            value: Value::from(count),
            backpack: input.backpack,
        })
    }

    fn name(&self) -> &str {
        "count"
    }
}

/// Always fails, keeping the backpack it was given.
pub struct FailWorker;

#[async_trait]
impl Worker for FailWorker {
    async fn run(
        &self,
        input: WorkerInput,
        _ctx: &InvocationContext,
    ) -> Result<WorkerOutput, WorkerFailure> {
        Err(WorkerFailure {
            message: format!("fail worker rejected {}", input.payload),
            backpack: Some(input.backpack),
        })
    }

    fn name(&self) -> &str {
        "fail"
    }
}

/// Pulls the parsed JSON body out of an API endpoint's request.
pub struct RequestJsonWorker;

#[async_trait]
impl Worker for RequestJsonWorker {
    async fn run(
        &self,
        input: WorkerInput,
        _ctx: &InvocationContext,
    ) -> Result<WorkerOutput, WorkerFailure> {
        match input.payload.get("json") {
            Some(body) if !body.is_null() => Ok(WorkerOutput {
                value: body.clone(),
                backpack: input.backpack,
            }),
            _ => Err(WorkerFailure::new("request has no JSON body")),
        }
    }

    fn name(&self) -> &str {
        "request_json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Backpack;
    use serde_json::json;
    use std::time::Duration;

    async fn run(name: &str, payload: Value) -> Result<Value, WorkerFailure> {
        let worker = BuiltinWorkerFactory::create_worker(name).unwrap();
        let ctx = InvocationContext::new("test", Duration::from_secs(30), 512);
        worker
            .run(
                WorkerInput {
                    payload,
                    backpack: Backpack::new(),
                },
                &ctx,
            )
            .await
            .map(|output| output.value)
    }

    #[tokio::test]
    async fn test_text_workers() {
        let test_cases = vec![
            ("passthrough", json!({"a": 1}), json!({"a": 1})),
            ("split_words", json!("the quick  fox"), json!(["the", "quick", "fox"])),
            ("uppercase", json!(["ab", {"k": "cd"}, 3]), json!(["AB", {"k": "CD"}, 3])),
            ("count", json!([1, 2, 3]), json!(3)),
            ("count", json!("héllo"), json!(5)),
            ("request_json", json!({"raw_body": "{}", "json": {"a": 1}}), json!({"a": 1})),
        ];

        for (name, input, expected) in test_cases {
            assert_eq!(run(name, input).await.unwrap(), expected, "worker {}", name);
        }
    }

    #[tokio::test]
    async fn test_type_mismatches_are_worker_failures() {
        assert!(run("split_words", json!(42)).await.is_err());
        assert!(run("count", json!(null)).await.is_err());
        assert!(run("request_json", json!({"json": null})).await.is_err());
        let failure = run("fail", json!("x")).await.unwrap_err();
        assert!(failure.message.contains("\"x\""));
    }

    #[test]
    fn test_factory_lists_every_worker() {
        for name in BuiltinWorkerFactory::list_available_workers() {
            assert!(BuiltinWorkerFactory::create_worker(name).is_ok());
        }
        assert!(!BuiltinWorkerFactory::is_worker_available("nope"));
        assert!(BuiltinWorkerFactory::create_worker("nope").is_err());
    }
}
