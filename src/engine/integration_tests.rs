/// End-to-end runs of whole graphs on the local platform
#[cfg(test)]
mod tests {
    use crate::backends::local::{DeliveryKind, LocalPlatform};
    use crate::backends::memory::MemoryStore;
    use crate::backends::stub::FnWorker;
    use crate::config::{load_and_validate_config, Config};
    use crate::engine::HopOutcome;
    use crate::traits::CoordinationStore;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn config(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    /// A worker that records every payload it sees and passes it on.
    fn capture() -> (Arc<Mutex<Vec<Value>>>, Arc<FnWorker<impl Fn(Value) -> Value + Send + Sync>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let worker = FnWorker::new(move |value: Value| {
            sink.lock().unwrap().push(value.clone());
            value
        });
        (seen, Arc::new(worker))
    }

    #[tokio::test]
    async fn test_fan_out_fan_in_fires_once_and_cleans_up() {
        let store = Arc::new(MemoryStore::new());
        let (seen, tally) = capture();
        let platform = LocalPlatform::builder(load_and_validate_config("configs/fan-out-fan-in.yaml").unwrap())
            .store(store.clone())
            .worker("tally", tally)
            .build()
            .await
            .unwrap();

        platform.start("split", json!("alpha beta gamma")).await.unwrap();
        platform.run_until_idle().await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1, "fan-in must fire exactly once");
        let mut words: Vec<String> = seen[0]
            .as_array()
            .unwrap()
            .iter()
            .map(|w| w.as_str().unwrap().to_string())
            .collect();
        words.sort();
        assert_eq!(words, vec!["ALPHA", "BETA", "GAMMA"]);
        assert!(store.is_empty(), "join state should be consumed");
    }

    #[tokio::test]
    async fn test_fan_in_merges_item_backpacks() {
        let store = Arc::new(MemoryStore::new());
        let platform = LocalPlatform::builder(config(
            r#"
nodes:
  - id: split
    transitions:
      - type: fan_out
        target: { node: each }
  - id: each
    transitions:
      - type: fan_in
        target: { node: done }
  - id: done
    transitions:
      - type: then
        target: { node: sink }
  - id: sink
"#,
        ))
        .store(store.clone())
        .worker(
            "each",
            Arc::new(crate::backends::stub::BackpackWorker::new("visited", json!(true))),
        )
        .build()
        .await
        .unwrap();

        platform
            .invoke("split", json!({"payload": [{"v": 1}, {"v": 2}, {"v": 3}], "backpack": {"run": 7}}))
            .await
            .unwrap();
        platform.run_until_idle().await;

        let to_sink: Vec<Value> = platform
            .deliveries()
            .await
            .into_iter()
            .filter(|d| d.target == "sink")
            .map(|d| d.payload)
            .collect();
        assert_eq!(to_sink.len(), 1);
        assert_eq!(to_sink[0]["backpack"], json!({"run": 7, "visited": true}));
        assert_eq!(to_sink[0]["fan_out_ids"], json!([]));
        let mut results = to_sink[0]["payload"].as_array().unwrap().clone();
        results.sort_by_key(|r| r["v"].as_i64());
        assert_eq!(results, vec![json!({"v": 1}), json!({"v": 2}), json!({"v": 3})]);
        assert!(store.is_empty(), "join counter and result list should be gone");
    }

    #[tokio::test]
    async fn test_many_spawners_share_one_fan_out() {
        let store = Arc::new(MemoryStore::new());
        let (seen, sink) = capture();
        let platform = LocalPlatform::builder(config(
            r#"
nodes:
  - id: split
    memory_mb: 128
    transitions:
      - type: fan_out
        target: { node: each }
  - id: each
    transitions:
      - type: fan_in
        target: { node: sink }
  - id: sink
"#,
        ))
        .store(store.clone())
        .worker("sink", sink)
        .build()
        .await
        .unwrap();

        let items: Vec<Value> = (0..200).map(|i| json!(i)).collect();
        platform.start("split", Value::Array(items)).await.unwrap();
        platform.run_until_idle().await;

        let spawners = platform
            .deliveries()
            .await
            .iter()
            .filter(|d| d.target == "split" && d.payload["control"].get("spawner").is_some())
            .count();
        assert!(spawners > 1, "expected several spawners, got {}", spawners);

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1, "fan-in must fire exactly once");
        let mut results: Vec<i64> = seen[0]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_i64().unwrap())
            .collect();
        results.sort();
        assert_eq!(results, (0..200).collect::<Vec<_>>());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_merge_diamond_joins_both_branches() {
        let (seen, join) = capture();
        let platform = LocalPlatform::builder(load_and_validate_config("configs/merge-diamond.yaml").unwrap())
            .worker("join", join)
            .build()
            .await
            .unwrap();

        platform.start("start", json!("hey")).await.unwrap();
        platform.run_until_idle().await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        let results = seen[0].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.contains(&json!("HEY")));
        assert!(results.contains(&json!(3)));
    }

    #[tokio::test]
    async fn test_merge_branch_is_closed_after_join() {
        let platform = LocalPlatform::builder(config(
            r#"
nodes:
  - id: start
    transitions:
      - type: then
        target: { node: a }
      - type: then
        target: { node: b }
  - id: a
    transitions:
      - type: merge
        target: { node: join }
        siblings: [a, b]
  - id: b
    transitions:
      - type: merge
        target: { node: join }
        siblings: [a, b]
  - id: join
"#,
        ))
        .build()
        .await
        .unwrap();

        platform
            .invoke("start", json!({"execution_id": "e1", "payload": 1}))
            .await
            .unwrap();
        platform.run_until_idle().await;

        let deliveries = platform.deliveries().await;
        let opened = &deliveries.iter().find(|d| d.target == "a").unwrap().payload;
        assert_eq!(opened["branch_ids"].as_array().unwrap().len(), 1);

        let joined: Vec<&Value> = deliveries
            .iter()
            .filter(|d| d.target == "join")
            .map(|d| &d.payload)
            .collect();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0]["branch_ids"], json!([]));
        assert_eq!(joined[0]["execution_id"], "e1");
    }

    #[tokio::test]
    async fn test_warmup_chain_reaches_requested_depth() {
        let platform = LocalPlatform::builder(config("nodes:\n  - id: warm\n"))
            .build()
            .await
            .unwrap();

        let outcome = platform
            .invoke("warm", json!({"control": {"warmup": 5}}))
            .await
            .unwrap();

        assert_eq!(outcome, HopOutcome::Acknowledged);
        let relayed: Vec<i64> = platform
            .deliveries()
            .await
            .iter()
            .filter(|d| d.kind == DeliveryKind::Sync)
            .map(|d| d.payload["control"]["warmup"].as_i64().unwrap())
            .collect();
        // The first invocation plus four relays.
        assert_eq!(relayed, vec![4, 3, 2, 1]);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let platform = LocalPlatform::builder(config(
            "nodes:\n  - id: a\n    transitions:\n      - type: then\n        target: { node: b }\n  - id: b\n",
        ))
        .store(store.clone())
        .build()
        .await
        .unwrap();
        store
            .set_with_ttl("payload:dup", "{\"big\": true}", Duration::from_secs(60))
            .await
            .unwrap();
        let delivery = json!({
            "execution_id": "e1",
            "payload": {"indirect": {"key": "payload:dup", "kind": "single"}}
        });

        let first = platform.invoke("a", delivery.clone()).await.unwrap();
        let second = platform.invoke("a", delivery).await.unwrap();
        platform.run_until_idle().await;

        assert!(matches!(first, HopOutcome::Dispatched(_)));
        assert_eq!(second, HopOutcome::Acknowledged);
        let to_b: Vec<_> = platform
            .deliveries()
            .await
            .into_iter()
            .filter(|d| d.target == "b")
            .collect();
        assert_eq!(to_b.len(), 1);
        assert_eq!(to_b[0].payload["payload"], json!({"big": true}));
    }

    #[tokio::test]
    async fn test_api_endpoint_round_trip() {
        let platform = LocalPlatform::builder(load_and_validate_config("configs/api-echo.yaml").unwrap())
            .build()
            .await
            .unwrap();

        let outcome = platform
            .start("api", json!({"httpMethod": "POST", "body": "{\"name\": \"ada\"}"}))
            .await
            .unwrap();

        let response = match outcome {
            HopOutcome::Response(response) => response,
            other => panic!("expected an HTTP response, got {:?}", other),
        };
        assert_eq!(response["statusCode"], 200);
        assert_eq!(response["headers"]["Server"], "switchyard");
        let body: Value = serde_json::from_str(response["body"].as_str().unwrap()).unwrap();
        assert_eq!(body, json!({"name": "ADA"}));
    }

    #[tokio::test]
    async fn test_api_endpoint_answers_failures_with_error_body() {
        let platform = LocalPlatform::builder(config(
            r#"
coordinator:
  api_poll_interval_ms: 5
nodes:
  - id: api
    mode: api_endpoint
    timeout_seconds: 10
    transitions:
      - type: then
        target: { node: broken }
  - id: broken
    worker: fail
    transitions:
      - type: then
        target: api_response
"#,
        ))
        .build()
        .await
        .unwrap();

        let response = platform
            .start("api", json!({"body": ""}))
            .await
            .unwrap()
            .into_response()
            .unwrap();

        let body: Value = serde_json::from_str(response["body"].as_str().unwrap()).unwrap();
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_queue_edge_reaches_consumer() {
        let (seen, reviewer) = capture();
        let platform = LocalPlatform::builder(load_and_validate_config("configs/routing.yaml").unwrap())
            .worker("reviewer", reviewer)
            .build()
            .await
            .unwrap();

        platform
            .invoke("measure", json!({"payload": [1, 2, 3, 4, 5], "backpack": {"who": "qa"}}))
            .await
            .unwrap();
        platform.run_until_idle().await;

        assert_eq!(seen.lock().unwrap().clone(), vec![json!([5])]);
        let batches: Vec<_> = platform
            .deliveries()
            .await
            .into_iter()
            .filter(|d| d.kind == DeliveryKind::QueueBatch)
            .collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].target, "review");
    }

    #[tokio::test]
    async fn test_else_branch_failure_reaches_default_handler() {
        let (seen, alert) = capture();
        let platform = LocalPlatform::builder(load_and_validate_config("configs/routing.yaml").unwrap())
            .worker("alert", alert)
            .build()
            .await
            .unwrap();

        platform.start("measure", json!("ab")).await.unwrap();
        platform.run_until_idle().await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["version"], "1.0.0");
        assert_eq!(seen[0]["input_data"], json!(2));
        assert!(seen[0]["exception_text"].as_str().unwrap().contains("fail worker"));
    }
}
