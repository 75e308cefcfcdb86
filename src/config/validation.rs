//! Graph validation run once at load time.
//!
//! Checks, in order:
//!
//! 1. **Uniqueness**: node ids are unique
//! 2. **References**: every edge target resolves (nodes exist, topics and
//!    queues are declared), node targets are worker nodes rather than API
//!    endpoints, join edges target nodes, merge sibling sets are non-empty
//!    and name real nodes
//! 3. **Default handler**: the graph-wide exception handler resolves
//!
//! All errors are collected rather than stopping at the first. Graphs are
//! allowed to contain cycles; a node may legitimately re-invoke an earlier
//! one.
//!
//! Merge siblings that never declare a matching merge edge are reported as a
//! warning, since that barrier can never fire.

use crate::config::transitions::{Edge, Target};
use crate::config::{Config, NodeMode};
use crate::errors::ValidationError;
use crate::observability::messages::validation::MergeSiblingNeverArrives;
use crate::observability::messages::StructuredLog;
use std::collections::HashSet;

pub fn validate_graph(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for node in &config.nodes {
        if !seen.insert(node.id.as_str()) {
            errors.push(ValidationError::DuplicateNodeId {
                node_id: node.id.clone(),
            });
        }
    }

    for node in &config.nodes {
        for edge in &node.transitions {
            check_target(config, &seen, &node.id, edge.target(), &mut errors);

            match edge {
                Edge::FanOut { target } | Edge::FanIn { target } => {
                    if target.node_id().is_none() {
                        errors.push(ValidationError::JoinTargetNotNode {
                            node_id: node.id.clone(),
                            edge: edge.kind(),
                        });
                    }
                }
                Edge::Merge { target, siblings } => {
                    if target.node_id().is_none() {
                        errors.push(ValidationError::JoinTargetNotNode {
                            node_id: node.id.clone(),
                            edge: edge.kind(),
                        });
                    }
                    check_merge_siblings(config, &seen, &node.id, target, siblings, &mut errors);
                }
                Edge::Then { .. } | Edge::If { .. } | Edge::Else { .. } | Edge::Exception { .. } => {}
            }
        }
    }

    if let Some(handler) = &config.default_exception_handler {
        check_worker_target(config, "default_exception_handler", handler, &mut errors);
        let resolves = match handler {
            Target::Node(id) => seen.contains(id.as_str()),
            Target::Topic(topic) => config.topics.contains_key(topic),
            Target::Queue(queue) => config.queues.contains_key(queue),
            Target::ApiResponse => true,
        };
        if !resolves {
            errors.push(ValidationError::UnknownExceptionHandler {
                target: handler.label(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_target(
    config: &Config,
    nodes: &HashSet<&str>,
    node_id: &str,
    target: &Target,
    errors: &mut Vec<ValidationError>,
) {
    match target {
        Target::Node(id) if !nodes.contains(id.as_str()) => {
            errors.push(ValidationError::UnknownNode {
                node_id: node_id.to_string(),
                target: id.clone(),
            });
        }
        Target::Node(_) => check_worker_target(config, node_id, target, errors),
        Target::Topic(topic) if !config.topics.contains_key(topic) => {
            errors.push(ValidationError::UnknownTopic {
                node_id: node_id.to_string(),
                topic: topic.clone(),
            });
        }
        Target::Queue(queue) if !config.queues.contains_key(queue) => {
            errors.push(ValidationError::UnknownQueue {
                node_id: node_id.to_string(),
                queue: queue.clone(),
            });
        }
        _ => {}
    }
}

/// Inbound invocations of an API endpoint are treated as fresh HTTP requests.
fn check_worker_target(
    config: &Config,
    node_id: &str,
    target: &Target,
    errors: &mut Vec<ValidationError>,
) {
    let Some(id) = target.node_id() else {
        return;
    };
    if config.node(id).map(|n| n.mode) == Some(NodeMode::ApiEndpoint) {
        errors.push(ValidationError::TargetIsApiEndpoint {
            node_id: node_id.to_string(),
            target: id.to_string(),
        });
    }
}

fn check_merge_siblings(
    config: &Config,
    nodes: &HashSet<&str>,
    node_id: &str,
    target: &Target,
    siblings: &[String],
    errors: &mut Vec<ValidationError>,
) {
    if siblings.is_empty() {
        errors.push(ValidationError::InvalidMergeSiblings {
            node_id: node_id.to_string(),
            reason: "sibling set is empty".to_string(),
        });
        return;
    }
    if !siblings.iter().any(|s| s == node_id) {
        errors.push(ValidationError::InvalidMergeSiblings {
            node_id: node_id.to_string(),
            reason: "sibling set must include the declaring node".to_string(),
        });
    }
    for sibling in siblings {
        if !nodes.contains(sibling.as_str()) {
            errors.push(ValidationError::InvalidMergeSiblings {
                node_id: node_id.to_string(),
                reason: format!("unknown sibling '{}'", sibling),
            });
            continue;
        }
        let declares_merge = config.node(sibling).map_or(false, |n| {
            n.transitions
                .iter()
                .any(|e| matches!(e, Edge::Merge { target: t, .. } if t == target))
        });
        if !declares_merge {
            MergeSiblingNeverArrives {
                node_id,
                sibling,
                target: &target.label(),
            }
            .log();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_valid_merge_graph() {
        let cfg = config(
            r#"
nodes:
  - id: a
    transitions:
      - { type: then, target: { node: b } }
      - { type: then, target: { node: c } }
  - id: b
    transitions:
      - { type: merge, target: { node: d }, siblings: [b, c] }
  - id: c
    transitions:
      - { type: merge, target: { node: d }, siblings: [b, c] }
  - id: d
"#,
        );
        assert!(validate_graph(&cfg).is_ok());
    }

    #[test]
    fn test_duplicate_ids() {
        let cfg = config("nodes: [{id: a}, {id: a}]");
        let errors = validate_graph(&cfg).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::DuplicateNodeId { node_id: "a".into() }]
        );
    }

    #[test]
    fn test_undeclared_topic_and_queue() {
        let cfg = config(
            r#"
nodes:
  - id: a
    transitions:
      - { type: then, target: { topic: t } }
      - { type: else, target: { queue: q } }
"#,
        );
        let errors = validate_graph(&cfg).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], ValidationError::UnknownTopic { .. }));
        assert!(matches!(errors[1], ValidationError::UnknownQueue { .. }));
    }

    #[test]
    fn test_fan_out_must_target_a_node() {
        let cfg = config(
            r#"
nodes:
  - id: a
    transitions:
      - { type: fan_out, target: api_response }
"#,
        );
        let errors = validate_graph(&cfg).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::JoinTargetNotNode {
                node_id: "a".into(),
                edge: "fan_out"
            }]
        );
    }

    #[test]
    fn test_merge_sibling_rules() {
        let cfg = config(
            r#"
nodes:
  - id: a
    transitions:
      - { type: merge, target: { node: d }, siblings: [] }
  - id: b
    transitions:
      - { type: merge, target: { node: d }, siblings: [c, ghost] }
  - id: c
  - id: d
"#,
        );
        let errors = validate_graph(&cfg).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].to_string().contains("empty"));
        assert!(errors[1].to_string().contains("declaring node"));
        assert!(errors[2].to_string().contains("ghost"));
    }

    #[test]
    fn test_default_exception_handler_must_resolve() {
        let cfg = config(
            r#"
default_exception_handler: { node: missing }
nodes: [{id: a}]
"#,
        );
        let errors = validate_graph(&cfg).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::UnknownExceptionHandler {
                target: "node:missing".into()
            }]
        );
    }

    #[test]
    fn test_edges_cannot_invoke_api_endpoints() {
        let cfg = config(
            r#"
default_exception_handler: { node: api }
nodes:
  - id: api
    mode: api_endpoint
    transitions:
      - { type: fan_out, target: { node: each } }
  - id: each
    transitions:
      - { type: fan_in, target: { node: api } }
      - { type: exception, target: { node: api } }
"#,
        );
        let errors = validate_graph(&cfg).unwrap_err();
        let expected = |node_id: &str| ValidationError::TargetIsApiEndpoint {
            node_id: node_id.into(),
            target: "api".into(),
        };
        assert_eq!(
            errors,
            vec![
                expected("each"),
                expected("each"),
                expected("default_exception_handler")
            ]
        );
    }

    #[test]
    fn test_api_endpoint_may_invoke_workers() {
        let cfg = config(
            r#"
nodes:
  - id: api
    mode: api_endpoint
    transitions:
      - { type: then, target: { node: work } }
  - id: work
    transitions:
      - { type: then, target: api_response }
"#,
        );
        assert!(validate_graph(&cfg).is_ok());
    }
}
