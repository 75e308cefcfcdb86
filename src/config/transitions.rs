// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Outgoing edges of a graph node.
//!
//! Edges are a closed enum: each kind carries exactly the data it needs
//! (an expression for `if`, the sibling set for `merge`) and every consumer
//! matches exhaustively.
//!
//! ```yaml
//! transitions:
//!   - type: then
//!     target: { node: enrich }
//!   - type: if
//!     expression: "value.score > 0.8"
//!     target: { topic: high-scores }
//!   - type: else
//!     target: { queue: review }
//!   - type: merge
//!     target: { node: report }
//!     siblings: [enrich, classify]
//!   - type: then
//!     target: api_response
//! ```

use crate::expression::Expression;
use serde::{Deserialize, Deserializer, Serialize};

/// Where an edge delivers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Invoke another worker node.
    Node(String),
    /// Publish to a notification topic.
    Topic(String),
    /// Buffer into a message queue.
    Queue(String),
    /// Hand the value to the synchronous API poller.
    ApiResponse,
}

impl Target {
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Target::Node(id) => Some(id),
            _ => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Target::Node(id) => format!("node:{}", id),
            Target::Topic(topic) => format!("topic:{}", topic),
            Target::Queue(queue) => format!("queue:{}", queue),
            Target::ApiResponse => "api_response".to_string(),
        }
    }
}

/// Reads an optional [`Target`] written as `{ node: id }` or `api_response`.
///
/// Outside an edge, serde_yaml wants enum variants as `!node id` tags. Going
/// through a buffered untagged wrapper accepts the single-key map form in
/// both YAML and TOML.
pub fn optional_target<'de, D>(deserializer: D) -> Result<Option<Target>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Buffered {
        Target(Target),
    }

    Ok(Option::<Buffered>::deserialize(deserializer)?.map(|Buffered::Target(target)| target))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Edge {
    Then { target: Target },
    If { expression: Expression, target: Target },
    Else { target: Target },
    Exception { target: Target },
    FanOut { target: Target },
    FanIn { target: Target },
    Merge { target: Target, siblings: Vec<String> },
}

impl Edge {
    pub fn target(&self) -> &Target {
        match self {
            Edge::Then { target }
            | Edge::If { target, .. }
            | Edge::Else { target }
            | Edge::Exception { target }
            | Edge::FanOut { target }
            | Edge::FanIn { target }
            | Edge::Merge { target, .. } => target,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Edge::Then { .. } => "then",
            Edge::If { .. } => "if",
            Edge::Else { .. } => "else",
            Edge::Exception { .. } => "exception",
            Edge::FanOut { .. } => "fan_out",
            Edge::FanIn { .. } => "fan_in",
            Edge::Merge { .. } => "merge",
        }
    }
}

/// A node's edges grouped by kind, in declaration order within each group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionSet {
    pub then: Vec<Target>,
    pub conditional: Vec<(Expression, Target)>,
    pub otherwise: Vec<Target>,
    pub exception: Vec<Target>,
    pub fan_out: Vec<Target>,
    pub fan_in: Vec<Target>,
    pub merge: Vec<(Target, Vec<String>)>,
}

impl TransitionSet {
    pub fn from_edges(edges: &[Edge]) -> Self {
        let mut set = Self::default();
        for edge in edges {
            match edge.clone() {
                Edge::Then { target } => set.then.push(target),
                Edge::If { expression, target } => set.conditional.push((expression, target)),
                Edge::Else { target } => set.otherwise.push(target),
                Edge::Exception { target } => set.exception.push(target),
                Edge::FanOut { target } => set.fan_out.push(target),
                Edge::FanIn { target } => set.fan_in.push(target),
                Edge::Merge { target, siblings } => set.merge.push((target, siblings)),
            }
        }
        set
    }

    /// True when any edge of any kind delivers to the API poller.
    pub fn has_api_response(&self) -> bool {
        self.then
            .iter()
            .chain(self.conditional.iter().map(|(_, t)| t))
            .chain(self.otherwise.iter())
            .chain(self.exception.iter())
            .any(|t| *t == Target::ApiResponse)
    }

    pub fn is_empty(&self) -> bool {
        self.then.is_empty()
            && self.conditional.is_empty()
            && self.otherwise.is_empty()
            && self.exception.is_empty()
            && self.fan_out.is_empty()
            && self.fan_in.is_empty()
            && self.merge.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_deserialize_from_yaml() {
        let yaml = r#"
- type: then
  target: { node: b }
- type: if
  expression: "value > 1"
  target: { topic: alerts }
- type: merge
  target: { node: d }
  siblings: [b, c]
- type: then
  target: api_response
"#;
        let edges: Vec<Edge> = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(edges.len(), 4);
        assert_eq!(edges[0].target(), &Target::Node("b".into()));
        assert_eq!(edges[1].kind(), "if");
        assert_eq!(edges[3].target(), &Target::ApiResponse);
    }

    #[test]
    fn test_bad_expression_fails_deserialization() {
        let yaml = r#"
- type: if
  expression: "value >"
  target: { node: b }
"#;
        assert!(serde_yaml::from_str::<Vec<Edge>>(yaml).is_err());
    }

    #[test]
    fn test_grouping_keeps_declaration_order() {
        let edges = vec![
            Edge::Then { target: Target::Node("x".into()) },
            Edge::Exception { target: Target::Node("err".into()) },
            Edge::Then { target: Target::Queue("q".into()) },
        ];
        let set = TransitionSet::from_edges(&edges);

        assert_eq!(set.then, vec![Target::Node("x".into()), Target::Queue("q".into())]);
        assert_eq!(set.exception.len(), 1);
        assert!(!set.has_api_response());
    }
}
