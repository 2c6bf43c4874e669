//! Typed view over the stored workflow graph.
//!
//! `flow_data` is persisted verbatim as the editor produced it; this
//! module parses it into a validated graph at the load boundary so the
//! executor works with typed node configs instead of a property bag.
//! Parse failures are configuration errors: they terminate the affected
//! run only.

use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use leadflow_shared::{FlowData, FlowNode};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("flow data is not a valid node/edge document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("graph must contain exactly one trigger node, found {0}")]
    TriggerCount(usize),
    #[error("trigger node '{0}' has incoming edges")]
    TriggerHasIncoming(String),
    #[error("unknown node type '{kind}' on node '{node}'")]
    UnknownNodeType { node: String, kind: String },
    #[error("edge references unknown node '{0}'")]
    DanglingEdge(String),
    #[error("node '{node}' has more than one outgoing '{handle}' edge")]
    DuplicateHandle { node: String, handle: String },
    #[error("node '{node}' is missing required config '{key}'")]
    MissingConfig { node: String, key: String },
    #[error("node '{node}' has invalid config: {message}")]
    InvalidConfig { node: String, message: String },
    #[error("graph contains a cycle through node '{0}'")]
    Cycle(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
}

impl ConditionOperator {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "equals" => Some(Self::Equals),
            "not_equals" => Some(Self::NotEquals),
            "contains" => Some(Self::Contains),
            _ => None,
        }
    }

    /// Case-sensitive string comparison over the triggering submission.
    pub fn evaluate(self, actual: Option<&str>, expected: &str) -> bool {
        match actual {
            // An absent field never satisfies the predicate; the run
            // follows the false edge.
            None => false,
            Some(actual) => match self {
                Self::Equals => actual == expected,
                Self::NotEquals => actual != expected,
                Self::Contains => actual.contains(expected),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionConfig {
    /// Submission field id to read from the trigger payload
    pub field: String,
    pub operator: ConditionOperator,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailConfig {
    /// Merge-tag templates ({{lead.name}}, {{trigger.<field>}}, ...)
    pub subject: String,
    pub body: String,
    /// Defaults to the lead's email when unset
    pub to: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookConfig {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DelayConfig {
    pub minutes: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Trigger,
    Condition(ConditionConfig),
    ActionEmail(EmailConfig),
    ActionTag { tags: Vec<String> },
    ActionStatus { status: String },
    ActionWebhook(WebhookConfig),
    ActionDelay(DelayConfig),
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
}

/// Validated workflow graph. Outgoing edges are unique per
/// (source node, handle); condition nodes use the "true"/"false"
/// handles, every other node a single default handle.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    nodes: HashMap<String, GraphNode>,
    outgoing: HashMap<(String, EdgeHandle), String>,
    trigger_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EdgeHandle {
    Default,
    True,
    False,
}

impl EdgeHandle {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("true") => Self::True,
            Some("false") => Self::False,
            _ => Self::Default,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::True => "true",
            Self::False => "false",
        }
    }
}

impl WorkflowGraph {
    pub fn parse(flow_data: &Value) -> Result<Self, GraphError> {
        let flow: FlowData = serde_json::from_value(flow_data.clone())?;

        let mut nodes = HashMap::new();
        for node in &flow.nodes {
            let kind = parse_node_kind(node)?;
            nodes.insert(
                node.id.clone(),
                GraphNode {
                    id: node.id.clone(),
                    kind,
                },
            );
        }

        let mut outgoing: HashMap<(String, EdgeHandle), String> = HashMap::new();
        let mut incoming: HashMap<String, usize> = HashMap::new();
        for edge in &flow.edges {
            if !nodes.contains_key(&edge.source) {
                return Err(GraphError::DanglingEdge(edge.source.clone()));
            }
            if !nodes.contains_key(&edge.target) {
                return Err(GraphError::DanglingEdge(edge.target.clone()));
            }

            let handle = EdgeHandle::parse(edge.source_handle.as_deref());
            let key = (edge.source.clone(), handle);
            if outgoing.contains_key(&key) {
                return Err(GraphError::DuplicateHandle {
                    node: edge.source.clone(),
                    handle: key.1.label().to_string(),
                });
            }
            outgoing.insert(key, edge.target.clone());
            *incoming.entry(edge.target.clone()).or_insert(0) += 1;
        }

        let triggers: Vec<&GraphNode> = nodes
            .values()
            .filter(|n| n.kind == NodeKind::Trigger)
            .collect();
        if triggers.len() != 1 {
            return Err(GraphError::TriggerCount(triggers.len()));
        }
        let trigger_id = triggers[0].id.clone();
        if incoming.get(&trigger_id).copied().unwrap_or(0) > 0 {
            return Err(GraphError::TriggerHasIncoming(trigger_id));
        }

        let graph = Self {
            nodes,
            outgoing,
            trigger_id,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    pub fn trigger_id(&self) -> &str {
        &self.trigger_id
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Next node along the default edge, if any.
    pub fn next_default(&self, id: &str) -> Option<&GraphNode> {
        self.next(id, EdgeHandle::Default)
    }

    /// Next node along a condition branch.
    pub fn next_branch(&self, id: &str, branch: bool) -> Option<&GraphNode> {
        self.next(id, if branch { EdgeHandle::True } else { EdgeHandle::False })
    }

    fn next(&self, id: &str, handle: EdgeHandle) -> Option<&GraphNode> {
        self.outgoing
            .get(&(id.to_string(), handle))
            .and_then(|target| self.nodes.get(target))
    }

    /// Depth-first three-color walk over every edge; any back edge is a
    /// configuration error.
    fn check_acyclic(&self) -> Result<(), GraphError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut colors: HashMap<&str, Color> =
            self.nodes.keys().map(|id| (id.as_str(), Color::White)).collect();

        let mut ids: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        ids.sort_unstable();

        for start in ids {
            if colors[start] != Color::White {
                continue;
            }
            // Stack of (node, finished) frames for an iterative DFS.
            let mut stack = vec![(start, false)];
            while let Some((id, finished)) = stack.pop() {
                if finished {
                    colors.insert(id, Color::Black);
                    continue;
                }
                colors.insert(id, Color::Gray);
                stack.push((id, true));
                for ((source, _), target) in &self.outgoing {
                    if source != id {
                        continue;
                    }
                    match colors[target.as_str()] {
                        Color::Gray => return Err(GraphError::Cycle(target.clone())),
                        Color::White => stack.push((target.as_str(), false)),
                        Color::Black => {}
                    }
                }
            }
        }
        Ok(())
    }
}

fn parse_node_kind(node: &FlowNode) -> Result<NodeKind, GraphError> {
    let config = &node.data.config;
    match node.data.node_type.as_str() {
        "trigger" => Ok(NodeKind::Trigger),
        "condition" => {
            let field = require_str(node, config, "field")?;
            let value = require_str(node, config, "value")?;
            let raw_op = require_str(node, config, "operator")?;
            let operator = ConditionOperator::parse(&raw_op).ok_or_else(|| {
                GraphError::InvalidConfig {
                    node: node.id.clone(),
                    message: format!("unsupported operator '{}'", raw_op),
                }
            })?;
            Ok(NodeKind::Condition(ConditionConfig {
                field,
                operator,
                value,
            }))
        }
        "action_email" => Ok(NodeKind::ActionEmail(EmailConfig {
            subject: require_str(node, config, "subject")?,
            body: require_str(node, config, "body")?,
            to: optional_str(config, "to"),
        })),
        "action_tag" => {
            // Editors emit either a single "tag" or a "tags" array.
            let mut tags: Vec<String> = match config.get("tags") {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_string)
                    .collect(),
                _ => Vec::new(),
            };
            if let Some(tag) = optional_str(config, "tag") {
                tags.push(tag);
            }
            tags.retain(|t| !t.trim().is_empty());
            if tags.is_empty() {
                return Err(GraphError::MissingConfig {
                    node: node.id.clone(),
                    key: "tags".to_string(),
                });
            }
            Ok(NodeKind::ActionTag { tags })
        }
        "action_status" => Ok(NodeKind::ActionStatus {
            status: require_str(node, config, "status")?,
        }),
        "action_webhook" => Ok(NodeKind::ActionWebhook(WebhookConfig {
            url: require_str(node, config, "url")?,
        })),
        "action_delay" => {
            let minutes = config
                .get("minutes")
                .and_then(Value::as_i64)
                .ok_or_else(|| GraphError::MissingConfig {
                    node: node.id.clone(),
                    key: "minutes".to_string(),
                })?;
            if minutes <= 0 {
                return Err(GraphError::InvalidConfig {
                    node: node.id.clone(),
                    message: "delay must be a positive number of minutes".to_string(),
                });
            }
            Ok(NodeKind::ActionDelay(DelayConfig { minutes }))
        }
        other => Err(GraphError::UnknownNodeType {
            node: node.id.clone(),
            kind: other.to_string(),
        }),
    }
}

fn require_str(node: &FlowNode, config: &Value, key: &str) -> Result<String, GraphError> {
    optional_str(config, key).ok_or_else(|| GraphError::MissingConfig {
        node: node.id.clone(),
        key: key.to_string(),
    })
}

fn optional_str(config: &Value, key: &str) -> Option<String> {
    config
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: &str, node_type: &str, config: Value) -> Value {
        json!({
            "id": id,
            "type": "custom",
            "position": {"x": 0.0, "y": 0.0},
            "data": {"label": id, "nodeType": node_type, "config": config}
        })
    }

    fn edge(source: &str, target: &str, handle: Option<&str>) -> Value {
        match handle {
            Some(h) => json!({"source": source, "target": target, "sourceHandle": h}),
            None => json!({"source": source, "target": target}),
        }
    }

    fn linear_flow() -> Value {
        json!({
            "nodes": [
                node("t", "trigger", json!({})),
                node("tag", "action_tag", json!({"tags": ["welcome"]})),
            ],
            "edges": [edge("t", "tag", None)]
        })
    }

    #[test]
    fn parses_a_linear_graph() {
        let graph = WorkflowGraph::parse(&linear_flow()).unwrap();
        assert_eq!(graph.trigger_id(), "t");
        let next = graph.next_default("t").unwrap();
        assert_eq!(next.kind, NodeKind::ActionTag { tags: vec!["welcome".to_string()] });
        assert!(graph.next_default("tag").is_none());
    }

    #[test]
    fn rejects_zero_or_two_triggers() {
        let no_trigger = json!({
            "nodes": [node("a", "action_tag", json!({"tag": "x"}))],
            "edges": []
        });
        assert!(matches!(
            WorkflowGraph::parse(&no_trigger),
            Err(GraphError::TriggerCount(0))
        ));

        let two = json!({
            "nodes": [node("t1", "trigger", json!({})), node("t2", "trigger", json!({}))],
            "edges": []
        });
        assert!(matches!(
            WorkflowGraph::parse(&two),
            Err(GraphError::TriggerCount(2))
        ));
    }

    #[test]
    fn rejects_incoming_edge_on_trigger() {
        let flow = json!({
            "nodes": [
                node("t", "trigger", json!({})),
                node("a", "action_status", json!({"status": "Qualified"})),
            ],
            "edges": [edge("t", "a", None), edge("a", "t", None)]
        });
        // Also a cycle, but the trigger invariant is checked first.
        assert!(matches!(
            WorkflowGraph::parse(&flow),
            Err(GraphError::TriggerHasIncoming(_))
        ));
    }

    #[test]
    fn rejects_cycles() {
        let flow = json!({
            "nodes": [
                node("t", "trigger", json!({})),
                node("a", "action_tag", json!({"tag": "x"})),
                node("b", "action_tag", json!({"tag": "y"})),
            ],
            "edges": [
                edge("t", "a", None),
                edge("a", "b", None),
                edge("b", "a", None),
            ]
        });
        assert!(matches!(WorkflowGraph::parse(&flow), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn rejects_duplicate_condition_handles() {
        let flow = json!({
            "nodes": [
                node("t", "trigger", json!({})),
                node("c", "condition", json!({"field": "country", "operator": "equals", "value": "BR"})),
                node("a", "action_tag", json!({"tag": "x"})),
                node("b", "action_tag", json!({"tag": "y"})),
            ],
            "edges": [
                edge("t", "c", None),
                edge("c", "a", Some("true")),
                edge("c", "b", Some("true")),
            ]
        });
        assert!(matches!(
            WorkflowGraph::parse(&flow),
            Err(GraphError::DuplicateHandle { .. })
        ));
    }

    #[test]
    fn rejects_dangling_edges_and_missing_config() {
        let dangling = json!({
            "nodes": [node("t", "trigger", json!({}))],
            "edges": [edge("t", "ghost", None)]
        });
        assert!(matches!(
            WorkflowGraph::parse(&dangling),
            Err(GraphError::DanglingEdge(_))
        ));

        let missing = json!({
            "nodes": [
                node("t", "trigger", json!({})),
                node("w", "action_webhook", json!({})),
            ],
            "edges": [edge("t", "w", None)]
        });
        assert!(matches!(
            WorkflowGraph::parse(&missing),
            Err(GraphError::MissingConfig { .. })
        ));
    }

    #[test]
    fn condition_branches_resolve_by_handle() {
        let flow = json!({
            "nodes": [
                node("t", "trigger", json!({})),
                node("c", "condition", json!({"field": "country", "operator": "equals", "value": "BR"})),
                node("br", "action_tag", json!({"tag": "br-lead"})),
                node("intl", "action_tag", json!({"tag": "intl-lead"})),
            ],
            "edges": [
                edge("t", "c", None),
                edge("c", "br", Some("true")),
                edge("c", "intl", Some("false")),
            ]
        });
        let graph = WorkflowGraph::parse(&flow).unwrap();
        assert_eq!(graph.next_branch("c", true).unwrap().id, "br");
        assert_eq!(graph.next_branch("c", false).unwrap().id, "intl");
    }

    #[test]
    fn operator_evaluation_is_case_sensitive() {
        let op = ConditionOperator::Equals;
        assert!(op.evaluate(Some("BR"), "BR"));
        assert!(!op.evaluate(Some("br"), "BR"));
        assert!(!op.evaluate(None, "BR"));

        assert!(ConditionOperator::Contains.evaluate(Some("São Paulo, BR"), "BR"));
        assert!(ConditionOperator::NotEquals.evaluate(Some("US"), "BR"));
        // Absent values never satisfy a predicate, whatever the operator.
        assert!(!ConditionOperator::NotEquals.evaluate(None, "BR"));
    }
}
