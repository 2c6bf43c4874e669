//! Wire types shared between the leadflow backend and its external
//! consumers (dashboard, graph editor, reporting exports).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A deduplicated contact record, unique per (workspace_id, email).
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub score: i32,
    pub score_reason: String,
    pub status: String,
    pub tags: Vec<String>,
    /// Submission keys that were not consumed by canonical-field extraction.
    pub custom_fields: serde_json::Value,
    pub source_type: String,
    pub source_id: Option<Uuid>,
    pub utm: Option<serde_json::Value>,
    pub ai_analysis: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Source of a lead record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSourceType {
    Manual,
    Form,
}

impl LeadSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Form => "form",
        }
    }
}

/// Append-only audit record of something that happened to a lead.
/// Never mutated or deleted once written.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadEvent {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadEventType {
    Created,
    FormSubmit,
    ScoreCalculated,
    ScoreManualUpdate,
    StatusChanged,
    TagsAdded,
    TagRemoved,
    AiAnalysis,
    AutomationError,
}

impl LeadEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::FormSubmit => "form_submit",
            Self::ScoreCalculated => "score_calculated",
            Self::ScoreManualUpdate => "score_manual_update",
            Self::StatusChanged => "status_changed",
            Self::TagsAdded => "tags_added",
            Self::TagRemoved => "tag_removed",
            Self::AiAnalysis => "ai_analysis",
            Self::AutomationError => "automation_error",
        }
    }
}

/// A stored workflow graph bound to a trigger type. `flow_data` is kept
/// verbatim as the editor produced it; the backend parses a typed graph
/// out of it at the load boundary.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Automation {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub trigger_type: String,
    pub trigger_config: serde_json::Value,
    pub is_active: bool,
    pub flow_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A form field descriptor as stored by the form builder. Only `type`,
/// `id` and the `extraAttributes` name/label are meaningful to the
/// extraction pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormField {
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(rename = "extraAttributes", default)]
    pub extra_attributes: FormFieldAttributes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormFieldAttributes {
    #[serde(rename = "fieldName", skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

// ===== Editor wire format =====
//
// These shapes round-trip bit-for-bit through the external graph editor;
// unknown handle/label/style decorations are carried, never normalized.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowData {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub position: FlowPosition,
    pub data: FlowNodeData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowPosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNodeData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "nodeType")]
    pub node_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEdge {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    #[serde(rename = "sourceHandle", skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(rename = "targetHandle", skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_edge_round_trips_condition_handles() {
        let raw = serde_json::json!({
            "id": "e1",
            "source": "cond-1",
            "target": "act-1",
            "sourceHandle": "true",
            "animated": true
        });
        let edge: FlowEdge = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(edge.source_handle.as_deref(), Some("true"));
        assert_eq!(serde_json::to_value(&edge).unwrap(), raw);
    }

    #[test]
    fn flow_node_round_trips() {
        let raw = serde_json::json!({
            "id": "n1",
            "type": "custom",
            "position": {"x": 120.0, "y": 40.5},
            "data": {"label": "Add tag", "nodeType": "action_tag", "config": {"tags": ["vip"]}}
        });
        let node: FlowNode = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(node.data.node_type, "action_tag");
        assert_eq!(serde_json::to_value(&node).unwrap(), raw);
    }

    #[test]
    fn event_type_names_are_stable() {
        assert_eq!(LeadEventType::FormSubmit.as_str(), "form_submit");
        assert_eq!(
            serde_json::to_value(LeadEventType::ScoreCalculated).unwrap(),
            serde_json::json!("score_calculated")
        );
    }
}
