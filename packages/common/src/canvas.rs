//! Canvas state stored per project, and the per-node run state machine.
//!
//! The canvas blob is written by the graph editor and is not schema-checked.
//! It is held as the raw JSON object; nodes and edges are read through
//! lenient views and edited in place, so anything the server does not touch
//! is written back byte-for-byte.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::version::{Version, VersionTree};

#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    #[error("canvas state has an unexpected shape: {0}")]
    InvalidShape(String),

    #[error("node '{0}' not found")]
    NodeNotFound(String),

    #[error("node '{0}' is an input node and cannot be run")]
    NotRunnable(String),

    #[error("cannot {event} a node that is {from}")]
    InvalidTransition { from: NodeStatus, event: NodeEvent },
}

const NODES: &str = "nodes";
const EDGES: &str = "edges";
const VERSIONS: &str = "versions";

/// Serialized graph-editor state: `{nodes, edges}` and/or legacy `{versions}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanvasState {
    blob: Map<String, Value>,
}

impl CanvasState {
    /// Wrap a stored blob. `null` is treated as an empty canvas; anything else
    /// that is not a JSON object is rejected.
    pub fn from_value(value: Value) -> Result<Self, CanvasError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(blob) => Ok(Self { blob }),
            other => Err(CanvasError::InvalidShape(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.blob)
    }

    /// Nodes with a string `id`. Anything else in `nodes` is skipped.
    pub fn nodes(&self) -> impl Iterator<Item = Node<'_>> {
        self.blob
            .get(NODES)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Node::from_value)
    }

    pub fn node(&self, id: &str) -> Option<Node<'_>> {
        self.nodes().find(|n| n.id() == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Result<NodeMut<'_>, CanvasError> {
        self.blob
            .get_mut(NODES)
            .and_then(Value::as_array_mut)
            .and_then(|nodes| {
                nodes
                    .iter_mut()
                    .filter_map(Value::as_object_mut)
                    .find(|raw| raw.get("id").and_then(Value::as_str) == Some(id))
            })
            .map(|raw| NodeMut { raw })
            .ok_or_else(|| CanvasError::NodeNotFound(id.to_string()))
    }

    /// Nodes with an edge pointing at `id`, in edge order. Edges without a
    /// string `source` and `target` are ignored.
    pub fn upstream_nodes(&self, id: &str) -> Vec<Node<'_>> {
        self.blob
            .get(EDGES)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
            .filter(|edge| edge.get("target").and_then(Value::as_str) == Some(id))
            .filter_map(|edge| edge.get("source").and_then(Value::as_str))
            .filter_map(|source| self.node(source))
            .collect()
    }

    /// Parse only the legacy `versions` list; the rest of the blob is ignored.
    pub fn version_tree(&self) -> Result<VersionTree, CanvasError> {
        match self.blob.get(VERSIONS) {
            None | Some(Value::Null) => Ok(VersionTree::default()),
            Some(raw) => Vec::<Version>::deserialize(raw)
                .map(VersionTree::new)
                .map_err(|e| CanvasError::InvalidShape(format!("versions: {e}"))),
        }
    }

    pub fn set_versions(&mut self, tree: VersionTree) -> Result<(), CanvasError> {
        let versions = serde_json::to_value(tree.into_versions())
            .map_err(|e| CanvasError::InvalidShape(format!("versions: {e}")))?;
        self.blob.insert(VERSIONS.into(), versions);
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Run state of a canvas node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Idle,
    Generating,
    Populated,
    Error,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Generating => "generating",
            Self::Populated => "populated",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEvent {
    Start,
    Complete,
    Fail,
    Reset,
}

impl fmt::Display for NodeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Fail => "fail",
            Self::Reset => "reset",
        };
        f.write_str(s)
    }
}

impl NodeStatus {
    /// Transition table for node runs.
    pub fn next(self, event: NodeEvent) -> Result<NodeStatus, CanvasError> {
        use NodeEvent::*;
        use NodeStatus::*;

        match (self, event) {
            (Idle | Populated | Error, Start) => Ok(Generating),
            (Generating, Complete) => Ok(Populated),
            (Generating, Fail) => Ok(Error),
            (Idle | Populated | Error, Reset) => Ok(Idle),
            (from, event) => Err(CanvasError::InvalidTransition { from, event }),
        }
    }
}

pub const STATUS: &str = "status";
pub const ERROR: &str = "error";
pub const IMAGE_URL: &str = "imageUrl";
pub const IMAGES: &str = "images";
pub const SCENE_JSON: &str = "sceneJson";
pub const SCENE_ID: &str = "sceneId";

fn status_of(raw: &Map<String, Value>) -> NodeStatus {
    raw.get("data")
        .and_then(|d| d.get(STATUS))
        .and_then(|v| NodeStatus::deserialize(v).ok())
        .unwrap_or_default()
}

/// Read-only view of one editor node.
#[derive(Debug, Clone, Copy)]
pub struct Node<'a> {
    id: &'a str,
    raw: &'a Map<String, Value>,
}

impl<'a> Node<'a> {
    fn from_value(value: &'a Value) -> Option<Self> {
        let raw = value.as_object()?;
        let id = raw.get("id")?.as_str()?;
        Some(Self { id, raw })
    }

    pub fn id(&self) -> &'a str {
        self.id
    }

    /// Editor node type, `input` or `output`.
    pub fn kind(&self) -> Option<&'a str> {
        self.raw.get("type").and_then(Value::as_str)
    }

    pub fn is_input(&self) -> bool {
        self.kind() == Some("input")
    }

    /// Missing or unrecognised status reads as idle.
    pub fn status(&self) -> NodeStatus {
        status_of(self.raw)
    }

    /// A non-null value from the node's `data` object.
    pub fn data_value(&self, key: &str) -> Option<&'a Value> {
        self.raw
            .get("data")
            .and_then(|d| d.get(key))
            .filter(|v| !v.is_null())
    }

    /// A trimmed, non-empty string from the node's `data` object.
    pub fn data_str(&self, key: &str) -> Option<&'a str> {
        self.data_value(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Mutable handle on one editor node. Writes touch only `data`.
#[derive(Debug)]
pub struct NodeMut<'a> {
    raw: &'a mut Map<String, Value>,
}

impl NodeMut<'_> {
    fn id(&self) -> &str {
        self.raw.get("id").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn status(&self) -> NodeStatus {
        status_of(self.raw)
    }

    pub fn is_input(&self) -> bool {
        self.raw.get("type").and_then(Value::as_str) == Some("input")
    }

    /// Edit the node's `data` object, creating it when missing or not an object.
    fn with_data<R>(&mut self, f: impl FnOnce(&mut Map<String, Value>) -> R) -> R {
        let data = self.raw.entry("data").or_insert(Value::Null);
        if let Value::Object(map) = data {
            return f(map);
        }
        let mut map = Map::new();
        let out = f(&mut map);
        *data = Value::Object(map);
        out
    }

    fn set_status(&mut self, status: NodeStatus) {
        self.with_data(|data| data.insert(STATUS.into(), Value::String(status.to_string())));
    }

    fn apply(&mut self, event: NodeEvent) -> Result<NodeStatus, CanvasError> {
        let next = self.status().next(event)?;
        self.set_status(next);
        Ok(next)
    }

    /// Write the outcome of a finished run. The stored status may have been
    /// overwritten by an editor save mid-run; the outcome lands regardless.
    fn settle(&mut self, event: NodeEvent) -> NodeStatus {
        let from = self.status();
        let outcome = match event {
            NodeEvent::Fail => NodeStatus::Error,
            _ => NodeStatus::Populated,
        };
        if from.next(event).is_err() {
            tracing::warn!(node_id = %self.id(), %from, %event, "Node changed while running");
        }
        self.set_status(outcome);
        outcome
    }

    pub fn begin_run(&mut self) -> Result<NodeStatus, CanvasError> {
        if self.is_input() {
            return Err(CanvasError::NotRunnable(self.id().to_string()));
        }
        let status = self.apply(NodeEvent::Start)?;
        self.with_data(|data| data.remove(ERROR));
        Ok(status)
    }

    pub fn complete_run(
        &mut self,
        image_urls: &[String],
        scene_id: &str,
        scene_json: &Value,
    ) -> NodeStatus {
        let status = self.settle(NodeEvent::Complete);
        self.with_data(|data| {
            data.remove(ERROR);
            if let Some(first) = image_urls.first() {
                data.insert(IMAGE_URL.into(), Value::String(first.clone()));
            }
            data.insert(
                IMAGES.into(),
                Value::Array(image_urls.iter().cloned().map(Value::String).collect()),
            );
            data.insert(SCENE_ID.into(), Value::String(scene_id.to_string()));
            data.insert(SCENE_JSON.into(), scene_json.clone());
        });
        status
    }

    pub fn fail_run(&mut self, message: &str) -> NodeStatus {
        let status = self.settle(NodeEvent::Fail);
        self.with_data(|data| data.insert(ERROR.into(), Value::String(message.to_string())));
        status
    }

    pub fn reset(&mut self) -> Result<NodeStatus, CanvasError> {
        let status = self.apply(NodeEvent::Reset)?;
        self.with_data(|data| data.remove(ERROR));
        Ok(status)
    }
}
