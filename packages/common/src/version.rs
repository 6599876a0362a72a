//! Legacy version/branch model.
//!
//! Versions form a forest through `parent_id` pointers. The tree is a flat list;
//! selecting a version walks the root-to-version path used for highlighting
//! the active branch.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One generation result in the version forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: String,
    /// `None` marks a root.
    #[serde(default)]
    pub parent_id: Option<String>,
    pub image_url: String,
    /// Opaque generation config (scene JSON, seed, render parameters).
    #[serde(default)]
    pub config: serde_json::Value,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

/// Flat version list.
#[derive(Debug, Clone, Default)]
pub struct VersionTree {
    versions: Vec<Version>,
}

impl VersionTree {
    pub fn new(versions: Vec<Version>) -> Self {
        Self { versions }
    }

    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    pub fn into_versions(self) -> Vec<Version> {
        self.versions
    }

    pub fn get(&self, id: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.id == id)
    }

    /// Ordered root→`id` path used to highlight the selected branch.
    ///
    /// Unknown `id` yields an empty path. A parent pointer that references a
    /// missing version ends the walk at the last known version, and a revisited
    /// id ends it as well, so the walk always terminates with `id` last.
    pub fn select(&self, id: &str) -> Vec<String> {
        let index: HashMap<&str, &Version> =
            self.versions.iter().map(|v| (v.id.as_str(), v)).collect();

        let Some(mut current) = index.get(id).copied() else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut path = Vec::new();
        loop {
            if !seen.insert(current.id.as_str()) {
                tracing::warn!(id = %current.id, "Cycle in version parents; stopping walk");
                break;
            }
            path.push(current.id.clone());
            match current.parent_id.as_deref().and_then(|p| index.get(p)) {
                Some(parent) => current = parent,
                None => break,
            }
        }

        path.reverse();
        path
    }

    /// Append a freshly generated version and return its path.
    pub fn finish_generation(&mut self, version: Version) -> Vec<String> {
        let id = version.id.clone();
        self.versions.push(version);
        self.select(&id)
    }
}
