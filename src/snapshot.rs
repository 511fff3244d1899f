//! Plain serde representation of a subtree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{TreeError, TreeResult};
use crate::tree::ValueTree;
use crate::var::Var;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Var>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeSnapshot>,
}

impl TreeSnapshot {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Var>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: TreeSnapshot) -> Self {
        self.children.push(child);
        self
    }

    pub fn from_toml(text: &str) -> TreeResult<Self> {
        toml::from_str(text).map_err(|e| TreeError::Snapshot {
            message: format!("parse: {e}"),
        })
    }

    pub fn to_toml(&self) -> TreeResult<String> {
        toml::to_string_pretty(self).map_err(|e| TreeError::Snapshot {
            message: format!("serialize: {e}"),
        })
    }
}

impl ValueTree {
    /// Builds a fresh, detached tree. No listeners exist yet, so no events
    /// are observed.
    pub fn from_snapshot(snapshot: &TreeSnapshot) -> TreeResult<ValueTree> {
        let tree = ValueTree::new(snapshot.type_name.as_str());
        for (name, value) in &snapshot.properties {
            tree.set_property(name.as_str(), value.clone(), None)?;
        }
        for child in &snapshot.children {
            tree.append_child(&ValueTree::from_snapshot(child)?, None)?;
        }
        Ok(tree)
    }

    pub fn to_snapshot(&self) -> TreeResult<TreeSnapshot> {
        let type_name = self.get_type().ok_or(TreeError::InvalidNode)?;
        Ok(TreeSnapshot {
            type_name: type_name.to_string(),
            properties: self
                .properties()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            children: self
                .children()
                .iter()
                .map(ValueTree::to_snapshot)
                .collect::<TreeResult<Vec<_>>>()?,
        })
    }
}
