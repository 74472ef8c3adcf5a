use crate::{CodeReportError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// Source span backing a node's definition.
///
/// The span is measured in lines, 0-based: `[start_line_incl, end_line_excl)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefiningFragment {
    pub fragment_id: String,
    /// Path relative to the code-base root
    pub source_path: String,
    pub start_line_incl: usize,
    pub end_line_excl: usize,
}

/// A single code construct (function, class, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub id: String,
    pub entity_type: String,
    #[serde(default)]
    pub description: String,
    pub defining_fragment: DefiningFragment,
}

impl Node {
    pub fn new(
        id: impl Into<String>,
        entity_type: impl Into<String>,
        description: impl Into<String>,
        defining_fragment: DefiningFragment,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            description: description.into(),
            defining_fragment,
        }
    }
}

/// Cluster of nodes and/or sub-communities
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Community {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub child_node_ids: Vec<String>,
    #[serde(default)]
    pub child_community_ids: Vec<String>,
}

impl Community {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_nodes<I, S>(mut self, node_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.child_node_ids.extend(node_ids.into_iter().map(Into::into));
        self
    }

    pub fn with_communities<I, S>(mut self, community_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.child_community_ids
            .extend(community_ids.into_iter().map(Into::into));
        self
    }
}

/// Cluster of communities and/or sub-groups, one level above communities
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Group {
    #[serde(default, alias = "group_id")]
    pub id: String,
    #[serde(default)]
    pub child_group_ids: Vec<String>,
    #[serde(default)]
    pub child_community_ids: Vec<String>,
    #[serde(default)]
    pub summary: Summary,
}

/// Upstream-produced description of a community or group.
///
/// `name` and `purpose` are the fields this crate reads; any other keys the
/// builder emitted are kept in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Summary {
    pub fn new(name: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            purpose: Some(purpose.into()),
            extra: BTreeMap::new(),
        }
    }

    /// Name, treating an empty string as missing
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|s| !s.is_empty())
    }

    /// Purpose, treating an empty string as missing
    pub fn purpose(&self) -> Option<&str> {
        self.purpose.as_deref().filter(|s| !s.is_empty())
    }
}

/// Read-only knowledge graph handed over by the upstream builder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphPackage {
    #[serde(default)]
    pub nodes: HashMap<String, Node>,
    #[serde(default)]
    pub communities: HashMap<String, Community>,
    #[serde(default)]
    pub groups: HashMap<String, Group>,
    /// Level 0 is the coarsest
    #[serde(default)]
    pub community_hierarchy: Vec<Vec<String>>,
    #[serde(default)]
    pub summaries_by_id: HashMap<String, Summary>,
}

impl GraphPackage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let mut package: GraphPackage = serde_json::from_str(content)?;
        package.fill_missing_ids();
        Ok(package)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let package = Self::from_json_str(&content)?;
        debug!(
            path = %path.display(),
            nodes = package.nodes.len(),
            communities = package.communities.len(),
            levels = package.community_hierarchy.len(),
            "Loaded graph package"
        );
        Ok(package)
    }

    /// Entries serialized as maps may omit the id; the key is authoritative then.
    fn fill_missing_ids(&mut self) {
        for (key, node) in self.nodes.iter_mut() {
            if node.id.is_empty() {
                node.id = key.clone();
            }
        }
        for (key, community) in self.communities.iter_mut() {
            if community.id.is_empty() {
                community.id = key.clone();
            }
        }
        for (key, group) in self.groups.iter_mut() {
            if group.id.is_empty() {
                group.id = key.clone();
            }
        }
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.insert(node.id.clone(), node);
        self
    }

    pub fn with_community(mut self, community: Community) -> Self {
        self.communities.insert(community.id.clone(), community);
        self
    }

    pub fn with_group(mut self, group: Group) -> Self {
        self.groups.insert(group.id.clone(), group);
        self
    }

    pub fn with_level<I, S>(mut self, community_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.community_hierarchy
            .push(community_ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_summary(mut self, id: impl Into<String>, summary: Summary) -> Self {
        self.summaries_by_id.insert(id.into(), summary);
        self
    }

    pub fn node(&self, id: &str) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| CodeReportError::NodeNotFound(id.to_string()))
    }

    pub fn community(&self, id: &str) -> Result<&Community> {
        self.communities
            .get(id)
            .ok_or_else(|| CodeReportError::CommunityNotFound(id.to_string()))
    }

    pub fn summary(&self, id: &str) -> Option<&Summary> {
        self.summaries_by_id.get(id)
    }

    pub fn levels(&self) -> &[Vec<String>] {
        &self.community_hierarchy
    }

    pub fn top_level(&self) -> Option<&[String]> {
        self.community_hierarchy.first().map(Vec::as_slice)
    }

    /// All nodes transitively reachable from `community_id`, in pre-order:
    /// a community's own nodes first, then each child community in order.
    ///
    /// Communities reachable through more than one parent are expanded once.
    /// A community that contains itself yields `CyclicHierarchy`.
    pub fn descendant_node_ids(&self, community_id: &str) -> Result<Vec<String>> {
        let mut walk = DescendantWalk::default();
        self.walk_descendants(community_id, &mut walk)?;
        Ok(walk.node_ids)
    }

    /// Depth-first walk on an explicit stack, so hierarchy depth is bounded
    /// by memory rather than by the call stack.
    fn walk_descendants<'a>(&'a self, root_id: &str, walk: &mut DescendantWalk<'a>) -> Result<()> {
        let (root, _) = self
            .communities
            .get_key_value(root_id)
            .ok_or_else(|| CodeReportError::CommunityNotFound(root_id.to_string()))?;
        let mut stack = vec![WalkStep::Enter(root.as_str())];

        while let Some(step) = stack.pop() {
            let community_id = match step {
                WalkStep::Exit(id) => {
                    walk.on_path.remove(id);
                    continue;
                }
                WalkStep::Enter(id) => id,
            };

            let (id, community) = self
                .communities
                .get_key_value(community_id)
                .ok_or_else(|| CodeReportError::CommunityNotFound(community_id.to_string()))?;

            if walk.on_path.contains(id.as_str()) {
                return Err(CodeReportError::CyclicHierarchy(id.clone()));
            }
            if !walk.expanded.insert(id.as_str()) {
                continue;
            }
            walk.on_path.insert(id.as_str());
            stack.push(WalkStep::Exit(id.as_str()));

            for node_id in &community.child_node_ids {
                if walk.seen_nodes.insert(node_id.as_str()) {
                    walk.node_ids.push(node_id.clone());
                }
            }
            // Reversed so the first child is popped first
            for child_id in community.child_community_ids.iter().rev() {
                stack.push(WalkStep::Enter(child_id.as_str()));
            }
        }

        Ok(())
    }

    /// Check the referential-integrity invariants the upstream builder promises.
    ///
    /// Missing summaries are not checked; they degrade rendering only.
    pub fn validate(&self) -> Result<()> {
        for (key, node) in &self.nodes {
            if &node.id != key {
                return Err(CodeReportError::Integrity(format!(
                    "node keyed '{}' carries id '{}'",
                    key, node.id
                )));
            }
        }

        for (key, community) in &self.communities {
            if &community.id != key {
                return Err(CodeReportError::Integrity(format!(
                    "community keyed '{}' carries id '{}'",
                    key, community.id
                )));
            }
            for node_id in &community.child_node_ids {
                if !self.nodes.contains_key(node_id) {
                    return Err(CodeReportError::Integrity(format!(
                        "community '{}' references unknown node '{}'",
                        key, node_id
                    )));
                }
            }
            for child_id in &community.child_community_ids {
                if !self.communities.contains_key(child_id) {
                    return Err(CodeReportError::Integrity(format!(
                        "community '{}' references unknown community '{}'",
                        key, child_id
                    )));
                }
            }
        }

        for (key, group) in &self.groups {
            for child_id in &group.child_group_ids {
                if !self.groups.contains_key(child_id) {
                    return Err(CodeReportError::Integrity(format!(
                        "group '{}' references unknown group '{}'",
                        key, child_id
                    )));
                }
            }
            for child_id in &group.child_community_ids {
                if !self.communities.contains_key(child_id) {
                    return Err(CodeReportError::Integrity(format!(
                        "group '{}' references unknown community '{}'",
                        key, child_id
                    )));
                }
            }
        }

        let mut rank: HashMap<&str, usize> = HashMap::new();
        for (level_idx, level) in self.community_hierarchy.iter().enumerate() {
            for community_id in level {
                if !self.communities.contains_key(community_id) {
                    return Err(CodeReportError::Integrity(format!(
                        "hierarchy level {} references unknown community '{}'",
                        level_idx, community_id
                    )));
                }
                if let Some(previous) = rank.insert(community_id.as_str(), level_idx) {
                    return Err(CodeReportError::Integrity(format!(
                        "community '{}' appears in hierarchy levels {} and {}",
                        community_id, previous, level_idx
                    )));
                }
            }
        }

        self.check_acyclic()
    }

    fn check_acyclic(&self) -> Result<()> {
        let mut ids: Vec<&String> = self.communities.keys().collect();
        ids.sort();

        // One walk for all roots: a community expanded by an earlier root has
        // a finished subtree and is not walked again.
        let mut walk = DescendantWalk::default();
        for id in ids {
            if !walk.expanded.contains(id.as_str()) {
                self.walk_descendants(id, &mut walk)?;
            }
        }
        Ok(())
    }
}

enum WalkStep<'a> {
    Enter(&'a str),
    Exit(&'a str),
}

#[derive(Default)]
struct DescendantWalk<'a> {
    node_ids: Vec<String>,
    seen_nodes: HashSet<&'a str>,
    expanded: HashSet<&'a str>,
    on_path: HashSet<&'a str>,
}
