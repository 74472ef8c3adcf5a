//! Text blocks fed to the oracle as user context.

use codereport_core::{GraphPackage, Result, SourceProvider};
use std::collections::HashSet;
use tracing::{debug, warn};

pub struct ContextAssembler<'a> {
    graph: &'a GraphPackage,
    sources: &'a dyn SourceProvider,
}

impl<'a> ContextAssembler<'a> {
    pub fn new(graph: &'a GraphPackage, sources: &'a dyn SourceProvider) -> Self {
        Self { graph, sources }
    }

    /// One `Component <id> - '<name>'` line plus an indented purpose line per id.
    ///
    /// Missing summaries or fields are logged and rendered empty.
    pub fn render_subsystem_context(&self, community_ids: &[String]) -> String {
        community_ids
            .iter()
            .map(|id| {
                format!(
                    "Component {} - '{}'\n - {}",
                    id,
                    self.summary_field(id, "name"),
                    self.summary_field(id, "purpose")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn subsystem_name(&self, community_id: &str) -> String {
        self.summary_field(community_id, "name")
    }

    fn summary_field(&self, entity_id: &str, field: &str) -> String {
        let value = self.graph.summary(entity_id).and_then(|summary| match field {
            "name" => summary.name(),
            _ => summary.purpose(),
        });
        match value {
            Some(value) => value.to_string(),
            None => {
                warn!(entity = entity_id, field, "Summary is missing a field");
                String::new()
            }
        }
    }

    /// 1-based listing of constructs, in the order given
    pub fn render_construct_listing(&self, node_ids: &[String]) -> Result<String> {
        let mut lines = Vec::with_capacity(node_ids.len() * 3);
        for (i, node_id) in node_ids.iter().enumerate() {
            let node = self.graph.node(node_id)?;
            lines.push(format!("{}. {} {}", i + 1, node.entity_type, node_id));
            lines.push(format!(" - {}", node.description));
            lines.push("\n".to_string());
        }
        Ok(lines.join("\n"))
    }

    pub fn render_chosen_constructs(&self, node_ids: &[String]) -> Result<String> {
        let mut lines = Vec::with_capacity(node_ids.len() * 4);
        for node_id in node_ids {
            let node = self.graph.node(node_id)?;
            lines.push(format!("*_{}_ {}*", node.entity_type, node_id));
            lines.push("\n".to_string());
            lines.push(format!(" - {}", node.description));
            lines.push("\n".to_string());
        }
        Ok(lines.join("\n"))
    }

    /// Source text of every distinct defining fragment, headed by its id.
    ///
    /// Each fragment is read once, in first-seen order.
    pub fn render_fragment_context(&self, node_ids: &[String]) -> Result<String> {
        let mut seen = HashSet::new();
        let mut lines = Vec::new();
        for node_id in node_ids {
            let fragment = &self.graph.node(node_id)?.defining_fragment;
            if !seen.insert(fragment.fragment_id.as_str()) {
                continue;
            }
            let span = self.sources.read_span(
                &fragment.source_path,
                fragment.start_line_incl,
                fragment.end_line_excl,
            )?;
            lines.push(fragment.fragment_id.clone());
            lines.push(span);
            lines.push(String::new());
        }
        debug!(fragments = seen.len(), nodes = node_ids.len(), "Rendered fragment context");
        Ok(lines.join("\n"))
    }
}
