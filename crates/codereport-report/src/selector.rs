//! Budgeted selection of subsystems and of their key constructs.
//!
//! The oracle decides importance; every id or index it returns is checked
//! against the candidates it was offered before it is used.

use crate::context::ContextAssembler;
use crate::error::{AtStage, BuildStage, ReportResult};
use crate::prompts::{
    important_constructs_schema, important_constructs_system_prompt, important_subsystems_schema,
    important_subsystems_system_prompt, ConstructRanking, SubsystemRanking,
    IMPORTANT_CONSTRUCTS_REQUEST, IMPORTANT_SUBSYSTEMS_REQUEST,
};
use codereport_ai::{decode_output, CompletionRequest, StructuredOracle};
use codereport_core::{GraphPackage, SourceProvider};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Constructs chosen within one subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemSelection {
    pub community_id: String,
    /// Every node reachable from the community, pre-order
    pub descendant_node_ids: Vec<String>,
    pub chosen_node_ids: Vec<String>,
    /// Rendered description of the chosen constructs
    pub content: String,
}

/// Result of one selection pass over the hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticalComponents {
    pub content: String,
    /// Union of the descendant nodes of every selected subsystem, first-seen order
    pub code_node_ids: Vec<String>,
    /// Selected subsystems, most important first
    pub subsystem_ids: Vec<String>,
}

/// Candidate pool for the importance ranking.
///
/// The coarsest level holding at least `target` communities, or every
/// community of every level (deduplicated) when no level is that large.
pub fn select_top_subsystems(levels: &[Vec<String>], target: usize) -> Vec<String> {
    if let Some(level) = levels.iter().find(|level| level.len() >= target) {
        return level.clone();
    }

    let mut seen = HashSet::new();
    levels
        .iter()
        .flatten()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Map a 1-based index from the oracle onto `[0, count)`
fn accept_index(value: &Value, count: usize) -> Option<usize> {
    let index = match value {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 1.0)
                .map(|f| f as u64)
        }),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    let index = usize::try_from(index).ok()?;
    (1..=count).contains(&index).then(|| index - 1)
}

pub struct HierarchicalSelector<'a> {
    oracle: &'a dyn StructuredOracle,
    graph: &'a GraphPackage,
    context: ContextAssembler<'a>,
    constructs_per_subsystem: usize,
}

impl<'a> HierarchicalSelector<'a> {
    pub fn new(
        oracle: &'a dyn StructuredOracle,
        graph: &'a GraphPackage,
        sources: &'a dyn SourceProvider,
        constructs_per_subsystem: usize,
    ) -> Self {
        Self {
            oracle,
            graph,
            context: ContextAssembler::new(graph, sources),
            constructs_per_subsystem,
        }
    }

    /// Up to `n` distinct pool members, most important first
    pub async fn rank_important_subsystems(&self, pool: &[String], n: usize) -> ReportResult<Vec<String>> {
        if pool.is_empty() || n == 0 {
            warn!(pool = pool.len(), n, "Nothing to rank, skipping subsystem ranking");
            return Ok(Vec::new());
        }

        let requested = n.saturating_add(2);
        let request = CompletionRequest::new(
            IMPORTANT_SUBSYSTEMS_REQUEST,
            important_subsystems_system_prompt(requested),
            self.context.render_subsystem_context(pool),
            important_subsystems_schema(pool, requested),
        );
        let value = self
            .oracle
            .complete(&request)
            .await
            .at_stage(BuildStage::SubsystemRanking)?;
        let ranking: SubsystemRanking =
            decode_output(&request.name, value).at_stage(BuildStage::SubsystemRanking)?;

        let candidates: HashSet<&str> = pool.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        let returned = ranking.most_important_subsystems.len();
        let selected: Vec<String> = ranking
            .most_important_subsystems
            .into_iter()
            .filter(|id| candidates.contains(id.as_str()) && seen.insert(id.clone()))
            .take(n)
            .collect();

        debug!(returned, selected = selected.len(), "Ranked subsystems");
        Ok(selected)
    }

    /// Most important descendant constructs of `community_id`
    pub async fn rank_important_constructs(&self, community_id: &str) -> ReportResult<SubsystemSelection> {
        let descendant_node_ids = self
            .graph
            .descendant_node_ids(community_id)
            .at_stage(BuildStage::Selection)?;

        if descendant_node_ids.is_empty() || self.constructs_per_subsystem == 0 {
            warn!(community = community_id, "No constructs to rank");
            return Ok(SubsystemSelection {
                community_id: community_id.to_string(),
                descendant_node_ids,
                chosen_node_ids: Vec::new(),
                content: String::new(),
            });
        }

        let request = CompletionRequest::new(
            IMPORTANT_CONSTRUCTS_REQUEST,
            important_constructs_system_prompt(self.constructs_per_subsystem),
            self.context
                .render_construct_listing(&descendant_node_ids)
                .at_stage(BuildStage::Selection)?,
            important_constructs_schema(self.constructs_per_subsystem),
        );
        let value = self
            .oracle
            .complete(&request)
            .await
            .at_stage(BuildStage::ConstructRanking)?;
        let ranking: ConstructRanking =
            decode_output(&request.name, value).at_stage(BuildStage::ConstructRanking)?;

        let mut seen = HashSet::new();
        let chosen_node_ids: Vec<String> = ranking
            .most_important_code_construct_ids
            .iter()
            .filter_map(|value| accept_index(value, descendant_node_ids.len()))
            .filter(|index| seen.insert(*index))
            .take(self.constructs_per_subsystem)
            .map(|index| descendant_node_ids[index].clone())
            .collect();

        let dropped = ranking.most_important_code_construct_ids.len() - seen.len();
        if dropped > 0 {
            debug!(community = community_id, dropped, "Dropped unusable construct indices");
        }

        let content = self
            .context
            .render_chosen_constructs(&chosen_node_ids)
            .at_stage(BuildStage::Selection)?;

        Ok(SubsystemSelection {
            community_id: community_id.to_string(),
            descendant_node_ids,
            chosen_node_ids,
            content,
        })
    }

    /// Select up to `n` subsystems and aggregate their constructs
    pub async fn collect_critical_components(&self, n: usize) -> ReportResult<CriticalComponents> {
        let pool = select_top_subsystems(self.graph.levels(), n);
        let subsystem_ids = self.rank_important_subsystems(&pool, n).await?;
        info!(
            pool = pool.len(),
            selected = subsystem_ids.len(),
            "Selected critical subsystems"
        );

        let mut seen = HashSet::new();
        let mut code_node_ids = Vec::new();
        let mut content_lines = Vec::with_capacity(subsystem_ids.len() * 4);

        for community_id in &subsystem_ids {
            let selection = self.rank_important_constructs(community_id).await?;
            for node_id in selection.descendant_node_ids {
                if seen.insert(node_id.clone()) {
                    code_node_ids.push(node_id);
                }
            }
            content_lines.push(format!("## {}", self.context.subsystem_name(community_id)));
            content_lines.push("\n".to_string());
            content_lines.push(selection.content);
            content_lines.push("\n".to_string());
        }

        Ok(CriticalComponents {
            content: content_lines.join("\n"),
            code_node_ids,
            subsystem_ids,
        })
    }
}
