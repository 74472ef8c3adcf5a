use crate::context::ContextAssembler;
use crate::error::{AtStage, BuildStage, ReportResult};
use crate::prompts::{
    contract_schema, executive_summary_system_prompt, skillset_system_prompt,
    ExecutiveSummaryOutput, SkillsetOutput, EXECUTIVE_SUMMARY_REQUEST, SKILLSET_REQUEST,
};
use crate::selector::{CriticalComponents, HierarchicalSelector};
use codereport_ai::{decode_output, CompletionRequest, StructuredOracle};
use codereport_core::{CodeReportError, GraphPackage, ReportConfig, SourceProvider};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    pub num_critical_components: usize,
    pub constructs_per_subsystem: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            num_critical_components: 5,
            constructs_per_subsystem: 3,
        }
    }
}

impl From<&ReportConfig> for ReportOptions {
    fn from(config: &ReportConfig) -> Self {
        Self {
            num_critical_components: config.num_critical_components,
            constructs_per_subsystem: config.constructs_per_subsystem,
        }
    }
}

/// Builds the narrative report for one graph package.
///
/// Oracle calls run one at a time in a fixed order, so identical oracle
/// answers give a byte-identical report.
pub struct CodeReportBuilder<'a> {
    oracle: Arc<dyn StructuredOracle>,
    graph: &'a GraphPackage,
    sources: Arc<dyn SourceProvider>,
    options: ReportOptions,
}

impl<'a> CodeReportBuilder<'a> {
    pub fn new(
        oracle: Arc<dyn StructuredOracle>,
        graph: &'a GraphPackage,
        sources: Arc<dyn SourceProvider>,
        options: ReportOptions,
    ) -> Self {
        Self {
            oracle,
            graph,
            sources,
            options,
        }
    }

    fn assembler(&self) -> ContextAssembler<'_> {
        ContextAssembler::new(self.graph, self.sources.as_ref())
    }

    pub async fn build_report(&self) -> ReportResult<String> {
        self.graph.validate().at_stage(BuildStage::GraphValidation)?;

        let executive_summary = self.executive_summary().await?;
        info!("Executive summary ready");

        let selector = HierarchicalSelector::new(
            self.oracle.as_ref(),
            self.graph,
            self.sources.as_ref(),
            self.options.constructs_per_subsystem,
        );
        let components = selector
            .collect_critical_components(self.options.num_critical_components)
            .await?;
        info!(
            subsystems = components.subsystem_ids.len(),
            nodes = components.code_node_ids.len(),
            "Critical components ready"
        );

        let skillsets = self.skillset_requirements(&components).await?;
        info!("Skillset inference ready");

        Ok(assemble_report(&executive_summary, &components.content, &skillsets))
    }

    /// Summary of the coarsest hierarchy level
    pub async fn executive_summary(&self) -> ReportResult<String> {
        let top_level = self
            .graph
            .top_level()
            .ok_or_else(|| CodeReportError::InvalidOperation("community hierarchy has no levels".to_string()))
            .at_stage(BuildStage::ExecutiveSummary)?;

        let request = CompletionRequest::new(
            EXECUTIVE_SUMMARY_REQUEST,
            executive_summary_system_prompt(),
            self.assembler().render_subsystem_context(top_level),
            contract_schema::<ExecutiveSummaryOutput>(),
        );
        let value = self
            .oracle
            .complete(&request)
            .await
            .at_stage(BuildStage::ExecutiveSummary)?;
        let output: ExecutiveSummaryOutput =
            decode_output(&request.name, value).at_stage(BuildStage::ExecutiveSummary)?;

        Ok(render_executive_summary(&output))
    }

    /// Skillsets inferred from the source of every critical node
    pub async fn skillset_requirements(&self, components: &CriticalComponents) -> ReportResult<String> {
        let context = self
            .assembler()
            .render_fragment_context(&components.code_node_ids)
            .at_stage(BuildStage::SkillsetInference)?;

        let request = CompletionRequest::new(
            SKILLSET_REQUEST,
            skillset_system_prompt(),
            context,
            contract_schema::<SkillsetOutput>(),
        );
        let value = self
            .oracle
            .complete(&request)
            .await
            .at_stage(BuildStage::SkillsetInference)?;
        let output: SkillsetOutput =
            decode_output(&request.name, value).at_stage(BuildStage::SkillsetInference)?;

        Ok(render_skillsets(&output))
    }
}

pub fn render_executive_summary(output: &ExecutiveSummaryOutput) -> String {
    format!("## {}\n{}", output.title, output.functionality_summary)
}

pub fn render_skillsets(output: &SkillsetOutput) -> String {
    let mut lines = Vec::new();
    for (title, entries) in output.sections() {
        lines.push(format!("## {}", title));
        lines.extend(entries.iter().map(|entry| format!(" - {}", entry)));
        lines.push(String::new());
    }
    lines.join("\n")
}

pub fn assemble_report(executive_summary: &str, components: &str, skillsets: &str) -> String {
    [
        "# Executive Summary",
        executive_summary.trim(),
        "\n\n",
        "# Major Modules and Components",
        components.trim(),
        "\n\n",
        "# Suggested Developer Skillset",
        skillsets.trim(),
    ]
    .join("\n")
}
