use codereport_ai::OracleError;
use codereport_core::CodeReportError;
use std::fmt;
use thiserror::Error;

/// Step of a report build, reported when the build aborts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    GraphValidation,
    ExecutiveSummary,
    Selection,
    SubsystemRanking,
    ConstructRanking,
    SkillsetInference,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::GraphValidation => "graph validation",
            BuildStage::ExecutiveSummary => "executive summary",
            BuildStage::Selection => "selection",
            BuildStage::SubsystemRanking => "subsystem ranking",
            BuildStage::ConstructRanking => "construct ranking",
            BuildStage::SkillsetInference => "skillset inference",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("{stage} failed: {source}")]
    Oracle {
        stage: BuildStage,
        #[source]
        source: OracleError,
    },

    #[error("{stage} failed: {source}")]
    Graph {
        stage: BuildStage,
        #[source]
        source: CodeReportError,
    },
}

impl ReportError {
    pub fn stage(&self) -> BuildStage {
        match self {
            ReportError::Oracle { stage, .. } | ReportError::Graph { stage, .. } => *stage,
        }
    }
}

pub type ReportResult<T> = std::result::Result<T, ReportError>;

/// Tag a lower-level failure with the stage it aborted
pub(crate) trait AtStage<T> {
    fn at_stage(self, stage: BuildStage) -> ReportResult<T>;
}

impl<T> AtStage<T> for Result<T, OracleError> {
    fn at_stage(self, stage: BuildStage) -> ReportResult<T> {
        self.map_err(|source| ReportError::Oracle { stage, source })
    }
}

impl<T> AtStage<T> for Result<T, CodeReportError> {
    fn at_stage(self, stage: BuildStage) -> ReportResult<T> {
        self.map_err(|source| ReportError::Graph { stage, source })
    }
}
