pub mod context;
pub mod error;
pub mod prompts;
pub mod selector;
pub mod synthesizer;

#[cfg(test)]
mod test_support;

pub use context::ContextAssembler;
pub use error::{BuildStage, ReportError, ReportResult};
pub use selector::{select_top_subsystems, CriticalComponents, HierarchicalSelector, SubsystemSelection};
pub use synthesizer::{assemble_report, CodeReportBuilder, ReportOptions};
