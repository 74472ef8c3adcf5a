use crate::{CodeReportError, Result};
use std::path::{Component, Path, PathBuf};

/// Scoped access to source spans under a code-base root
pub trait SourceProvider: Send + Sync {
    /// Read lines `[start_line_incl, end_line_excl)` of `source_path` (0-based)
    fn read_span(&self, source_path: &str, start_line_incl: usize, end_line_excl: usize)
        -> Result<String>;
}

/// Reads spans straight from the file system, one open/read per call
#[derive(Debug, Clone)]
pub struct FsSourceProvider {
    root: PathBuf,
}

impl FsSourceProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, source_path: &str) -> Result<PathBuf> {
        let relative = Path::new(source_path);
        let escapes = relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
        if escapes {
            return Err(CodeReportError::Fragment {
                path: source_path.to_string(),
                reason: "path escapes the code-base root".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

impl SourceProvider for FsSourceProvider {
    fn read_span(
        &self,
        source_path: &str,
        start_line_incl: usize,
        end_line_excl: usize,
    ) -> Result<String> {
        let path = self.resolve(source_path)?;
        let content = std::fs::read_to_string(&path).map_err(|e| CodeReportError::Fragment {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        slice_lines(&content, start_line_incl, end_line_excl).map_err(|reason| {
            CodeReportError::Fragment {
                path: path.display().to_string(),
                reason,
            }
        })
    }
}

/// Lines `[start, end)` of `content`, line terminators kept
pub fn slice_lines(content: &str, start: usize, end: usize) -> std::result::Result<String, String> {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    if start > end || end > lines.len() {
        return Err(format!(
            "invalid line range [{}, {}) for {} lines",
            start,
            end,
            lines.len()
        ));
    }
    Ok(lines[start..end].concat())
}
