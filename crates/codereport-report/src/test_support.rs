//! Doubles shared by the unit tests of this crate.

use async_trait::async_trait;
use codereport_ai::{CompletionRequest, OracleError, OracleResult, StructuredOracle};
use codereport_core::{
    slice_lines, CodeReportError, Community, DefiningFragment, GraphPackage, Node, Result,
    SourceProvider, Summary,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn fragment(id: &str, path: &str, start: usize, end: usize) -> DefiningFragment {
    DefiningFragment {
        fragment_id: id.to_string(),
        source_path: path.to_string(),
        start_line_incl: start,
        end_line_excl: end,
    }
}

/// Two-level graph: `A` and `B` on top, `A1` and `B1` beneath.
///
/// `n1` and `n3` share fragment `f1`. `A1` has no summary.
pub fn sample_graph() -> GraphPackage {
    GraphPackage::new()
        .with_node(Node::new("n1", "function", "Tokenizes input", fragment("f1", "src/lexer.rs", 0, 2)))
        .with_node(Node::new("n2", "class", "Builds the tree", fragment("f2", "src/tree.rs", 0, 1)))
        .with_node(Node::new("n3", "function", "Peeks ahead", fragment("f1", "src/lexer.rs", 0, 2)))
        .with_node(Node::new("n4", "function", "Emits bytes", fragment("f3", "src/emit.rs", 0, 1)))
        .with_community(Community::new("A").with_nodes(["n1", "n2"]).with_communities(["A1"]))
        .with_community(Community::new("A1").with_nodes(["n3"]))
        .with_community(Community::new("B").with_communities(["B1"]))
        .with_community(Community::new("B1").with_nodes(["n4"]))
        .with_level(["A", "B"])
        .with_level(["A1", "B1"])
        .with_summary("A", Summary::new("Parser", "Turns text into syntax trees"))
        .with_summary("B", Summary::new("Emitter", "Writes machine code"))
        .with_summary("B1", Summary::new("Encoder", "Encodes instructions"))
}

/// In-memory source tree counting every span read
#[derive(Default)]
pub struct MemorySources {
    files: HashMap<String, String>,
    reads: AtomicUsize,
}

impl MemorySources {
    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files.insert(path.to_string(), content.to_string());
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl SourceProvider for MemorySources {
    fn read_span(&self, source_path: &str, start_line_incl: usize, end_line_excl: usize) -> Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let content = self.files.get(source_path).ok_or_else(|| CodeReportError::Fragment {
            path: source_path.to_string(),
            reason: "no such file".to_string(),
        })?;
        slice_lines(content, start_line_incl, end_line_excl).map_err(|reason| CodeReportError::Fragment {
            path: source_path.to_string(),
            reason,
        })
    }
}

/// Oracle answering from per-request queues. `None` or an exhausted queue
/// behaves like a response without structured output.
#[derive(Default)]
pub struct ScriptedOracle {
    answers: Mutex<HashMap<String, VecDeque<Option<Value>>>>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedOracle {
    pub fn answer(self, request_name: &str, value: Value) -> Self {
        self.push(request_name, Some(value))
    }

    pub fn fail(self, request_name: &str) -> Self {
        self.push(request_name, None)
    }

    fn push(self, request_name: &str, value: Option<Value>) -> Self {
        self.answers
            .lock()
            .unwrap()
            .entry(request_name.to_string())
            .or_default()
            .push_back(value);
        self
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.name).collect()
    }
}

#[async_trait]
impl StructuredOracle for ScriptedOracle {
    async fn complete(&self, request: &CompletionRequest) -> OracleResult<Value> {
        self.calls.lock().unwrap().push(request.clone());
        self.answers
            .lock()
            .unwrap()
            .get_mut(&request.name)
            .and_then(VecDeque::pop_front)
            .flatten()
            .ok_or_else(|| OracleError::NoStructuredOutput {
                request: request.name.clone(),
            })
    }
}
