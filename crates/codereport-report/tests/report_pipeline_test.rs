use async_trait::async_trait;
use codereport_ai::{CompletionRequest, OracleError, OracleResult, StructuredOracle};
use codereport_core::{FsSourceProvider, GraphPackage, Result as CoreResult, SourceProvider};
use codereport_report::{BuildStage, CodeReportBuilder, ReportError, ReportOptions};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const GRAPH: &str = r#"{
    "nodes": {
        "n1": {"entity_type": "function", "description": "Tokenizes input",
               "defining_fragment": {"fragment_id": "f1", "source_path": "src/lexer.rs", "start_line_incl": 0, "end_line_excl": 2}},
        "n2": {"entity_type": "class", "description": "Builds the tree",
               "defining_fragment": {"fragment_id": "f2", "source_path": "src/tree.rs", "start_line_incl": 0, "end_line_excl": 1}},
        "n3": {"entity_type": "function", "description": "Peeks ahead",
               "defining_fragment": {"fragment_id": "f1", "source_path": "src/lexer.rs", "start_line_incl": 0, "end_line_excl": 2}},
        "n4": {"entity_type": "function", "description": "Emits bytes",
               "defining_fragment": {"fragment_id": "f3", "source_path": "src/emit.rs", "start_line_incl": 1, "end_line_excl": 2}}
    },
    "communities": {
        "A": {"child_node_ids": ["n1", "n2"], "child_community_ids": ["A1"]},
        "A1": {"child_node_ids": ["n3"]},
        "B": {"child_node_ids": ["n4"]}
    },
    "community_hierarchy": [["A", "B"], ["A1"]],
    "summaries_by_id": {
        "A": {"name": "Parser", "purpose": "Turns text into syntax trees"},
        "A1": {"name": "Lookahead", "purpose": "Peeks tokens"},
        "B": {"name": "Emitter", "purpose": "Writes machine code"}
    }
}"#;

const EXPECTED_REPORT: &str = concat!(
    "# Executive Summary\n",
    "## Toy Compiler\n",
    "Compiles a toy language.\n",
    "\n\n\n",
    "# Major Modules and Components\n",
    "## Emitter\n\n\n",
    "*_function_ n4*\n\n\n",
    " - Emits bytes\n\n\n\n\n",
    "## Parser\n\n\n",
    "*_class_ n2*\n\n\n",
    " - Builds the tree\n\n\n",
    "*_function_ n1*\n\n\n",
    " - Tokenizes input\n",
    "\n\n\n",
    "# Suggested Developer Skillset\n",
    "## Relevant Frameworks\n\n",
    "## Relevant Programming Languages\n",
    " - Rust\n\n",
    "## Relevant Technologies\n",
    " - LLVM\n\n",
    "## Requisite Skillsets\n",
    " - Compiler design",
);

/// Oracle replaying queued answers per request name
#[derive(Default)]
struct ScriptedOracle {
    answers: Mutex<HashMap<String, VecDeque<Value>>>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedOracle {
    fn answer(self, request_name: &str, value: Value) -> Self {
        self.answers
            .lock()
            .unwrap()
            .entry(request_name.to_string())
            .or_default()
            .push_back(value);
        self
    }

    fn call_names(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|c| c.name.clone()).collect()
    }

    fn request(&self, name: &str) -> Option<CompletionRequest> {
        self.calls.lock().unwrap().iter().find(|c| c.name == name).cloned()
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
            .ok_or_else(|| OracleError::NoStructuredOutput {
                request: request.name.clone(),
            })
    }
}

/// File-system sources that count span reads
struct CountingSources {
    inner: FsSourceProvider,
    reads: AtomicUsize,
}

impl SourceProvider for CountingSources {
    fn read_span(&self, source_path: &str, start_line_incl: usize, end_line_excl: usize) -> CoreResult<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_span(source_path, start_line_incl, end_line_excl)
    }
}

fn code_base() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/lexer.rs"), "fn lex() {}\nfn peek() {}\n").unwrap();
    fs::write(dir.path().join("src/tree.rs"), "struct Tree;\n").unwrap();
    fs::write(dir.path().join("src/emit.rs"), "use std::io;\nfn emit() {}\n").unwrap();
    dir
}

fn sources(dir: &TempDir) -> Arc<CountingSources> {
    Arc::new(CountingSources {
        inner: FsSourceProvider::new(dir.path()),
        reads: AtomicUsize::new(0),
    })
}

fn options() -> ReportOptions {
    ReportOptions {
        num_critical_components: 2,
        constructs_per_subsystem: 3,
    }
}

fn skillsets() -> Value {
    json!({
        "relevant_frameworks": [],
        "relevant_programming_languages": ["Rust"],
        "relevant_technologies": ["LLVM"],
        "requisite_skillsets": ["Compiler design"]
    })
}

fn scripted_oracle() -> ScriptedOracle {
    ScriptedOracle::default()
        .answer(
            "executive-summary",
            json!({"title": "Toy Compiler", "functionality_summary": "Compiles a toy language."}),
        )
        .answer("identify-important-communities", json!({"most_important_subsystems": ["B", "A"]}))
        .answer("identify-important-code-components", json!({"most_important_code_construct_ids": [1]}))
        .answer("identify-important-code-components", json!({"most_important_code_construct_ids": [2, 1, 9]}))
        .answer("identify-relevant-skillsets", skillsets())
}

#[tokio::test]
async fn test_full_report() {
    let dir = code_base();
    let graph = GraphPackage::from_json_str(GRAPH).unwrap();
    let oracle = Arc::new(scripted_oracle());
    let sources = sources(&dir);

    let report = CodeReportBuilder::new(oracle.clone(), &graph, sources.clone(), options())
        .build_report()
        .await
        .unwrap();

    assert_eq!(report, EXPECTED_REPORT);
    assert_eq!(
        oracle.call_names(),
        vec![
            "executive-summary",
            "identify-important-communities",
            "identify-important-code-components",
            "identify-important-code-components",
            "identify-relevant-skillsets",
        ]
    );
}

#[tokio::test]
async fn test_report_is_reproducible() {
    let dir = code_base();
    let graph = GraphPackage::from_json_str(GRAPH).unwrap();

    let mut reports = Vec::new();
    for _ in 0..2 {
        let builder =
            CodeReportBuilder::new(Arc::new(scripted_oracle()), &graph, sources(&dir), options());
        reports.push(builder.build_report().await.unwrap());
    }

    assert_eq!(reports[0], reports[1]);
}

#[tokio::test]
async fn test_shared_fragments_read_once() {
    let dir = code_base();
    let graph = GraphPackage::from_json_str(GRAPH).unwrap();
    let oracle = Arc::new(scripted_oracle());
    let sources = sources(&dir);

    CodeReportBuilder::new(oracle.clone(), &graph, sources.clone(), options())
        .build_report()
        .await
        .unwrap();

    // n1 and n3 share f1
    assert_eq!(sources.reads.load(Ordering::SeqCst), 3);
    let request = oracle.request("identify-relevant-skillsets").unwrap();
    assert_eq!(
        request.user,
        "f3\nfn emit() {}\n\n\nf1\nfn lex() {}\nfn peek() {}\n\n\nf2\nstruct Tree;\n\n"
    );
}

#[tokio::test]
async fn test_untrusted_rankings_are_filtered() {
    let dir = code_base();
    let graph = GraphPackage::from_json_str(GRAPH).unwrap();
    let oracle = Arc::new(
        ScriptedOracle::default()
            .answer("executive-summary", json!({"title": "T", "functionality_summary": "S"}))
            .answer(
                "identify-important-communities",
                json!({"most_important_subsystems": ["ghost", "A1", "A", "A"]}),
            )
            .answer(
                "identify-important-code-components",
                json!({"most_important_code_construct_ids": ["x", 0, 4, 3.0]}),
            )
            .answer("identify-relevant-skillsets", skillsets()),
    );

    let report = CodeReportBuilder::new(oracle.clone(), &graph, sources(&dir), options())
        .build_report()
        .await
        .unwrap();

    assert!(report.contains("## Parser\n\n\n*_function_ n3*\n\n\n - Peeks ahead"));
    assert!(!report.contains("## Emitter"));
    assert!(!report.contains("n1*"));
    assert_eq!(
        oracle
            .call_names()
            .iter()
            .filter(|name| *name == "identify-important-code-components")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_failed_ranking_aborts_without_report() {
    let dir = code_base();
    let graph = GraphPackage::from_json_str(GRAPH).unwrap();
    let oracle = Arc::new(
        ScriptedOracle::default()
            .answer("executive-summary", json!({"title": "T", "functionality_summary": "S"})),
    );

    let err = CodeReportBuilder::new(oracle.clone(), &graph, sources(&dir), options())
        .build_report()
        .await
        .unwrap_err();

    assert_eq!(err.stage(), BuildStage::SubsystemRanking);
    assert!(err.to_string().starts_with("subsystem ranking failed"));
    assert_eq!(
        oracle.call_names(),
        vec!["executive-summary", "identify-important-communities"]
    );
}

#[tokio::test]
async fn test_contract_violation_names_stage() {
    let dir = code_base();
    let graph = GraphPackage::from_json_str(GRAPH).unwrap();
    let oracle = Arc::new(ScriptedOracle::default().answer("executive-summary", json!({"title": 5})));

    let err = CodeReportBuilder::new(oracle, &graph, sources(&dir), options())
        .build_report()
        .await
        .unwrap_err();

    assert_eq!(err.stage(), BuildStage::ExecutiveSummary);
    assert!(matches!(
        err,
        ReportError::Oracle {
            source: OracleError::Contract { .. },
            ..
        }
    ));
}
