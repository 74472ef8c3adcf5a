//! Oracle requests: names, system instructions and output contracts.

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const EXECUTIVE_SUMMARY_REQUEST: &str = "executive-summary";
pub const IMPORTANT_SUBSYSTEMS_REQUEST: &str = "identify-important-communities";
pub const IMPORTANT_CONSTRUCTS_REQUEST: &str = "identify-important-code-components";
pub const SKILLSET_REQUEST: &str = "identify-relevant-skillsets";

const IMPORTANCE_DEFINITION: &str =
    "'Importance' can be defined as playing a major role in the ultimate functionality of the system.";

pub fn executive_summary_system_prompt() -> String {
    [
        "You are an expert Chief Technology Officer.",
        "You are particularly adept at delivering concise summaries of technical behavior to product stakeholders.",
        "Given a description of the key parts of a software system, your task is to prepare a brief report for product stakeholders on the functionality of that system.",
        "Instructions for the Executive Report:",
        " - No implementation details should be mentioned",
        " - Focus on high-level functionality of the system",
        " - Describe the combined behaviour of all the pieces of the system combined: There is no need to re-summarize each individual component of the system",
        " - The report should have a neutral, impartial tone.  There is no need to speak positively about the code.",
    ]
    .join("\n")
}

pub fn important_subsystems_system_prompt(requested: usize) -> String {
    [
        "You are an expert software architect.".to_string(),
        format!(
            "Given a description of various sub-systems that comprise a single software application, respond with the IDs of the {} most important sub-systems.",
            requested
        ),
        IMPORTANCE_DEFINITION.to_string(),
    ]
    .join("\n")
}

pub fn important_constructs_system_prompt(requested: usize) -> String {
    [
        "You are an expert software architect.".to_string(),
        format!(
            "Given a description of code constructs that comprise one subsystem of a software application, respond with the indexes of the {} most important code constructs.",
            requested
        ),
        IMPORTANCE_DEFINITION.to_string(),
    ]
    .join("\n")
}

pub fn skillset_system_prompt() -> String {
    [
        "You are an expert software engineer and manager.",
        "You are particularly adept at assembling technical teams.",
        "Given some important code snippets from a code base, identify the technologies and skillsets that would be most advantageous for working on that code base.",
    ]
    .join("\n")
}

/// Ids restricted to `candidates` through an `enum` constraint
pub fn important_subsystems_schema(candidates: &[String], requested: usize) -> Value {
    json!({
        "type": "object",
        "properties": {
            "most_important_subsystems": {
                "description": format!(
                    "The {} most important sub-system IDs, in descending order of importance",
                    requested
                ),
                "type": "array",
                "items": {
                    "description": "Subsystem ID",
                    "type": "string",
                    "enum": candidates,
                },
            }
        },
        "required": ["most_important_subsystems"],
        "additionalProperties": false,
    })
}

pub fn important_constructs_schema(requested: usize) -> Value {
    json!({
        "type": "object",
        "properties": {
            "most_important_code_construct_ids": {
                "description": format!(
                    "The {} most important code constructs IDs, in descending order of importance",
                    requested
                ),
                "type": "array",
                "items": {
                    "description": "Index of important code construct",
                    "type": "integer",
                },
            }
        },
        "required": ["most_important_code_construct_ids"],
        "additionalProperties": false,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubsystemRanking {
    pub most_important_subsystems: Vec<String>,
}

/// Indices stay raw JSON; the selector decides which ones are usable
#[derive(Debug, Clone, Deserialize)]
pub struct ConstructRanking {
    pub most_important_code_construct_ids: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct ExecutiveSummaryOutput {
    /// Title of the complete system
    pub title: String,
    /// Summary of the high-level functionality of the system.
    pub functionality_summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct SkillsetOutput {
    /// Software frameworks that are used in the codebase
    pub relevant_frameworks: Vec<String>,
    /// Specific programming languages that are used in the codebase
    pub relevant_programming_languages: Vec<String>,
    /// Specific technologies that are used in the codebase
    pub relevant_technologies: Vec<String>,
    /// Specific software engineering skillsets necessary for working on the codebase
    pub requisite_skillsets: Vec<String>,
}

impl SkillsetOutput {
    /// Report sections in their fixed order, keyed by output field
    pub fn sections(&self) -> [(&'static str, &[String]); 4] {
        [
            ("Relevant Frameworks", &self.relevant_frameworks),
            ("Relevant Programming Languages", &self.relevant_programming_languages),
            ("Relevant Technologies", &self.relevant_technologies),
            ("Requisite Skillsets", &self.requisite_skillsets),
        ]
    }
}

/// JSON schema of `T`, stripped of the meta-schema keys providers reject
pub fn contract_schema<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| json!({"type": "object"}));
    if let Value::Object(map) = &mut schema {
        map.remove("$schema");
        map.remove("title");
    }
    schema
}
