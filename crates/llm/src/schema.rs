//! JSON schemas for the four answer shapes
//!
//! Model output is checked against the intent's schema first, then a few
//! rules JSON Schema cannot express (procedure numbering), then deserialized
//! into the typed [`ResponseBody`].

use std::collections::HashMap;
use std::fmt;

use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde_json::{json, Value};

use dfir_core::{
    AnomalyAnswer, ConceptAnswer, ProcedureAnswer, QueryIntent, ResponseBody, ToolCommandAnswer,
};

use crate::LlmError;

static CONCEPT_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "required": ["summary", "explanation"],
        "properties": {
            "summary": {"type": "string", "minLength": 1},
            "explanation": {"type": "string", "minLength": 1},
            "key_points": {"type": "array", "items": {"type": "string"}}
        }
    })
});

static ANOMALY_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "required": ["summary", "legitimate_indicators", "malicious_indicators", "decision_tree"],
        "properties": {
            "summary": {"type": "string", "minLength": 1},
            "legitimate_indicators": {"type": "array", "items": {"type": "string"}},
            "malicious_indicators": {"type": "array", "items": {"type": "string"}},
            "decision_tree": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["question", "if_yes", "if_no"],
                    "properties": {
                        "question": {"type": "string"},
                        "if_yes": {"type": "string"},
                        "if_no": {"type": "string"}
                    }
                }
            }
        }
    })
});

static PROCEDURE_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "required": ["summary", "steps"],
        "properties": {
            "summary": {"type": "string", "minLength": 1},
            "steps": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "required": ["number", "action"],
                    "properties": {
                        "number": {"type": "integer", "minimum": 1},
                        "action": {"type": "string", "minLength": 1},
                        "command": {"type": ["string", "null"]}
                    }
                },
                "contains": {
                    "type": "object",
                    "required": ["command"],
                    "properties": {"command": {"type": "string", "minLength": 1}}
                }
            }
        }
    })
});

static TOOL_COMMAND_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "required": ["summary", "commands"],
        "properties": {
            "summary": {"type": "string", "minLength": 1},
            "commands": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "required": ["command", "purpose"],
                    "properties": {
                        "command": {"type": "string", "minLength": 1},
                        "purpose": {"type": "string"}
                    }
                }
            },
            "notes": {"type": ["string", "null"]}
        }
    })
});

/// Why a candidate answer was rejected
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaViolation {
    pub errors: Vec<String>,
}

impl SchemaViolation {
    fn single(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.errors.join("; "))
    }
}

impl std::error::Error for SchemaViolation {}

/// Compiled schemas, one per intent
pub struct IntentSchemas {
    compiled: HashMap<QueryIntent, JSONSchema>,
}

impl IntentSchemas {
    pub fn new() -> Result<Self, LlmError> {
        let mut compiled = HashMap::new();
        for intent in QueryIntent::ALL {
            let schema = JSONSchema::compile(Self::schema_json(intent)).map_err(|e| {
                LlmError::Configuration(format!("Invalid {} schema: {}", intent, e))
            })?;
            compiled.insert(intent, schema);
        }
        Ok(Self { compiled })
    }

    pub fn schema_json(intent: QueryIntent) -> &'static Value {
        match intent {
            QueryIntent::Concept => &CONCEPT_SCHEMA,
            QueryIntent::Anomaly => &ANOMALY_SCHEMA,
            QueryIntent::Procedure => &PROCEDURE_SCHEMA,
            QueryIntent::ToolCommand => &TOOL_COMMAND_SCHEMA,
        }
    }

    /// Validate and convert a parsed answer
    pub fn validate(&self, intent: QueryIntent, value: &Value) -> Result<ResponseBody, SchemaViolation> {
        let schema = self
            .compiled
            .get(&intent)
            .ok_or_else(|| SchemaViolation::single(format!("No schema for {}", intent)))?;

        if let Err(errors) = schema.validate(value) {
            let errors: Vec<String> = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{}: {}", path, e)
                    }
                })
                .collect();
            return Err(SchemaViolation { errors });
        }

        let body = match intent {
            QueryIntent::Concept => ResponseBody::Concept(deserialize::<ConceptAnswer>(value)?),
            QueryIntent::Anomaly => ResponseBody::Anomaly(deserialize::<AnomalyAnswer>(value)?),
            QueryIntent::Procedure => {
                let answer = deserialize::<ProcedureAnswer>(value)?;
                check_step_numbers(&answer)?;
                ResponseBody::Procedure(answer)
            }
            QueryIntent::ToolCommand => ResponseBody::ToolCommand(deserialize::<ToolCommandAnswer>(value)?),
        };
        Ok(body)
    }
}

fn deserialize<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T, SchemaViolation> {
    serde_json::from_value(value.clone()).map_err(|e| SchemaViolation::single(e.to_string()))
}

/// Steps are numbered 1, then strictly increasing
fn check_step_numbers(answer: &ProcedureAnswer) -> Result<(), SchemaViolation> {
    let mut previous = 0;
    for (i, step) in answer.steps.iter().enumerate() {
        if i == 0 && step.number != 1 {
            return Err(SchemaViolation::single(format!(
                "/steps/0/number: first step must be 1, got {}",
                step.number
            )));
        }
        if step.number <= previous {
            return Err(SchemaViolation::single(format!(
                "/steps/{}/number: {} does not follow {}",
                i, step.number, previous
            )));
        }
        previous = step.number;
    }
    Ok(())
}
