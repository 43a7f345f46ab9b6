// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-schema validation for tasks and builder results.
//!
//! Default schemas are embedded at compile time; a workspace can override
//! them with files under `schemas/`. Validation failures are typed so the
//! state machine can pick the matching stop/blocked code.

use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Raw schema sources embedded at compile time.
pub static TASK_SCHEMA_RAW: &str = include_str!("../schemas/task.schema.json");
pub static BUILDER_RESULT_SCHEMA_RAW: &str =
    include_str!("../schemas/builder-result.schema.json");

static TASK_SCHEMA: Lazy<JSONSchema> = Lazy::new(|| compile("task", TASK_SCHEMA_RAW));
static BUILDER_RESULT_SCHEMA: Lazy<JSONSchema> =
    Lazy::new(|| compile("builder-result", BUILDER_RESULT_SCHEMA_RAW));

#[allow(clippy::expect_used)]
fn compile(name: &str, raw: &str) -> JSONSchema {
    let parsed: Value = serde_json::from_str(raw)
        .expect("embedded schema is valid JSON; checked by schema tests");
    debug!(schema = name, "compiling embedded schema");
    JSONSchema::compile(&parsed).expect("embedded schema compiles; checked by schema tests")
}

/// Why a raw agent payload could not be turned into a typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailureKind {
    /// Not JSON at all (or no object could be extracted).
    JsonParse,
    /// JSON, but the schema rejected it.
    Schema,
    /// Schema-valid JSON that still violates a structural invariant.
    Shape,
}

impl ParseFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseFailureKind::JsonParse => "json_parse",
            ParseFailureKind::Schema => "schema",
            ParseFailureKind::Shape => "shape",
        }
    }
}

/// A typed parse/validation failure with detail messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub kind: ParseFailureKind,
    pub message: String,
    pub details: Vec<String>,
}

impl ParseFailure {
    pub fn new(kind: ParseFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }
}

fn validate_against(
    schema: &JSONSchema,
    override_path: Option<&Path>,
    value: &Value,
) -> Result<(), ParseFailure> {
    // Workspace override, compiled per call; overrides are rare and small.
    if let Some(path) = override_path {
        if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                ParseFailure::new(
                    ParseFailureKind::Schema,
                    format!("cannot read schema override {}: {e}", path.display()),
                )
            })?;
            let parsed: Value = serde_json::from_str(&raw).map_err(|e| {
                ParseFailure::new(
                    ParseFailureKind::Schema,
                    format!("schema override {} is not JSON: {e}", path.display()),
                )
            })?;
            let compiled = JSONSchema::compile(&parsed).map_err(|e| {
                ParseFailure::new(
                    ParseFailureKind::Schema,
                    format!("schema override {} does not compile: {e}", path.display()),
                )
            })?;
            return collect_errors(&compiled, value);
        }
    }
    collect_errors(schema, value)
}

fn collect_errors(schema: &JSONSchema, value: &Value) -> Result<(), ParseFailure> {
    let result = schema.validate(value);
    match result {
        Ok(()) => Ok(()),
        Err(errors) => {
            let details: Vec<String> = errors
                .map(|e| format!("{}: {}", e.instance_path, e))
                .collect();
            Err(
                ParseFailure::new(ParseFailureKind::Schema, "schema validation failed")
                    .with_details(details),
            )
        }
    }
}

/// Validate a raw task payload against the task schema.
pub fn validate_task(value: &Value, override_path: Option<&Path>) -> Result<(), ParseFailure> {
    validate_against(&TASK_SCHEMA, override_path, value)
}

/// Validate a raw builder result against the builder-result schema.
pub fn validate_builder_result(
    value: &Value,
    override_path: Option<&Path>,
) -> Result<(), ParseFailure> {
    validate_against(&BUILDER_RESULT_SCHEMA, override_path, value)
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
