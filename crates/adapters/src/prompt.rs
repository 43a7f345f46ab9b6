// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt template loading and `{{placeholder}}` interpolation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to read prompt {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Load a prompt template file.
pub fn load_prompt(path: &Path) -> Result<String, PromptError> {
    std::fs::read_to_string(path).map_err(|source| PromptError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Substitute `{{name}}` placeholders from `values`.
///
/// Unknown placeholders are left intact so a template typo is visible in
/// the rendered prompt rather than silently dropped.
pub fn interpolate(template: &str, values: &BTreeMap<String, String>) -> String {
    let mut rendered = template.to_string();
    for (name, value) in values {
        rendered = rendered.replace(&format!("{{{{{name}}}}}"), value);
    }
    rendered
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
