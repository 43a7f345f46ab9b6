// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON extraction from raw agent output.
//!
//! Agents are asked for pure JSON but often wrap it in prose or fenced
//! code blocks. Extraction tries, in order: direct parse, fenced-block
//! parse, longest balanced-brace scan.

use serde_json::Value;

/// How the JSON was recovered from the raw output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMethod {
    Direct,
    Fenced,
    BalancedScan,
}

impl ExtractMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractMethod::Direct => "direct",
            ExtractMethod::Fenced => "fenced",
            ExtractMethod::BalancedScan => "balanced_scan",
        }
    }
}

/// Extract the first parseable JSON object from `raw`.
pub fn extract_json(raw: &str) -> Option<(Value, ExtractMethod)> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Some((value, ExtractMethod::Direct));
        }
    }

    for block in fenced_blocks(raw) {
        if let Ok(value) = serde_json::from_str::<Value>(block.trim()) {
            if value.is_object() {
                return Some((value, ExtractMethod::Fenced));
            }
        }
    }

    longest_balanced_object(raw)
        .and_then(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .filter(Value::is_object)
        .map(|value| (value, ExtractMethod::BalancedScan))
}

/// Contents of ```-fenced blocks, language tag stripped.
fn fenced_blocks(raw: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = raw;
    while let Some(open) = rest.find("```") {
        let after_open = &rest[open + 3..];
        // Skip the language tag line.
        let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_open[body_start..];
        let Some(close) = body.find("```") else { break };
        blocks.push(&body[..close]);
        rest = &body[close + 3..];
    }
    blocks
}

/// The longest `{...}` substring with balanced braces outside strings.
fn longest_balanced_object(raw: &str) -> Option<&str> {
    let bytes = raw.as_bytes();
    let mut best: Option<(usize, usize)> = None;
    let mut start = None;
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start {
                            let len = i + 1 - s;
                            if best.map_or(true, |(bs, be)| len > be - bs) {
                                best = Some((s, i + 1));
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    best.map(|(s, e)| &raw[s..e])
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
