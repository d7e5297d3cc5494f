//! Artifact policy module
//!
//! Normalizes and validates the raw text a task produced against the output
//! type the task expects. Never fails; problems are reported through
//! [`ArtifactReason`].

mod patch;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::value::RawValue;
use tracing::debug;

use crate::domain::OutputType;

/// Why an artifact was accepted or rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactReason {
    Ok,
    EmptyOutput,
    NoDiffFound,
    EmptyAfterSanitize,
    MissingDiffHeader,
    MissingOldFileHeader,
    MissingNewFileHeader,
    MissingHunkHeader,
    InvalidJson,
}

impl ArtifactReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::EmptyOutput => "empty_output",
            Self::NoDiffFound => "no_diff_found",
            Self::EmptyAfterSanitize => "empty_after_sanitize",
            Self::MissingDiffHeader => "missing_diff_header",
            Self::MissingOldFileHeader => "missing_old_file_header",
            Self::MissingNewFileHeader => "missing_new_file_header",
            Self::MissingHunkHeader => "missing_hunk_header",
            Self::InvalidJson => "invalid_json",
        }
    }
}

impl std::fmt::Display for ArtifactReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of normalizing one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPolicyResult {
    pub artifact: String,
    pub valid: bool,
    pub reason: ArtifactReason,
}

impl ArtifactPolicyResult {
    fn accepted(artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            valid: true,
            reason: ArtifactReason::Ok,
        }
    }

    fn rejected(reason: ArtifactReason) -> Self {
        Self {
            artifact: String::new(),
            valid: false,
            reason,
        }
    }
}

/// Normalize `raw` according to `output_type`
pub fn normalize(raw: &str, output_type: OutputType) -> ArtifactPolicyResult {
    debug!(%output_type, raw_len = raw.len(), "normalize: called");
    let result = match output_type {
        OutputType::Patch => patch::normalize_patch(raw),
        OutputType::Json => normalize_json(raw),
        OutputType::Text => normalize_text(raw),
    };
    debug!(valid = result.valid, reason = %result.reason, "normalize: done");
    result
}

/// Convert CRLF and lone CR line endings to LF
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn normalize_text(raw: &str) -> ArtifactPolicyResult {
    ArtifactPolicyResult::accepted(normalize_newlines(raw).trim())
}

/// Re-serialize JSON compactly with object keys sorted
fn normalize_json(raw: &str) -> ArtifactPolicyResult {
    let normalized = normalize_newlines(raw);
    let text = normalized.trim();
    if text.is_empty() {
        return ArtifactPolicyResult::rejected(ArtifactReason::EmptyOutput);
    }
    match serde_json::from_str::<Box<RawValue>>(text).and_then(|value| canonical_json(&value)) {
        Ok(canonical) => ArtifactPolicyResult::accepted(canonical),
        Err(e) => {
            debug!(error = %e, "normalize_json: parse failed");
            ArtifactPolicyResult {
                artifact: text.to_string(),
                valid: false,
                reason: ArtifactReason::InvalidJson,
            }
        }
    }
}

/// Canonical text of one JSON value
///
/// Containers are walked as raw values so integers wider than 64 bits keep
/// their exact digits instead of collapsing to `f64`.
fn canonical_json(raw: &RawValue) -> serde_json::Result<String> {
    let text = raw.get().trim();
    match text.as_bytes().first() {
        Some(b'{') => {
            let members: BTreeMap<String, Box<RawValue>> = serde_json::from_str(text)?;
            let mut out = String::from("{");
            for (i, (key, value)) in members.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                out.push_str(&canonical_json(value)?);
            }
            out.push('}');
            Ok(out)
        }
        Some(b'[') => {
            let items: Vec<Box<RawValue>> = serde_json::from_str(text)?;
            let parts = items
                .iter()
                .map(|item| canonical_json(item))
                .collect::<serde_json::Result<Vec<_>>>()?;
            Ok(format!("[{}]", parts.join(",")))
        }
        _ => {
            let value: Value = serde_json::from_str(text)?;
            if value.is_f64() && !text.contains(['.', 'e', 'E']) {
                Ok(text.to_string())
            } else {
                serde_json::to_string(&value)
            }
        }
    }
}
