//! Unified-diff extraction and validation

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::{ArtifactPolicyResult, ArtifactReason, normalize_newlines};

const DIFF_HEADER: &str = "diff --git ";

/// Line prefixes that belong to a diff outside hunk bodies
const HEADER_PREFIXES: &[&str] = &[
    DIFF_HEADER,
    "index ",
    "--- ",
    "+++ ",
    "@@",
    "new file mode ",
    "deleted file mode ",
    "old mode ",
    "new mode ",
    "rename from ",
    "rename to ",
    "similarity index ",
    "dissimilarity index ",
    "Binary files ",
    "\\ No newline at end of file",
];

struct PatchPatterns {
    fence: Regex,
    old_file: Regex,
    new_file: Regex,
    hunk: Regex,
}

static PATTERNS: LazyLock<PatchPatterns> = LazyLock::new(|| PatchPatterns {
    fence: Regex::new(r"(?i)```(?:diff|patch)?\s*([\s\S]*?)```").expect("fence pattern"),
    old_file: Regex::new(r"(?m)^---\s+.+$").expect("old file pattern"),
    new_file: Regex::new(r"(?m)^\+\+\+\s+.+$").expect("new file pattern"),
    hunk: Regex::new(r"(?m)^@@\s+.+\s+@@").expect("hunk pattern"),
});

pub(super) fn normalize_patch(raw: &str) -> ArtifactPolicyResult {
    let normalized = normalize_newlines(raw);
    let text = normalized.trim();
    if text.is_empty() {
        return ArtifactPolicyResult::rejected(ArtifactReason::EmptyOutput);
    }

    let Some(candidate) = extract_diff_candidate(text) else {
        return ArtifactPolicyResult::rejected(ArtifactReason::NoDiffFound);
    };

    let sanitized = truncate_non_patch_tail(candidate);
    let candidate = sanitized.trim();
    if let Some(reason) = validate(candidate) {
        debug!(%reason, "normalize_patch: rejected");
        return ArtifactPolicyResult::rejected(reason);
    }

    let mut artifact = candidate.to_string();
    artifact.push('\n');
    ArtifactPolicyResult::accepted(artifact)
}

fn validate(candidate: &str) -> Option<ArtifactReason> {
    let patterns = &*PATTERNS;
    if candidate.is_empty() {
        Some(ArtifactReason::EmptyAfterSanitize)
    } else if !candidate.starts_with(DIFF_HEADER) {
        Some(ArtifactReason::MissingDiffHeader)
    } else if !patterns.old_file.is_match(candidate) {
        Some(ArtifactReason::MissingOldFileHeader)
    } else if !patterns.new_file.is_match(candidate) {
        Some(ArtifactReason::MissingNewFileHeader)
    } else if !patterns.hunk.is_match(candidate) {
        Some(ArtifactReason::MissingHunkHeader)
    } else {
        None
    }
}

/// Locate the first diff in model output
///
/// Text that already starts with a diff header is taken whole. Otherwise a
/// diff inside a fenced block wins over one in the surrounding prose.
fn extract_diff_candidate(text: &str) -> Option<&str> {
    if text.starts_with(DIFF_HEADER) {
        return Some(text);
    }

    for captures in PATTERNS.fence.captures_iter(text) {
        let Some(body) = captures.get(1) else {
            continue;
        };
        let body = body.as_str().trim();
        if let Some(index) = body.find(DIFF_HEADER) {
            debug!("extract_diff_candidate: found fenced diff");
            return Some(&body[index..]);
        }
    }

    text.find(DIFF_HEADER).map(|index| &text[index..])
}

/// Keep diff lines; drop everything after the first non-diff line that follows hunk content
fn truncate_non_patch_tail(candidate: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut saw_diff = false;
    let mut saw_body = false;

    for line in candidate.lines() {
        if line.starts_with(DIFF_HEADER) {
            saw_diff = true;
            kept.push(line);
            continue;
        }
        if !saw_diff {
            continue;
        }
        if line.is_empty() {
            kept.push(line);
            continue;
        }
        if line.starts_with(['+', '-', ' ']) {
            saw_body = true;
            kept.push(line);
            continue;
        }
        if HEADER_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) {
            kept.push(line);
            continue;
        }
        if saw_body {
            break;
        }
        kept.push(line);
    }

    kept.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::normalize;
    use crate::domain::OutputType;
    use proptest::prelude::*;

    const PATCH: &str = "diff --git a/example.py b/example.py\n\
                         index 1111111..2222222 100644\n\
                         --- a/example.py\n\
                         +++ b/example.py\n\
                         @@ -1 +1 @@\n\
                         -old\n\
                         +new\n";

    #[test]
    fn test_accepts_plain_diff_unchanged() {
        let result = normalize(PATCH, OutputType::Patch);
        assert!(result.valid);
        assert_eq!(result.reason, ArtifactReason::Ok);
        assert_eq!(result.artifact, PATCH);
    }

    #[test]
    fn test_minimal_diff_gets_single_trailing_newline() {
        let result = normalize("diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n\n\n", OutputType::Patch);
        assert!(result.valid);
        assert!(result.artifact.ends_with("+b\n"));
        assert!(!result.artifact.ends_with("\n\n"));
    }

    #[test]
    fn test_extracts_fenced_diff_from_chatter() {
        let raw = format!("I will investigate now.\n\n```diff\n{}```\nMore explanation.\n", PATCH);
        let result = normalize(&raw, OutputType::Patch);
        assert!(result.valid);
        assert!(result.artifact.starts_with("diff --git a/example.py b/example.py\n"));
        assert!(!result.artifact.contains("More explanation."));
    }

    #[test]
    fn test_fenced_diff_preferred_over_prose() {
        let raw = "mentions diff --git in passing\n```patch\ndiff --git a/y b/y\n--- a/y\n+++ b/y\n@@ -1 +1 @@\n-1\n+2\n```";
        let result = normalize(raw, OutputType::Patch);
        assert!(result.valid);
        assert!(result.artifact.starts_with("diff --git a/y b/y"));
    }

    #[test]
    fn test_unfenced_diff_after_prose() {
        let raw = format!("Here is the fix:\n{}", PATCH);
        let result = normalize(&raw, OutputType::Patch);
        assert!(result.valid);
        assert_eq!(result.artifact, PATCH);
    }

    #[test]
    fn test_trailing_commentary_is_dropped() {
        let raw = format!("{}Hope this helps!\nmore text", PATCH);
        let result = normalize(&raw, OutputType::Patch);
        assert!(result.valid);
        assert_eq!(result.artifact, PATCH);
    }

    #[test]
    fn test_crlf_is_normalized() {
        let raw = PATCH.replace('\n', "\r\n");
        let result = normalize(&raw, OutputType::Patch);
        assert!(result.valid);
        assert_eq!(result.artifact, PATCH);
    }

    #[test]
    fn test_rejects_non_diff_text() {
        let result = normalize("Let me inspect files first with workspace_list.", OutputType::Patch);
        assert!(!result.valid);
        assert_eq!(result.artifact, "");
        assert_eq!(result.reason, ArtifactReason::NoDiffFound);
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(normalize(" \r\n ", OutputType::Patch).reason, ArtifactReason::EmptyOutput);
    }

    #[test]
    fn test_missing_headers() {
        let cases = [
            ("diff --git a/x b/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b", ArtifactReason::MissingOldFileHeader),
            ("diff --git a/x b/x\n--- a/x\n@@ -1 +1 @@\n-a\n+b", ArtifactReason::MissingNewFileHeader),
            ("diff --git a/x b/x\n--- a/x\n+++ b/x\n", ArtifactReason::MissingHunkHeader),
        ];
        for (raw, reason) in cases {
            let result = normalize(raw, OutputType::Patch);
            assert!(!result.valid, "{raw}");
            assert_eq!(result.reason, reason, "{raw}");
            assert_eq!(result.artifact, "");
        }
    }

    #[test]
    fn test_rename_and_mode_lines_are_kept() {
        let raw = "diff --git a/old b/new\nsimilarity index 90%\nrename from old\nrename to new\n--- a/old\n+++ b/new\n@@ -1 +1 @@\n-a\n+b\n\\ No newline at end of file\n";
        let result = normalize(raw, OutputType::Patch);
        assert!(result.valid);
        assert!(result.artifact.contains("rename from old\n"));
        assert!(result.artifact.ends_with("\\ No newline at end of file\n"));
    }

    proptest! {
        #[test]
        fn prop_valid_patches_end_with_one_newline(trailer in "[ \n\r\t]{0,8}", prefix in "[a-zA-Z ,.]{0,40}") {
            let raw = format!("{}\n{}{}", prefix, PATCH, trailer);
            let result = normalize(&raw, OutputType::Patch);
            prop_assert!(result.valid);
            prop_assert!(result.artifact.ends_with('\n'));
            prop_assert!(!result.artifact.ends_with("\n\n"));
            prop_assert!(result.artifact.starts_with(DIFF_HEADER));
        }

        #[test]
        fn prop_rejected_patches_have_empty_artifact(raw in "\\PC{0,200}") {
            let result = normalize(&raw, OutputType::Patch);
            prop_assert_eq!(result.valid, result.reason == ArtifactReason::Ok);
            if !result.valid {
                prop_assert_eq!(result.artifact, "");
            }
        }

        #[test]
        fn prop_text_never_rejects(raw in "\\PC{0,200}") {
            let result = normalize(&raw, OutputType::Text);
            prop_assert!(result.valid);
            prop_assert!(!result.artifact.contains('\r'));
        }
    }
}
