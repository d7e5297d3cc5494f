//! workspace_search tool - regex search using the ripgrep libraries

use async_trait::async_trait;
use glob::{MatchOptions, Pattern};
use grep_matcher::Matcher;
use grep_regex::{RegexMatcher, RegexMatcherBuilder};
use grep_searcher::sinks::UTF8;
use grep_searcher::{BinaryDetection, SearcherBuilder};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;
use walkdir::WalkDir;

use crate::tools::{Tool, ToolContext, ToolError, ToolResult, parse_args};

const DEFAULT_GLOB: &str = "**/*";

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Search workspace files for a regex
pub struct SearchTool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    glob: Option<String>,
}

#[derive(Debug)]
struct SearchMatch {
    file: String,
    line: u64,
    text: String,
}

/// Collect matches of `matcher` in one file, stopping once `budget` is used up
///
/// Returns `None` when the file is binary or not valid UTF-8.
fn search_file(matcher: &RegexMatcher, path: &std::path::Path, file: &str, budget: usize) -> Option<Vec<SearchMatch>> {
    let mut found = Vec::new();
    let mut searcher = SearcherBuilder::new()
        .binary_detection(BinaryDetection::quit(b'\x00'))
        .line_number(true)
        .build();

    let outcome = searcher.search_path(
        matcher,
        path,
        UTF8(|line_num, line| {
            matcher
                .find_iter(line.as_bytes(), |m| {
                    found.push(SearchMatch {
                        file: file.to_string(),
                        line: line_num,
                        text: String::from_utf8_lossy(&line.as_bytes()[m.start()..m.end()]).into_owned(),
                    });
                    found.len() < budget
                })
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            Ok(found.len() < budget)
        }),
    );

    match outcome {
        Ok(()) => Some(found),
        Err(e) => {
            debug!(%file, error = %e, "search_file: skipping unreadable file");
            None
        }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &'static str {
        "workspace_search"
    }

    fn description(&self) -> &'static str {
        "Search for a regex pattern in files"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Regex pattern to search for"},
                "glob": {"type": "string", "description": "Glob over workspace-relative paths (default '**/*')"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: &Map<String, Value>, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        debug!(?input, "SearchTool::execute: called");
        let args: SearchArgs = match parse_args(self.name(), input) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };

        let matcher = match RegexMatcherBuilder::new().build(&args.query) {
            Ok(m) => m,
            Err(e) => {
                debug!(%e, "SearchTool::execute: invalid regex pattern");
                return Ok(ToolResult::error(format!("invalid regex: {}", e)));
            }
        };

        let glob = args.glob.as_deref().unwrap_or(DEFAULT_GLOB);
        let pattern = match Pattern::new(glob) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(format!("invalid glob: {}", e))),
        };

        let cap = ctx.limits.search_max_matches;
        if cap == 0 {
            return Ok(ToolResult::ok(json!({ "matches": [], "truncated": true })));
        }
        let mut matches: Vec<SearchMatch> = Vec::new();
        let mut truncated = false;

        let files = WalkDir::new(&ctx.workspace_root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || e.file_name() != ".git")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file());

        for entry in files {
            let relative = ctx.relative(entry.path());
            if !pattern.matches_with(&relative, GLOB_OPTIONS) {
                continue;
            }
            let Some(found) = search_file(&matcher, entry.path(), &relative, cap - matches.len()) else {
                continue;
            };
            matches.extend(found);
            if matches.len() >= cap {
                debug!(cap, "SearchTool::execute: match cap reached");
                truncated = true;
                break;
            }
        }

        debug!(count = matches.len(), truncated, "SearchTool::execute: done");
        let matches: Vec<Value> = matches
            .into_iter()
            .map(|m| json!({"file": m.file, "line": m.line, "match": m.text}))
            .collect();
        Ok(ToolResult::ok(json!({ "matches": matches, "truncated": truncated })))
    }
}
