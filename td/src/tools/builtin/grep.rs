//! grep tool - search files using ripgrep (§4.2)

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::process::Command;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Search for patterns in files using ripgrep
pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &'static str {
        "grep"
    }

    fn description(&self) -> &'static str {
        "Search for patterns in files using ripgrep. Returns matching lines with context."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regex pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "Path to search in (relative to project workspace, default: '.')",
                    "default": "."
                },
                "file_pattern": {
                    "type": "string",
                    "description": "Glob pattern to filter files (e.g., '*.rs', '*.py')"
                },
                "context_lines": {
                    "type": "integer",
                    "description": "Number of context lines before and after match (default: 2)",
                    "default": 2
                },
                "case_insensitive": {
                    "type": "boolean",
                    "description": "Case-insensitive search (default: false)",
                    "default": false
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default: 50)",
                    "default": 50
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let pattern = match input.get("pattern").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolResult::error("Missing required parameter: pattern"),
        };

        let path = input.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let file_pattern = input.get("file_pattern").and_then(|v| v.as_str());
        let context_lines = input.get("context_lines").and_then(|v| v.as_u64()).unwrap_or(2) as usize;
        let case_insensitive = input.get("case_insensitive").and_then(|v| v.as_bool()).unwrap_or(false);
        let max_results = input.get("max_results").and_then(|v| v.as_u64()).unwrap_or(50) as usize;

        let search_path = match ctx.validate_path(std::path::Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid path: {e}")),
        };

        let rg_check = Command::new("which").arg("rg").output().await;
        if rg_check.is_err() || !rg_check.unwrap().status.success() {
            return ToolResult::error(
                "ripgrep (rg) not found. Install with: brew install ripgrep (macOS) or apt install ripgrep (Linux)",
            );
        }

        let mut cmd = Command::new("rg");
        cmd.arg("--line-number").arg("--no-heading").arg("--color=never");
        if context_lines > 0 {
            cmd.arg(format!("-C{context_lines}"));
        }
        if case_insensitive {
            cmd.arg("-i");
        }
        cmd.arg(format!("--max-count={max_results}"));
        if let Some(fp) = file_pattern {
            cmd.arg("--glob").arg(fp);
        }
        cmd.arg(pattern);
        cmd.arg(&search_path);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).current_dir(&ctx.workspace);

        let output = match cmd.output().await {
            Ok(o) => o,
            Err(e) => return ToolResult::error(format!("Failed to execute ripgrep: {e}")),
        };

        match output.status.code() {
            Some(0) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                ToolResult::success(truncate_output(&stdout, max_results))
            }
            Some(1) => ToolResult::success("No matches found."),
            Some(2) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                ToolResult::error(format!("ripgrep error: {stderr}"))
            }
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                ToolResult::error(format!("ripgrep failed: {stderr}"))
            }
        }
    }
}

fn truncate_output(output: &str, max_results: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let mut match_count = 0;
    let mut include_until = lines.len();

    for (i, line) in lines.iter().enumerate() {
        if line.contains(':') && !line.starts_with('-') && !line.starts_with("--") {
            match_count += 1;
            if match_count >= max_results {
                include_until = (i + 5).min(lines.len());
                break;
            }
        }
    }

    let result: String = lines[..include_until].join("\n");
    if include_until < lines.len() {
        format!("{result}\n\n... (truncated, {max_results} matches shown)")
    } else {
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::fs;

    #[tokio::test]
    async fn grep_basic() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "task".to_string());
        let test_file = temp.path().join("test.txt");
        fs::write(&test_file, "hello world\nfoo bar\nhello again").await.unwrap();

        let result = GrepTool.execute(json!({"pattern": "hello", "path": "."}), &ctx).await;

        if !result.is_error || !result.content.contains("ripgrep (rg) not found") {
            assert!(result.content.contains("hello") || result.content.contains("No matches"));
        }
    }

    #[test]
    fn truncate_output_keeps_first_n_matches() {
        let output = "file.rs:1:match1\nfile.rs:2:match2\nfile.rs:3:match3";
        let truncated = truncate_output(output, 2);
        assert!(truncated.contains("match1"));
        assert!(truncated.contains("match2"));
    }
}
