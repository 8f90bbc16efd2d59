//! Markdown task-file format (§6.1): a pipe-delimited table with column
//! order `id | description | status | assignee`. Parsing tolerates
//! whitespace and blank lines and rejects an unrecognized header; rendering
//! preserves any preamble above the table and replaces only the table
//! region, so a Drake's re-write never clobbers hand-authored notes.

use std::collections::HashMap;
use std::str::FromStr;

use crate::domain::{Task, TaskStatus};

const HEADER_COLUMNS: [&str; 4] = ["id", "description", "status", "assignee"];

#[derive(Debug, thiserror::Error)]
pub enum TaskFileError {
    #[error("no task table found")]
    MissingTable,
    #[error("unrecognized table header: {0}")]
    UnrecognizedHeader(String),
    #[error("malformed row: {0}")]
    MalformedRow(String),
}

/// The markdown-persisted subset of a [`Task`]'s fields. The rest (priority,
/// assigned agent type, spec version, dependency level, dependencies) are
/// not table columns; they live only in the in-memory tracker and
/// `analysis.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    pub assignee: String,
}

pub struct ParsedTaskFile {
    pub preamble: String,
    pub rows: Vec<TaskRow>,
}

pub fn parse(content: &str) -> Result<ParsedTaskFile, TaskFileError> {
    let lines: Vec<&str> = content.lines().collect();
    let header_idx = lines.iter().position(|l| is_table_row(l)).ok_or(TaskFileError::MissingTable)?;

    let header_cells = split_row(lines[header_idx]);
    let matches_header = header_cells.len() == HEADER_COLUMNS.len()
        && header_cells.iter().map(|c| c.to_ascii_lowercase()).zip(HEADER_COLUMNS.iter()).all(|(a, b)| a == *b);
    if !matches_header {
        return Err(TaskFileError::UnrecognizedHeader(lines[header_idx].to_string()));
    }

    let preamble = lines[..header_idx].join("\n");

    let mut idx = header_idx + 1;
    if lines.get(idx).map(|l| is_separator_row(l)).unwrap_or(false) {
        idx += 1;
    }

    let mut rows = Vec::new();
    for line in &lines[idx..] {
        if line.trim().is_empty() {
            continue;
        }
        if !is_table_row(line) {
            continue;
        }
        let cells = split_row(line);
        if cells.len() != HEADER_COLUMNS.len() {
            return Err(TaskFileError::MalformedRow(line.to_string()));
        }
        let status = TaskStatus::from_str(&cells[2]).map_err(|_| TaskFileError::MalformedRow(line.to_string()))?;
        rows.push(TaskRow { id: cells[0].clone(), description: cells[1].clone(), status, assignee: cells[3].clone() });
    }

    Ok(ParsedTaskFile { preamble, rows })
}

fn is_table_row(line: &str) -> bool {
    line.trim_start().starts_with('|')
}

fn is_separator_row(line: &str) -> bool {
    is_table_row(line) && line.chars().all(|c| matches!(c, '|' | '-' | ' ' | ':'))
}

fn split_row(line: &str) -> Vec<String> {
    let trimmed = line.trim().trim_start_matches('|').trim_end_matches('|');
    trimmed.split('|').map(|c| c.trim().to_string()).collect()
}

/// Renders `rows` back into a task file, keeping `preamble` verbatim above
/// the table.
pub fn render(preamble: &str, rows: &[TaskRow]) -> String {
    let mut out = String::new();
    if !preamble.trim().is_empty() {
        out.push_str(preamble.trim_end());
        out.push_str("\n\n");
    }
    out.push_str("| id | description | status | assignee |\n");
    out.push_str("|---|---|---|---|\n");
    for row in rows {
        out.push_str(&format!("| {} | {} | {} | {} |\n", row.id, row.description, row.status, row.assignee));
    }
    out
}

pub fn rows_from_tasks(tasks: &[Task]) -> Vec<TaskRow> {
    let mut rows: Vec<TaskRow> =
        tasks.iter().map(|t| TaskRow { id: t.id.clone(), description: t.description.clone(), status: t.status, assignee: t.assignee.clone() }).collect();
    rows.sort_by(|a, b| a.id.cmp(&b.id));
    rows
}

/// Reconciles rows just read from disk (possibly hand-edited) against the
/// fuller `Task`s already known to the tracker. Known ids keep their
/// non-markdown fields and take description/status/assignee from the row;
/// unknown ids (hand-added to the file) become fresh tasks with default
/// priority and an empty spec version.
pub fn merge_rows_into_tasks(existing: &[Task], rows: &[TaskRow]) -> Vec<Task> {
    let mut by_id: HashMap<&str, &Task> = existing.iter().map(|t| (t.id.as_str(), t)).collect();
    rows.iter()
        .map(|row| match by_id.remove(row.id.as_str()) {
            Some(t) => Task { description: row.description.clone(), status: row.status, assignee: row.assignee.clone(), ..t.clone() },
            None => {
                let mut t = Task::new(row.id.clone(), row.description.clone(), String::new());
                t.status = row.status;
                t.assignee = row.assignee.clone();
                t
            }
        })
        .collect()
}
