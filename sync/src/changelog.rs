//! Plain-text drift report.

use std::collections::BTreeSet;
use std::fmt;

use crate::reconcile::ReconciliationResult;

/// Reports with this many non-empty lines or fewer are not worth mailing.
const SEND_THRESHOLD: usize = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changelog {
    lines: Vec<String>,
}

impl Changelog {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn text(&self) -> String {
        let mut text = self.lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }

    pub fn line_count(&self) -> usize {
        self.lines.iter().filter(|l| !l.trim().is_empty()).count()
    }

    pub fn is_worth_sending(&self) -> bool {
        self.line_count() > SEND_THRESHOLD
    }
}

impl fmt::Display for Changelog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// `[a, b, c]`
fn bracketed(items: &BTreeSet<String>) -> String {
    let joined: Vec<&str> = items.iter().map(String::as_str).collect();
    format!("[{}]", joined.join(", "))
}

pub fn render(result: &ReconciliationResult) -> Changelog {
    let mut lines = Vec::new();

    if !result.new_tables.is_empty() {
        lines.push("New Datasets:".to_string());
        lines.push(bracketed(&result.new_tables));
        lines.push(String::new());
    }

    for (table, drift) in &result.per_table {
        if !drift.new_columns.is_empty() {
            lines.push(format!("- New columns in {table}: {}", bracketed(&drift.new_columns)));
        }
        if !drift.deleted_columns.is_empty() {
            lines.push(format!(
                "- Deleted columns in {table}: {}",
                bracketed(&drift.deleted_columns)
            ));
        }
    }

    Changelog { lines }
}
