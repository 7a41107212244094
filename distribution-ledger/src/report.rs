//! Report sink for ledger actions and reconciliation rows
//!
//! The ledgers only ever write to a sink. [`Report`] keeps everything in
//! memory and renders two tables: the action log and the reconciliation rows.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt::Write as _;

/// Write-only destination for audit output
pub trait ReportSink {
    /// Append a free-text audit line
    fn record_action(&mut self, description: String);

    /// Append a reconciliation row
    fn record_reconciliation_row(&mut self, row: ReconciliationRow);

    /// Render everything collected so far
    fn render(&self) -> String;
}

/// Cell of a reconciliation row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ReportValue {
    /// Decimal quantity
    Decimal(Decimal),
    /// Free text (tags, ids)
    Text(String),
    /// Undefined quantity, e.g. a ratio over zero debt
    Missing,
}

impl std::fmt::Display for ReportValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportValue::Decimal(d) => write!(f, "{}", d.normalize()),
            ReportValue::Text(s) => write!(f, "{}", s),
            ReportValue::Missing => write!(f, "-"),
        }
    }
}

impl From<Decimal> for ReportValue {
    fn from(value: Decimal) -> Self {
        ReportValue::Decimal(value)
    }
}

impl From<Option<Decimal>> for ReportValue {
    fn from(value: Option<Decimal>) -> Self {
        value.map_or(ReportValue::Missing, ReportValue::Decimal)
    }
}

impl From<&str> for ReportValue {
    fn from(value: &str) -> Self {
        ReportValue::Text(value.to_string())
    }
}

impl From<String> for ReportValue {
    fn from(value: String) -> Self {
        ReportValue::Text(value)
    }
}

/// Ordered named fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationRow {
    fields: Vec<(String, ReportValue)>,
}

impl ReconciliationRow {
    /// Empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ReportValue>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Field by name
    pub fn get(&self, name: &str) -> Option<&ReportValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Decimal field by name
    pub fn decimal(&self, name: &str) -> Option<Decimal> {
        match self.get(name) {
            Some(ReportValue::Decimal(d)) => Some(*d),
            _ => None,
        }
    }

    /// Fields in insertion order
    pub fn fields(&self) -> &[(String, ReportValue)] {
        &self.fields
    }
}

impl Serialize for ReconciliationRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Audit line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRow {
    /// When the ledger recorded it
    pub recorded_at: DateTime<Utc>,
    /// Description
    pub action: String,
}

/// In-memory report
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    actions: Vec<ActionRow>,
    reconciliation: Vec<ReconciliationRow>,
}

impl Report {
    /// Empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded actions
    pub fn actions(&self) -> &[ActionRow] {
        &self.actions
    }

    /// Recorded reconciliation rows
    pub fn reconciliation_rows(&self) -> &[ReconciliationRow] {
        &self.reconciliation
    }

    /// Serialize both tables as JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl ReportSink for Report {
    fn record_action(&mut self, description: String) {
        self.actions.push(ActionRow {
            recorded_at: Utc::now(),
            action: description,
        });
    }

    fn record_reconciliation_row(&mut self, row: ReconciliationRow) {
        self.reconciliation.push(row);
    }

    fn render(&self) -> String {
        let mut out = String::new();

        let action_rows: Vec<Vec<String>> = self
            .actions
            .iter()
            .map(|a| vec![a.action.clone()])
            .collect();
        render_table(&mut out, &["action".to_string()], &action_rows);
        out.push('\n');

        // Rows from different ledgers carry different fields; the header is
        // the union in first-seen order.
        let mut header: Vec<String> = Vec::new();
        for row in &self.reconciliation {
            for (name, _) in row.fields() {
                if !header.contains(name) {
                    header.push(name.clone());
                }
            }
        }
        let rows: Vec<Vec<String>> = self
            .reconciliation
            .iter()
            .map(|row| {
                header
                    .iter()
                    .map(|name| row.get(name).map(|v| v.to_string()).unwrap_or_default())
                    .collect()
            })
            .collect();
        render_table(&mut out, &header, &rows);

        out
    }
}

fn render_table(out: &mut String, header: &[String], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let border: String = widths
        .iter()
        .map(|w| "-".repeat(w + 2))
        .collect::<Vec<_>>()
        .join("+");
    let _ = writeln!(out, "+{}+", border);
    let _ = writeln!(out, "{}", format_line(header, &widths));
    let _ = writeln!(out, "+{}+", border);
    for row in rows {
        let _ = writeln!(out, "{}", format_line(row, &widths));
    }
    let _ = writeln!(out, "+{}+", border);
}

fn format_line(cells: &[String], widths: &[usize]) -> String {
    let body: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!(" {:<width$} ", cell, width = width))
        .collect();
    format!("|{}|", body.join("|"))
}
