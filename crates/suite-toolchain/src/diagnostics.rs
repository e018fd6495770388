//! Normalise tool output into file/line/message diagnostics.
//!
//! Supported formats:
//! - tsc: `src/a.ts(10,5): error TS2322: message`
//! - ESLint stylish (file header line, then `  10:5  error  message  rule`)
//! - ESLint `--format json`
//! - jest / vitest / istanbul coverage summaries
//! - jest failure headers (`● Suite › case`)

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Severity of a normalised diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// One actionable finding reported by a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
    /// Tool-specific code (`TS2322`, `no-unused-vars`, ...).
    pub rule: Option<String>,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn error(file: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            column: 0,
            message: message.into(),
            rule: None,
            severity: Severity::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}: {}", self.file, self.line, self.column, self.message)?;
        if let Some(rule) = &self.rule {
            write!(f, " [{}]", rule)?;
        }
        Ok(())
    }
}

fn tsc_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(.+?)\((\d+),(\d+)\):\s*error\s+(TS\d+):\s*(.+?)\s*$")
            .unwrap_or_else(|e| unreachable!("tsc pattern is valid: {e}"))
    })
}

fn stylish_entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s+(\d+):(\d+)\s+(error|warning)\s+(.+?)(?:\s{2,}(\S+))?\s*$")
            .unwrap_or_else(|e| unreachable!("stylish pattern is valid: {e}"))
    })
}

fn coverage_table_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // | % Stmts | % Branch | % Funcs | % Lines | -> take the Lines column
        Regex::new(r"(?m)^\s*All files\s*\|\s*([\d.]+)\s*\|\s*([\d.]+)\s*\|\s*([\d.]+)\s*\|\s*([\d.]+)")
            .unwrap_or_else(|e| unreachable!("coverage table pattern is valid: {e}"))
    })
}

fn coverage_summary_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*Lines\s*:\s*([\d.]+)%")
            .unwrap_or_else(|e| unreachable!("coverage summary pattern is valid: {e}"))
    })
}

fn jest_failure_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*●\s+(.+?)\s*$")
            .unwrap_or_else(|e| unreachable!("jest failure pattern is valid: {e}"))
    })
}

fn jest_location_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\(([^()\s]+?\.[cm]?[jt]sx?):(\d+):(\d+)\)")
            .unwrap_or_else(|e| unreachable!("jest location pattern is valid: {e}"))
    })
}

/// Parse tsc diagnostics.
pub fn parse_tsc_output(output: &str) -> Vec<Diagnostic> {
    tsc_regex()
        .captures_iter(output)
        .map(|cap| Diagnostic {
            file: cap[1].trim().to_string(),
            line: cap[2].parse().unwrap_or(0),
            column: cap[3].parse().unwrap_or(0),
            rule: Some(cap[4].to_string()),
            message: cap[5].to_string(),
            severity: Severity::Error,
        })
        .collect()
}

/// Parse ESLint output in either JSON or stylish format.
pub fn parse_eslint_output(output: &str) -> Vec<Diagnostic> {
    if let Some(json) = extract_json_array(output) {
        if let Some(diags) = parse_eslint_json(json) {
            return diags;
        }
    }
    parse_eslint_stylish(output)
}

/// ESLint JSON output may be preceded by package-manager banner lines.
fn extract_json_array(output: &str) -> Option<&str> {
    let start = output.find("[{").or_else(|| {
        let t = output.trim();
        (t == "[]").then(|| output.find('[')).flatten()
    })?;
    let end = output.rfind(']')?;
    (end > start).then(|| &output[start..=end])
}

fn parse_eslint_json(json: &str) -> Option<Vec<Diagnostic>> {
    let files: Vec<serde_json::Value> = serde_json::from_str(json).ok()?;
    let mut diags = Vec::new();
    for file in files {
        let path = file["filePath"].as_str().unwrap_or("").to_string();
        let Some(messages) = file["messages"].as_array() else {
            continue;
        };
        for msg in messages {
            let severity = match msg["severity"].as_u64() {
                Some(2) => Severity::Error,
                _ => Severity::Warning,
            };
            diags.push(Diagnostic {
                file: path.clone(),
                line: msg["line"].as_u64().unwrap_or(0) as u32,
                column: msg["column"].as_u64().unwrap_or(0) as u32,
                message: msg["message"].as_str().unwrap_or("").to_string(),
                rule: msg["ruleId"].as_str().map(str::to_string),
                severity,
            });
        }
    }
    Some(diags)
}

fn parse_eslint_stylish(output: &str) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    let mut current_file: Option<String> = None;

    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(cap) = stylish_entry_regex().captures(line) {
            let Some(file) = &current_file else {
                continue;
            };
            let severity = if &cap[3] == "error" {
                Severity::Error
            } else {
                Severity::Warning
            };
            diags.push(Diagnostic {
                file: file.clone(),
                line: cap[1].parse().unwrap_or(0),
                column: cap[2].parse().unwrap_or(0),
                message: cap[4].trim().to_string(),
                rule: cap.get(5).map(|m| m.as_str().to_string()),
                severity,
            });
        } else if !line.starts_with(char::is_whitespace)
            && !line.starts_with('✖')
            && !line.starts_with('>')
            && (line.contains('/') || line.contains('\\') || line.contains('.'))
        {
            current_file = Some(line.trim().to_string());
        }
    }
    diags
}

/// Line coverage percentage (0-100) from a coverage summary, if present.
pub fn parse_coverage(output: &str) -> Option<f64> {
    if let Some(cap) = coverage_table_regex().captures(output) {
        return cap[4].parse::<f64>().ok().map(|v| v.clamp(0.0, 100.0));
    }
    coverage_summary_regex()
        .captures(output)
        .and_then(|cap| cap[1].parse::<f64>().ok())
        .map(|v| v.clamp(0.0, 100.0))
}

/// Failing test cases from jest/vitest output.
pub fn parse_test_failures(output: &str) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    let headers: Vec<_> = jest_failure_regex().captures_iter(output).collect();

    for (idx, cap) in headers.iter().enumerate() {
        let title = cap[1].to_string();
        if title.starts_with("Test suite failed to run") && headers.len() > 1 {
            continue;
        }
        let whole = cap.get(0).map(|m| m.end()).unwrap_or(0);
        let next = headers
            .get(idx + 1)
            .and_then(|c| c.get(0))
            .map(|m| m.start())
            .unwrap_or(output.len());
        let body = &output[whole..next];

        let (file, line, column) = jest_location_regex()
            .captures(body)
            .map(|loc| {
                (
                    loc[1].to_string(),
                    loc[2].parse().unwrap_or(0),
                    loc[3].parse().unwrap_or(0),
                )
            })
            .unwrap_or_else(|| (String::new(), 0, 0));

        diags.push(Diagnostic {
            file,
            line,
            column,
            message: title,
            rule: None,
            severity: Severity::Error,
        });
    }
    diags
}
