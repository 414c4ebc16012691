// QC report: findings grouped by file, then by rule kind

use super::rules::{RuleKind, Severity};
use super::scanner::{Finding, Rule};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleGroup {
    pub rule: RuleKind,
    pub severity: Severity,
    pub count: usize,
    pub findings: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub path: String,
    /// Highest severity among this file's findings
    pub severity: Severity,
    pub count: usize,
    pub rules: Vec<RuleGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_scanned: Option<usize>,
    pub files_with_findings: usize,
    pub total_findings: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_rule: BTreeMap<RuleKind, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub summary: Summary,
    pub files: Vec<FileReport>,
}

/// Group `findings` by file (sorted by path) and by rule kind (evaluation order)
pub fn generate<I>(findings: I) -> Report
where
    I: IntoIterator<Item = Finding>,
{
    let mut by_file: BTreeMap<String, BTreeMap<RuleKind, RuleGroup>> = BTreeMap::new();
    let mut summary = Summary::default();

    for finding in findings {
        let kind = finding.kind();
        summary.total_findings += 1;
        *summary.by_severity.entry(finding.severity).or_default() += 1;
        *summary.by_rule.entry(kind).or_default() += 1;

        let group = by_file
            .entry(finding.path.display().to_string())
            .or_default()
            .entry(kind)
            .or_insert_with(|| RuleGroup {
                rule: kind,
                severity: finding.severity,
                count: 0,
                findings: Vec::new(),
            });
        group.count += 1;
        group.severity = group.severity.max(finding.severity);
        group.findings.push(finding.rule);
    }

    let files: Vec<FileReport> = by_file
        .into_iter()
        .map(|(path, groups)| {
            let rules: Vec<RuleGroup> = groups.into_values().collect();
            FileReport {
                path,
                severity: rules
                    .iter()
                    .map(|g| g.severity)
                    .max()
                    .unwrap_or(Severity::Info),
                count: rules.iter().map(|g| g.count).sum(),
                rules,
            }
        })
        .collect();
    summary.files_with_findings = files.len();

    Report { summary, files }
}

impl Report {
    pub fn with_files_scanned(mut self, files_scanned: usize) -> Self {
        self.summary.files_scanned = Some(files_scanned);
        self
    }

    pub fn is_clean(&self) -> bool {
        self.files.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text rendering: summary first, then one block per file
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let s = &self.summary;

        out.push_str("QC REPORT\n");
        out.push_str("=========\n\n");
        if let Some(n) = s.files_scanned {
            let _ = writeln!(out, "Files scanned:       {}", n);
        }
        let _ = writeln!(out, "Files with findings: {}", s.files_with_findings);
        let _ = writeln!(out, "Total findings:      {}", s.total_findings);
        for severity in [Severity::Error, Severity::Warning, Severity::Info] {
            let count = s.by_severity.get(&severity).copied().unwrap_or(0);
            let _ = writeln!(out, "  {:<8} {}", severity.name(), count);
        }

        if !s.by_rule.is_empty() {
            out.push_str("\nBy rule:\n");
            for (rule, count) in &s.by_rule {
                let _ = writeln!(out, "  {:<24} {}", rule.name(), count);
            }
        }

        if self.files.is_empty() {
            out.push_str("\nNo issues found.\n");
            return out;
        }

        for file in &self.files {
            let _ = writeln!(out, "\n[{}] {}", file.severity.name().to_uppercase(), file.path);
            for group in &file.rules {
                let _ = writeln!(out, "  {} ({})", group.rule.name(), group.count);
                for rule in &group.findings {
                    let _ = writeln!(out, "    - {}", rule);
                }
            }
        }
        out
    }
}
