// Reports built from real scans

use xuebox::cancel::CancelToken;
use xuebox::qc::{self, CompatibilityRuleSet, QualityScanner, RuleKind, Severity};

use crate::common::helpers::*;

fn library() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "anime/ep01.mkv", b"");
    write_file(dir.path(), "anime/ep02.mp4", b"");
    write_file(dir.path(), "art/cover.jpg", PNG_HEADER);
    write_file(dir.path(), "art/sticker.webp", b"RIFF\x24\0\0\0WEBPVP8 \x18\0\0\0");
    dir
}

fn scanner() -> QualityScanner<FakeProber> {
    let prober = FakeProber::new(h264_probe(1920, 1080, 5_000_000))
        .with_probe("ep02.mp4", h264_probe(3840, 2160, 40_000_000));
    let rules = CompatibilityRuleSet::default()
        .with_resolution_range(None, Some("1920x1080".parse().unwrap()))
        .unwrap();
    QualityScanner::new(prober, rules)
}

#[test]
fn test_report_is_idempotent() {
    let dir = library();
    let scanner = scanner();

    let first = scanner.scan(dir.path(), &CancelToken::new()).finish();
    let second = scanner.scan(dir.path(), &CancelToken::new()).finish();
    let report_a = qc::generate(first.findings.clone()).with_files_scanned(first.files_scanned);
    let report_b = qc::generate(second.findings).with_files_scanned(second.files_scanned);

    assert_eq!(report_a, report_b);
    assert_eq!(report_a.render_text(), report_b.render_text());
    assert_eq!(report_a.to_json().unwrap(), report_b.to_json().unwrap());
    // Generating from the same findings twice is also stable
    assert_eq!(qc::generate(first.findings.clone()), qc::generate(first.findings));
}

#[test]
fn test_report_summary_for_library() {
    let dir = library();
    let outcome = scanner().scan_parallel(dir.path(), &CancelToken::new(), 4);
    let report = qc::generate(outcome.findings).with_files_scanned(outcome.files_scanned);

    assert_eq!(report.summary.files_scanned, Some(4));
    assert_eq!(report.summary.files_with_findings, 4);
    assert_eq!(report.summary.total_findings, 4);
    assert_eq!(report.summary.by_severity.get(&Severity::Error), Some(&1));
    assert_eq!(report.summary.by_severity.get(&Severity::Warning), Some(&3));
    for kind in [
        RuleKind::DisallowedContainer,
        RuleKind::ResolutionOutOfRange,
        RuleKind::ExtensionMismatch,
        RuleKind::DisallowedImageFormat,
    ] {
        assert_eq!(report.summary.by_rule.get(&kind), Some(&1), "{:?}", kind);
    }

    let sticker = report
        .files
        .iter()
        .find(|f| f.path.ends_with("sticker.webp"))
        .unwrap();
    assert_eq!(sticker.severity, Severity::Error);
    assert!(!report.is_clean());
}

#[test]
fn test_severity_overrides_reach_the_report() {
    let dir = library();
    let mut rules = CompatibilityRuleSet::default();
    rules
        .severity
        .set(RuleKind::DisallowedContainer, Severity::Error);
    let scanner = QualityScanner::new(FakeProber::new(h264_probe(1280, 720, 3_000_000)), rules);

    let outcome = scanner.scan(dir.path(), &CancelToken::new()).finish();
    let report = qc::generate(outcome.findings);
    let episode = report
        .files
        .iter()
        .find(|f| f.path.ends_with("ep01.mkv"))
        .unwrap();
    assert_eq!(episode.severity, Severity::Error);
    assert_eq!(report.summary.by_severity.get(&Severity::Error), Some(&2));
}

#[test]
fn test_json_report_lists_files_in_path_order() {
    let dir = library();
    let outcome = scanner().scan(dir.path(), &CancelToken::new()).finish();
    let json = qc::generate(outcome.findings).to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    let paths: Vec<String> = value["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["path"].as_str().unwrap().to_string())
        .collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);
    assert_eq!(paths.len(), 4);
}

#[test]
fn test_clean_library_renders_no_issues() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "ok.mp4", b"");
    let scanner = QualityScanner::new(
        FakeProber::new(h264_probe(1280, 720, 3_000_000)),
        CompatibilityRuleSet::default(),
    );
    let outcome = scanner.scan(dir.path(), &CancelToken::new()).finish();
    let report = qc::generate(outcome.findings).with_files_scanned(outcome.files_scanned);

    assert!(report.is_clean());
    insta::assert_snapshot!(report.render_text(), @r"
    QC REPORT
    =========

    Files scanned:       1
    Files with findings: 0
    Total findings:      0
      error    0
      warning  0
      info     0

    No issues found.
    ");
}
