// Directory scans against compatibility rules

use std::path::Path;
use xuebox::cancel::CancelToken;
use xuebox::engine::Bitrate;
use xuebox::qc::{
    Bound, CompatibilityRuleSet, Finding, ImageFormat, QualityScanner, Rule, RuleKind, Severity,
};

use crate::common::helpers::*;

fn scanner(prober: FakeProber, rules: CompatibilityRuleSet) -> QualityScanner<FakeProber> {
    QualityScanner::new(prober, rules)
}

fn default_scanner() -> QualityScanner<FakeProber> {
    scanner(
        FakeProber::new(h264_probe(1920, 1080, 5_000_000)),
        CompatibilityRuleSet::default(),
    )
}

fn file_names(findings: &[Finding]) -> Vec<String> {
    let mut names: Vec<String> = findings
        .iter()
        .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    names.dedup();
    names
}

#[test]
fn test_png_content_with_jpg_extension() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "cover.jpg", PNG_HEADER);
    write_file(dir.path(), "honest.png", PNG_HEADER);
    write_file(dir.path(), "photo.jpeg", JPEG_HEADER);

    let outcome = default_scanner()
        .scan(dir.path(), &CancelToken::new())
        .finish();

    assert_eq!(outcome.files_scanned, 3);
    assert_eq!(outcome.findings.len(), 1, "{:?}", outcome.findings);
    let finding = &outcome.findings[0];
    assert_eq!(finding.path, dir.path().join("cover.jpg"));
    assert_eq!(finding.severity, Severity::Warning);
    assert_eq!(
        finding.rule,
        Rule::ExtensionMismatch {
            extension: "jpg".to_string(),
            claimed: Some(ImageFormat::Jpeg),
            sniffed: ImageFormat::Png,
        }
    );
    assert_eq!(
        finding.rule.to_string(),
        "extension .jpg claims JPEG but content is PNG"
    );
}

#[test]
fn test_disallowed_image_format_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "sticker.webp", b"RIFF\x24\0\0\0WEBPVP8 \x18\0\0\0");

    let findings = default_scanner().inspect(&dir.path().join("sticker.webp"));
    assert_eq!(findings.len(), 1);
    assert_eq!(
        findings[0].rule,
        Rule::DisallowedImageFormat {
            format: "webp".to_string()
        }
    );
    assert_eq!(findings[0].severity, Severity::Error);
}

#[test]
fn test_unrecognized_image_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "notes.png", b"just some text, not an image");

    let findings = default_scanner().inspect(&path);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].kind(), RuleKind::ProbeFailed);
    assert_eq!(findings[0].severity, Severity::Info);
}

#[test]
fn test_bitrate_above_maximum() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "upload.mp4", b"");

    let rules = CompatibilityRuleSet::default()
        .with_bitrate_range(None, Some(Bitrate::from_bps(8_000_000)))
        .unwrap();
    let findings = scanner(FakeProber::new(h264_probe(1920, 1080, 12_000_000)), rules).inspect(&path);

    assert_eq!(findings.len(), 1, "{:?}", findings);
    assert_eq!(
        findings[0].rule,
        Rule::BitrateOutOfRange {
            bitrate: Bitrate::from_bps(12_000_000),
            bound: Bound::Max,
            limit: Bitrate::from_bps(8_000_000),
        }
    );
    assert_eq!(findings[0].rule.to_string(), "bitrate 12M above maximum 8M");
}

#[test]
fn test_compliant_media_produces_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.mp4", b"");
    write_file(dir.path(), "b.mov", b"");
    write_file(dir.path(), "song.mp3", b"");

    let outcome = default_scanner()
        .scan(dir.path(), &CancelToken::new())
        .finish();
    assert_eq!(outcome.files_scanned, 3);
    assert!(outcome.findings.is_empty());
    assert!(!outcome.cancelled);
}

#[test]
fn test_unknown_extensions_are_not_probed() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "readme.txt", b"hello");
    write_file(dir.path(), "movie.mkv", b"");

    let prober = FakeProber::new(h264_probe(1280, 720, 2_000_000));
    let scanner = scanner(prober, CompatibilityRuleSet::default());
    let outcome = scanner.scan(dir.path(), &CancelToken::new()).finish();

    assert_eq!(outcome.files_scanned, 1);
    assert_eq!(file_names(&outcome.findings), vec!["movie.mkv"]);
    assert_eq!(outcome.findings[0].kind(), RuleKind::DisallowedContainer);
}

#[test]
fn test_findings_follow_file_name_order() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["c.mkv", "a.webm", "nested/b.flv"] {
        write_file(dir.path(), name, b"");
    }

    let outcome = default_scanner()
        .scan(dir.path(), &CancelToken::new())
        .finish();
    assert_eq!(file_names(&outcome.findings), vec!["a.webm", "c.mkv", "b.flv"]);
}

#[test]
fn test_cancel_after_two_files() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..10 {
        write_file(dir.path(), &format!("clip{:02}.mkv", i), b"");
    }

    let cancel = CancelToken::new();
    let prober = FakeProber::new(h264_probe(1920, 1080, 5_000_000)).cancel_after(2, cancel.clone());
    let scanner = scanner(prober, CompatibilityRuleSet::default());

    let outcome = scanner.scan(dir.path(), &cancel).finish();
    assert!(outcome.cancelled);
    assert_eq!(outcome.files_scanned, 2);
    // Findings already produced are kept
    assert_eq!(file_names(&outcome.findings), vec!["clip00.mkv", "clip01.mkv"]);
}

#[test]
fn test_scan_is_lazy() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..5 {
        write_file(dir.path(), &format!("clip{}.webm", i), b"");
    }

    let prober = FakeProber::new(h264_probe(1920, 1080, 5_000_000));
    let scanner = scanner(prober, CompatibilityRuleSet::default());
    let mut iter = scanner.scan(dir.path(), &CancelToken::new());
    let first = iter.next().unwrap();

    assert_eq!(first.path, dir.path().join("clip0.webm"));
    assert_eq!(iter.files_scanned(), 1);
}

#[test]
fn test_parallel_scan_matches_sequential() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..12 {
        let ext = ["mkv", "mp4", "webm"][i % 3];
        write_file(dir.path(), &format!("sub{}/clip{:02}.{}", i % 4, i, ext), b"");
    }
    write_file(dir.path(), "cover.jpg", PNG_HEADER);

    let scanner = default_scanner();
    let sequential = scanner.scan(dir.path(), &CancelToken::new()).finish();
    for workers in [1, 3, 8] {
        let parallel = scanner.scan_parallel(dir.path(), &CancelToken::new(), workers);
        assert_eq!(parallel, sequential, "workers = {}", workers);
    }
}

#[test]
fn test_parallel_scan_cancelled_up_front() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.mkv", b"");

    let cancel = CancelToken::new();
    cancel.cancel();
    let outcome = default_scanner().scan_parallel(dir.path(), &cancel, 4);
    assert!(outcome.cancelled);
    assert_eq!(outcome.files_scanned, 0);
    assert!(outcome.findings.is_empty());
}

#[test]
fn test_scanning_twice_gives_the_same_outcome() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.mkv", b"");
    write_file(dir.path(), "b.jpg", PNG_HEADER);

    let scanner = default_scanner();
    let first = scanner.scan(dir.path(), &CancelToken::new()).finish();
    let second = scanner.scan(dir.path(), &CancelToken::new()).finish();
    assert_eq!(first, second);
}

#[test]
fn test_missing_root_is_a_file_access_finding() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("gone");

    let outcome = default_scanner()
        .scan(&missing, &CancelToken::new())
        .finish();
    assert_eq!(outcome.files_scanned, 0);
    assert_eq!(outcome.findings.len(), 1);
    assert_eq!(outcome.findings[0].kind(), RuleKind::FileAccess);
    assert_eq!(outcome.findings[0].path, Path::new(&missing));
}
