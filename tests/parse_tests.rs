//! Snapshot decoding, file loading and configuration through the public API

mod utils;

use heaplens::analysis::{analyze, analyze_file, AnalysisContext, CancellationToken};
use heaplens::config::AnalysisConfig;
use heaplens::error::{AnalysisWarning, HeapError};
use heaplens::hprof::builder::{ClassDef, HprofBuilder};
use heaplens::model::{IdSize, Identifier, RootKind};
use utils::*;

#[test]
fn test_fixture_decodes_completely() {
    let snapshot = parse(&leaky_app_heap(IdSize::Eight));

    assert_eq!(snapshot.id_size(), IdSize::Eight);
    assert_eq!(snapshot.classes().count(), 5);
    assert_eq!(snapshot.roots().len(), 3);
    // 5 classes, 3 instances, Object[3], 3 Strings, 4 byte[]
    assert_eq!(snapshot.len(), 16);
    assert_eq!(snapshot.class_name(Identifier(STRING)), "java.lang.String");
    let tokens = snapshot.index_of(Identifier(TOKENS)).unwrap();
    assert_eq!(snapshot.type_name(tokens), "java.lang.Object[]");
}

#[test]
fn test_analyze_file_matches_in_memory() {
    let bytes = leaky_app_heap(IdSize::Four);
    let (_dir, path) = write_snapshot(&bytes);
    let config = leak_test_config();

    let from_file = analyze_file(&path, &config).unwrap();
    let in_memory = analyze(&bytes, &config).unwrap();
    assert_eq!(from_file, in_memory);
}

#[test]
fn test_truncated_file_reports_context() {
    let bytes = leaky_app_heap(IdSize::Four);
    let (_dir, path) = write_snapshot(&bytes[..bytes.len() - 20]);

    let err = analyze_file(&path, &AnalysisConfig::default()).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("Failed to analyze"), "{}", message);
    assert!(err.downcast_ref::<HeapError>().is_some());
}

#[test]
fn test_unsupported_tag_fails_analysis() {
    let mut b = HprofBuilder::new(IdSize::Four);
    b.class(ClassDef::new(0x10, "A"));
    b.record(0x42, &[1, 2, 3]);

    let err = analyze(&b.finish(), &AnalysisConfig::default()).unwrap_err();
    assert!(matches!(
        err.root_cause(),
        HeapError::UnsupportedRecordTag { tag: 0x42, .. }
    ));
}

#[test]
fn test_abandoned_segment_surfaces_in_report() {
    let mut b = HprofBuilder::new(IdSize::Four);
    b.class(ClassDef::new(0x10, "com.example.Node"));
    b.instance(0x20, 0x10, &[]);
    b.raw_sub_record(&[0x99, 0, 0]);
    b.flush_segment();
    b.instance(0x30, 0x10, &[]);
    b.root(RootKind::JavaFrame, 0x30);
    let bytes = b.finish();

    let report = analyze(&bytes, &AnalysisConfig::default()).unwrap();
    assert_eq!(report.summary.total_instances, 2);
    assert!(matches!(
        report.warnings.as_slice(),
        [AnalysisWarning::SegmentAbandoned { .. }]
    ));

    let err = analyze(&bytes, &AnalysisConfig::strict()).unwrap_err();
    assert!(err.is_segment_local());
}

#[test]
fn test_config_file_drives_analysis() {
    let dir = tempfile::TempDir::new().unwrap();
    let config_path = dir.path().join("heaplens.toml");
    std::fs::write(
        &config_path,
        r#"
top_retained_objects = 2

[leaks]
large_array_threshold = 4000
singleton_patterns = []
"#,
    )
    .unwrap();

    let config = AnalysisConfig::from_file(&config_path).unwrap();
    let report = analyze(&leaky_app_heap(IdSize::Four), &config).unwrap();

    assert_eq!(report.top_retained.len(), 2);
    assert!(report
        .leak_suspects
        .iter()
        .all(|s| s.kind != heaplens::leaks::LeakKind::DuplicateInstance));
    assert!(report
        .leak_suspects
        .iter()
        .any(|s| s.kind == heaplens::leaks::LeakKind::LargeArray));
}

#[test]
fn test_invalid_config_file_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let config_path = dir.path().join("heaplens.toml");
    std::fs::write(&config_path, "id_size_override = 6\n").unwrap();

    let err = AnalysisConfig::from_file(&config_path).unwrap_err();
    assert!(format!("{:#}", err).contains("id_size_override"));
}

#[test]
fn test_id_size_override_reinterprets_snapshot() {
    // Header declares 8-byte identifiers but the body uses 4-byte ones
    let mut bytes = leaky_app_heap(IdSize::Four);
    let width_offset = b"JAVA PROFILE 1.0.2\0".len();
    bytes[width_offset..width_offset + 4].copy_from_slice(&8u32.to_be_bytes());
    assert!(analyze(&bytes, &AnalysisConfig::default()).is_err());

    let config = AnalysisConfig {
        id_size_override: Some(4),
        ..leak_test_config()
    };
    let report = analyze(&bytes, &config).unwrap();
    assert_eq!(report.summary.total_instances, 6);
}

#[test]
fn test_cancelled_context_build() {
    let token = CancellationToken::new();
    let bytes = leaky_app_heap(IdSize::Four);
    assert!(
        AnalysisContext::build_with_cancellation(&bytes, &AnalysisConfig::default(), &token)
            .is_ok()
    );

    token.cancel();
    let result =
        AnalysisContext::build_with_cancellation(&bytes, &AnalysisConfig::default(), &token);
    assert!(matches!(result.err(), Some(HeapError::Cancelled)));
}
