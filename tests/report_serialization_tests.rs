//! JSON shape and determinism of analysis reports

mod utils;

use heaplens::analysis::analyze;
use heaplens::model::IdSize;
use serde_json::Value;
use utils::*;

fn report_json() -> Value {
    let report = analyze(&leaky_app_heap(IdSize::Four), &leak_test_config()).unwrap();
    serde_json::to_value(&report).unwrap()
}

#[test]
fn test_repeated_analysis_is_byte_identical() {
    let bytes = leaky_app_heap(IdSize::Four);
    let config = leak_test_config();

    let first = serde_json::to_string(&analyze(&bytes, &config).unwrap()).unwrap();
    for _ in 0..3 {
        let again = serde_json::to_string(&analyze(&bytes, &config).unwrap()).unwrap();
        assert_eq!(first, again);
    }
}

#[test]
fn test_report_top_level_sections() {
    let json = report_json();
    for key in [
        "header",
        "summary",
        "class_histogram",
        "package_histogram",
        "primitive_histogram",
        "string_stats",
        "root_histogram",
        "top_retained",
        "leak_suspects",
        "duplicate_strings",
        "warnings",
    ] {
        assert!(json.get(key).is_some(), "missing {}", key);
    }
    assert_eq!(json["header"]["version"], "JAVA PROFILE 1.0.2");
    assert_eq!(json["summary"]["gc_roots"], 3);
}

#[test]
fn test_suspect_serialization() {
    let json = report_json();
    let leak = &json["leak_suspects"][0];

    assert_eq!(leak["kind"], "lifecycle_leak");
    assert_eq!(leak["objects"][0], ACTIVITY);
    assert_eq!(leak["holder_chain"]["end"]["reason"], "static_field");
    assert_eq!(leak["holder_chain"]["links"][1]["via"], "static leaked");

    let duplicate = &json["leak_suspects"][2];
    assert_eq!(duplicate["kind"], "duplicate_instance");
    assert!(duplicate["holder_chain"].is_null());
}

#[test]
fn test_root_histogram_serialization() {
    let json = report_json();
    let roots = json["root_histogram"].as_array().unwrap();

    assert_eq!(roots.len(), 2);
    assert_eq!(roots[0]["kind"], "jni_global");
    assert_eq!(roots[0]["count"], 2);
    assert_eq!(roots[1]["kind"], "sticky_class");
}

#[test]
fn test_warning_serialization() {
    let warning = heaplens::error::AnalysisWarning::DominatorIterationCap {
        iterations: 2,
        changed: 1,
    };
    let json = serde_json::to_value(&warning).unwrap();
    assert_eq!(json["kind"], "dominator_iteration_cap");
    assert_eq!(json["iterations"], 2);
}
