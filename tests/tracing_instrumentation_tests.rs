//! Tests for tracing instrumentation
//!
//! Each test installs a thread-local subscriber that writes into a buffer,
//! runs an analysis, and checks the emitted events.

mod utils;

use heaplens::analysis::analyze;
use heaplens::config::AnalysisConfig;
use heaplens::hprof::builder::{ClassDef, HprofBuilder};
use heaplens::model::IdSize;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CapturedLog {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

/// Run `f` with events at `directive` and above captured
fn capture<F: FnOnce()>(directive: &str, f: F) -> String {
    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directive))
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    log.contents()
}

#[test]
fn test_info_events_summarize_stages() {
    let bytes = utils::leaky_app_heap(IdSize::Four);
    let output = capture("heaplens=info", || {
        analyze(&bytes, &utils::leak_test_config()).unwrap();
    });

    assert!(output.contains("INFO"), "{}", output);
    assert!(output.contains("Parsing HPROF snapshot"), "{}", output);
    assert!(output.contains("Object graph: 16 objects"), "{}", output);
    assert!(output.contains("Leak heuristics: 3 suspects"), "{}", output);
    assert!(!output.contains("DEBUG"), "{}", output);
}

#[test]
fn test_debug_events_show_dominator_passes() {
    let bytes = utils::leaky_app_heap(IdSize::Four);
    let output = capture("heaplens=debug", || {
        analyze(&bytes, &AnalysisConfig::default()).unwrap();
    });

    assert!(output.contains("Dominator pass 1"), "{}", output);
    assert!(output.contains("Reference graph:"), "{}", output);
}

#[test]
fn test_abandoned_segment_logged_as_warning() {
    let mut b = HprofBuilder::new(IdSize::Four);
    b.class(ClassDef::new(0x10, "com.example.Node"));
    b.instance(0x20, 0x10, &[]);
    b.raw_sub_record(&[0x99]);
    let bytes = b.finish();

    let output = capture("heaplens=warn", || {
        let report = analyze(&bytes, &AnalysisConfig::default()).unwrap();
        assert_eq!(report.warnings.len(), 1);
    });

    assert!(output.contains("WARN"), "{}", output);
    assert!(output.contains("Abandoning heap-dump segment"), "{}", output);
    assert!(!output.contains("INFO"), "{}", output);
}

#[test]
fn test_silent_without_subscriber_directive() {
    let bytes = utils::leaky_app_heap(IdSize::Four);
    let output = capture("off", || {
        analyze(&bytes, &AnalysisConfig::default()).unwrap();
    });
    assert!(output.is_empty(), "{}", output);
}
