// Shared snapshot fixtures for integration tests

#![allow(dead_code)]

use heaplens::config::AnalysisConfig;
use heaplens::hprof::builder::{ClassDef, HprofBuilder};
use heaplens::hprof::{HeapSnapshot, ParseOptions};
use heaplens::model::{FieldType, IdSize, RootKind};
use std::path::PathBuf;
use tempfile::TempDir;

pub const SESSION_MANAGER: u64 = 0x10;
pub const MAIN_ACTIVITY: u64 = 0x11;
pub const APP_STATE: u64 = 0x12;
pub const STRING: u64 = 0x13;
pub const OBJECT: u64 = 0x14;

pub const MANAGER_A: u64 = 0x100;
pub const MANAGER_B: u64 = 0x101;
pub const ACTIVITY: u64 = 0x200;
pub const TOKENS: u64 = 0x300;
pub const BITMAP: u64 = 0x400;
pub const BITMAP_BYTES: usize = 4096;

/// A small application heap with one instance of each leak pattern:
///
/// - two reachable `SessionManager` instances
/// - a `MainActivity` pinned by the static field `AppState.leaked`
/// - a 4 KiB `byte[]` owned by that activity
/// - three `String`s with the text "token", each with its own backing array
pub fn leaky_app_heap(id_size: IdSize) -> Vec<u8> {
    let mut b = HprofBuilder::new(id_size);
    b.class(
        ClassDef::new(SESSION_MANAGER, "com/example/SessionManager")
            .field("cache", FieldType::Object),
    );
    b.class(
        ClassDef::new(MAIN_ACTIVITY, "com/example/ui/MainActivity")
            .field("bitmap", FieldType::Object),
    );
    b.class(ClassDef::new(APP_STATE, "com/example/AppState").static_field(
        "leaked",
        FieldType::Object,
        ACTIVITY,
    ));
    b.class(ClassDef::new(STRING, "java/lang/String").field("value", FieldType::Object));
    b.class(ClassDef::new(OBJECT, "java/lang/Object"));

    let cache = b.fields().id(TOKENS).into_bytes();
    b.instance(MANAGER_A, SESSION_MANAGER, &cache);
    let no_cache = b.fields().id(0).into_bytes();
    b.instance(MANAGER_B, SESSION_MANAGER, &no_cache);

    let bitmap = b.fields().id(BITMAP).into_bytes();
    b.instance(ACTIVITY, MAIN_ACTIVITY, &bitmap);
    b.primitive_array(BITMAP, FieldType::Byte, &[0xff; BITMAP_BYTES]);

    let strings: Vec<u64> = (0..3).map(|i| 0x500 + i).collect();
    b.object_array(TOKENS, OBJECT, &strings);
    for &id in &strings {
        let value = b.fields().id(id + 0x10).into_bytes();
        b.instance(id, STRING, &value);
        b.primitive_array(id + 0x10, FieldType::Byte, b"token");
    }

    b.root(RootKind::JniGlobal, MANAGER_A);
    b.root(RootKind::JniGlobal, MANAGER_B);
    b.root(RootKind::StickyClass, APP_STATE);
    b.finish()
}

/// Thresholds scaled down to the fixture heaps
pub fn leak_test_config() -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.leaks.large_array_threshold = 4000;
    config.leaks.static_holder_min_retained = 1024;
    config
}

pub fn parse(bytes: &[u8]) -> HeapSnapshot {
    HeapSnapshot::parse(bytes, &ParseOptions::default(), &mut Vec::new())
        .expect("fixture snapshot should parse")
}

/// Write `bytes` to a snapshot file inside a fresh temporary directory
pub fn write_snapshot(bytes: &[u8]) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("heap.hprof");
    std::fs::write(&path, bytes).expect("Failed to write snapshot");
    (dir, path)
}
