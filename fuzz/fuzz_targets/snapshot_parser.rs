#![no_main]

use heaplens::analysis::analyze;
use heaplens::config::AnalysisConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Malformed snapshots must produce an error, never a panic
    let mut config = AnalysisConfig::default();
    config.limits.max_objects = 100_000;
    config.limits.max_edges = 1_000_000;
    let _ = analyze(data, &config);
});
