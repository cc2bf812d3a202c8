/// Object Graph Construction Benchmarks
///
/// Measures each pipeline stage on synthetic heaps: snapshot decoding,
/// reference graph construction, dominator assignment, and the full report.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use heaplens::analysis::analyze;
use heaplens::config::{AnalysisConfig, FieldOrder};
use heaplens::graph::{DominatorOptions, DominatorTree, ReferenceGraph};
use heaplens::hprof::builder::{ClassDef, HprofBuilder};
use heaplens::hprof::{FieldLayouts, HeapSnapshot, ParseOptions};
use heaplens::model::{FieldType, IdSize, RootKind};

const SIZES: [u64; 3] = [1_000, 10_000, 100_000];

/// Binary-tree-shaped heap with one cross link per node and a byte[] payload
/// on every leaf
fn synthetic_heap(nodes: u64) -> Vec<u8> {
    let mut b = HprofBuilder::new(IdSize::Eight);
    b.class(
        ClassDef::new(0x10, "com.example.TreeNode")
            .field("left", FieldType::Object)
            .field("right", FieldType::Object)
            .field("peer", FieldType::Object)
            .field("weight", FieldType::Long),
    );

    let id = |n: u64| 0x1000 + n;
    let payload = |n: u64| 0x1000 + nodes + n;
    for n in 0..nodes {
        let child = |c: u64| if c < nodes { id(c) } else { 0 };
        let left = child(2 * n + 1);
        let right = child(2 * n + 2);
        let peer = id((n * 7 + 3) % nodes);
        let data = b
            .fields()
            .id(if left == 0 { payload(n) } else { left })
            .id(right)
            .id(peer)
            .long(n as i64)
            .into_bytes();
        b.instance(id(n), 0x10, &data);
        if left == 0 {
            b.primitive_array(payload(n), FieldType::Byte, &[0; 64]);
        }
        if n % 4096 == 4095 {
            b.flush_segment();
        }
    }
    b.root(RootKind::JavaFrame, id(0));
    b.finish()
}

fn parse(bytes: &[u8]) -> HeapSnapshot {
    HeapSnapshot::parse(bytes, &ParseOptions::default(), &mut Vec::new()).unwrap()
}

fn bench_snapshot_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_parse");
    for &nodes in &SIZES {
        let bytes = synthetic_heap(nodes);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &bytes, |b, bytes| {
            b.iter(|| black_box(parse(bytes)));
        });
    }
    group.finish();
}

fn bench_reference_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("reference_graph");
    for &nodes in &SIZES {
        let snapshot = parse(&synthetic_heap(nodes));
        group.throughput(Throughput::Elements(snapshot.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &snapshot, |b, snapshot| {
            b.iter(|| {
                let mut layouts = FieldLayouts::new(snapshot, FieldOrder::DescendantFirst);
                black_box(
                    ReferenceGraph::build(snapshot, &mut layouts, usize::MAX, &mut Vec::new())
                        .unwrap(),
                )
            });
        });
    }
    group.finish();
}

fn bench_dominator_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("dominator_tree");
    group.sample_size(20);
    for &nodes in &SIZES {
        let snapshot = parse(&synthetic_heap(nodes));
        let mut layouts = FieldLayouts::new(&snapshot, FieldOrder::DescendantFirst);
        let graph =
            ReferenceGraph::build(&snapshot, &mut layouts, usize::MAX, &mut Vec::new()).unwrap();
        let roots: Vec<_> = snapshot
            .roots()
            .iter()
            .filter_map(|root| snapshot.index_of(root.object_id))
            .collect();

        group.throughput(Throughput::Elements(graph.node_count() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &graph, |b, graph| {
            b.iter(|| {
                black_box(
                    DominatorTree::build(
                        graph,
                        &roots,
                        &DominatorOptions::default(),
                        &mut Vec::new(),
                    )
                    .unwrap(),
                )
            });
        });
    }
    group.finish();
}

fn bench_full_report(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_report");
    group.sample_size(10);
    let config = AnalysisConfig::default();
    for &nodes in &SIZES[..2] {
        let bytes = synthetic_heap(nodes);
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &bytes, |b, bytes| {
            b.iter(|| black_box(analyze(bytes, &config).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_snapshot_parse,
    bench_reference_graph,
    bench_dominator_tree,
    bench_full_report
);

criterion_main!(benches);
