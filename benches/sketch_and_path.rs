use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pangene::utils::CancelFlag;
use pangene::{KmerGraph, KmerGraphWithCoverage, PrgPath, ScoringModel, Seq};

/// Deterministic pseudo-random DNA, long enough to exercise the window
/// loop properly.
fn synthetic_sequence(len: usize) -> String {
    const BASES: [char; 4] = ['A', 'C', 'G', 'T'];
    let mut state = 0x9e3779b97f4a7c15u64;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            BASES[(state >> 33) as usize % 4]
        })
        .collect()
}

fn bench_minimizer_sketch(c: &mut Criterion) {
    let seq = synthetic_sequence(10_000);
    c.bench_function("minimizer_sketch_10kb_w14_k15", |b| {
        b.iter(|| {
            let s = Seq::new(0, "bench", black_box(seq.clone()), 14, 15);
            black_box(s.sketch.len())
        })
    });
}

fn bench_find_max_path(c: &mut Criterion) {
    // a 500-node linear kmer graph with full coverage
    let mut kg = KmerGraph::new();
    let source = kg.add_node(PrgPath::terminus(0), 0, 0);
    let mut prev = source;
    for i in 0..500u32 {
        let path: PrgPath = format!("{},{}", i, i + 15).parse().unwrap();
        let node = kg.add_node(path, 0, 0);
        kg.add_edge(prev, node);
        prev = node;
    }
    let sink = kg.add_node(PrgPath::terminus(520), 0, 0);
    kg.add_edge(prev, sink);

    let mut view = KmerGraphWithCoverage::new(&kg, 1);
    view.set_num_reads(50);
    view.set_binomial_parameter(0.01);
    for id in 1..=500u32 {
        view.set_covg(id, 0, 20, 22);
    }

    let cancel = CancelFlag::new();
    c.bench_function("find_max_path_500_nodes", |b| {
        b.iter(|| {
            let (score, path) = view
                .find_max_path(0, ScoringModel::BinomialWithError, &cancel)
                .unwrap();
            black_box((score, path.len()))
        })
    });
}

criterion_group!(benches, bench_minimizer_sketch, bench_find_max_path);
criterion_main!(benches);
