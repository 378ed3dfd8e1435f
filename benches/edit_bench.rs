// model = "claude-opus-4-5"
// created = "2026-08-02"
// modified = "2026-08-02"
// driver = "Isaac Clayton"

// Benchmark suite for the piece-tree CRDT engine.
//
// Workloads:
// - forward typing: sequential single-character appends
// - random inserts: short strings at random positions
// - deletion churn: delete ranges, then undo and redo them all

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use weave::crdt::doc::PieceCrdt;
use weave::crdt::op::{Deletion, Insertion, RedoOp, UndoOp};

fn type_forward(doc: &mut PieceCrdt, count: usize) {
    for i in 0..count {
        let op = Insertion::new(doc.id(), doc.clock(), doc.anchor(i).unwrap(), "x");
        doc.insert(&op).unwrap();
    }
}

fn random_inserts(doc: &mut PieceCrdt, count: usize, rng: &mut StdRng) {
    for _ in 0..count {
        let pos = rng.gen_range(0..=doc.size());
        let op = Insertion::new(doc.id(), doc.clock(), doc.anchor(pos).unwrap(), "abc");
        doc.insert(&op).unwrap();
    }
}

fn bench_typing(c: &mut Criterion) {
    let mut group = c.benchmark_group("typing");
    for count in [1_000usize, 10_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("forward", count), &count, |b, &count| {
            b.iter(|| {
                let mut doc = PieceCrdt::new();
                type_forward(&mut doc, count);
                black_box(doc.size())
            });
        });
        group.bench_with_input(BenchmarkId::new("random", count), &count, |b, &count| {
            b.iter(|| {
                let mut rng = StdRng::seed_from_u64(7);
                let mut doc = PieceCrdt::new();
                random_inserts(&mut doc, count, &mut rng);
                black_box(doc.size())
            });
        });
    }
    group.finish();
}

fn bench_deletion_churn(c: &mut Criterion) {
    c.bench_function("delete_undo_redo_200", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(3);
            let mut doc = PieceCrdt::new();
            let initial: String = (0..5_000).map(|_| 'x').collect();
            let op = Insertion::new(doc.id(), doc.clock(), doc.anchor(0).unwrap(), initial.as_str());
            doc.insert(&op).unwrap();

            let mut deletions = Vec::new();
            for _ in 0..200 {
                let len = rng.gen_range(10..20);
                let begin = rng.gen_range(0..=(5_000 - len));
                let del = Deletion::new(
                    doc.id(),
                    doc.clock(),
                    doc.history_anchor(begin).unwrap(),
                    doc.history_anchor(begin + len).unwrap(),
                );
                doc.del(&del).unwrap();
                deletions.push(del);
            }
            for del in &deletions {
                let undo = UndoOp::new(doc.id(), doc.clock(), del.id());
                doc.undo(&undo).unwrap();
            }
            for del in &deletions {
                let redo = RedoOp::new(doc.id(), doc.clock(), del.id());
                doc.redo(&redo).unwrap();
            }
            black_box(doc.size())
        });
    });
}

fn bench_to_string(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(5);
    let mut doc = PieceCrdt::new();
    random_inserts(&mut doc, 5_000, &mut rng);

    c.bench_function("to_string_5k_inserts", |b| {
        b.iter(|| black_box(doc.to_string()));
    });
}

criterion_group!(benches, bench_typing, bench_deletion_churn, bench_to_string);
criterion_main!(benches);
