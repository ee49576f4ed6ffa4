use criterion::*;
use panel_cut_2d::*;
use rand::prelude::*;

fn build_optimizer() -> Optimizer {
    let mut rng: StdRng = SeedableRng::seed_from_u64(1);

    let mut optimizer = Optimizer::new(2440, 1220);

    let num_cut_pieces = 20;

    for _ in 0..num_cut_pieces {
        optimizer.add_cut_piece(CutPiece {
            width: rng.gen_range(100..=1200),
            height: rng.gen_range(100..=800),
            quantity: rng.gen_range(1..=3),
        });
    }

    optimizer.set_kerf(3).set_attempts(10).set_random_seed(1);

    optimizer
}

pub fn benchmark_best_short_side_fit(c: &mut Criterion) {
    c.bench_function("best short side fit random cut pieces", |b| {
        b.iter(|| {
            let _ = build_optimizer().optimize();
        })
    });
}

pub fn benchmark_best_area_fit(c: &mut Criterion) {
    c.bench_function("best area fit random cut pieces", |b| {
        b.iter(|| {
            let _ = build_optimizer()
                .set_strategy(Strategy::BestAreaFit)
                .optimize();
        })
    });
}

criterion_group!(
    benches,
    benchmark_best_short_side_fit,
    benchmark_best_area_fit
);
criterion_main!(benches);
