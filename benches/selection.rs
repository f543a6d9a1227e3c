use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use recipe_cmab::{
    apply_feedback, rank_candidates, select_top_k, BoostConfig, Category, Context, FeedbackType,
    Recipe, SelectorConfig, UserBanditState,
};
use std::hint::black_box;

/// A warm user: every arm past cold start, slightly non-uniform feedback.
fn warm_state(rounds: usize) -> UserBanditState {
    let mut st = UserBanditState::new();
    for r in 0..rounds {
        for (i, c) in Category::ALL.iter().enumerate() {
            let fb = FeedbackType::ALL[(r * 7 + i * 3) % FeedbackType::ALL.len()];
            apply_feedback(&mut st, c.as_str(), fb);
        }
    }
    st
}

fn bench_select(c: &mut Criterion) {
    let ctx = Context::default();
    let mut group = c.benchmark_group("select_top_k");
    for (label, st) in [("cold", UserBanditState::new()), ("warm", warm_state(20))] {
        for &k in &[1usize, 3, 14] {
            let mut rng = StdRng::seed_from_u64(123);
            group.bench_with_input(BenchmarkId::new(label, k), &k, |b, &k| {
                b.iter(|| {
                    let cfg = SelectorConfig::default();
                    let sel = select_top_k(black_box(&st), &ctx, k, cfg, &mut rng);
                    black_box(sel);
                })
            });
        }
    }
    group.finish();
}

fn bench_rank(c: &mut Criterion) {
    let tags = ["italian", "thai", "mexican", "salad", "stew", "dessert", "greek"];
    let selected = [Category::Italian, Category::Asian, Category::Salads];

    let mut group = c.benchmark_group("rank_candidates");
    for &n in &[20usize, 200, 2_000] {
        let candidates: Vec<Recipe> = (0..n)
            .map(|i| {
                Recipe::new(i as u64, format!("recipe {i}"))
                    .with_tags([tags[i % tags.len()]])
                    .with_base_score(((i * 37 + 11) % 100) as f64)
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &_n| {
            b.iter(|| {
                let ranked = rank_candidates(
                    black_box(candidates.clone()),
                    &selected,
                    BoostConfig::default(),
                );
                black_box(ranked);
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_select, bench_rank);
criterion_main!(benches);
