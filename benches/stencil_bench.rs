use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use stencil_detect::data::DataDesc;
use stencil_detect::graph::{Memlet, Program};
use stencil_detect::pass::PassConfig;
use stencil_detect::pattern::match_pattern;
use stencil_detect::pipeline::PassManager;
use stencil_detect::stencil_detection::StencilDetection;
use stencil_detect::symbolic::Expr;

// Programs of independent 3-point maps; every other map is element-wise and
// is rejected, so matching and analysis cost scale with the map count.

fn chain(maps: usize) -> Program {
    let mut p = Program::new("chain");
    for k in 0..=maps {
        p.add_array(&format!("A{k}"), DataDesc::array(vec![Expr::sym("N")]));
    }
    for k in 0..maps {
        let src = format!("A{k}");
        let dst = format!("A{}", k + 1);
        let (left, right) = if k % 2 == 0 {
            ("i - 1", "i + 1")
        } else {
            ("i", "i")
        };
        p.add_mapped_tasklet(
            &format!("m{k}"),
            &[("i", "1:N-2".parse().unwrap())],
            &[
                ("l", Memlet::simple(&src, left).unwrap()),
                ("r", Memlet::simple(&src, right).unwrap()),
            ],
            "o = l + r",
            &[("o", Memlet::simple(&dst, "i").unwrap())],
        )
        .unwrap();
    }
    p
}

fn bench_expression_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("symbolic/parse");
    for source in ["i + 1", "2*i + j - (N - 1) / 2", "(i - 1) * M + j % 4"] {
        group.bench_with_input(BenchmarkId::from_parameter(source), source, |b, source| {
            b.iter(|| black_box(source.parse::<Expr>().unwrap()));
        });
    }
    group.finish();
}

fn bench_matching(c: &mut Criterion) {
    let template = StencilDetection::template();
    let mut group = c.benchmark_group("pattern/match");
    for maps in [1usize, 16, 64] {
        let program = chain(maps);
        group.bench_with_input(BenchmarkId::from_parameter(maps), &program, |b, program| {
            b.iter(|| black_box(match_pattern(&program.state, &template).count()));
        });
    }
    group.finish();
}

fn bench_eligibility(c: &mut Criterion) {
    let template = StencilDetection::template();
    let mut group = c.benchmark_group("eligibility/check");
    for maps in [1usize, 16, 64] {
        let program = chain(maps);
        let bindings: Vec<_> = match_pattern(&program.state, &template).collect();
        group.bench_with_input(BenchmarkId::from_parameter(maps), &bindings, |b, bindings| {
            b.iter(|| {
                bindings
                    .iter()
                    .filter(|binding| StencilDetection::check(&program, binding).is_ok())
                    .count()
            });
        });
    }
    group.finish();
}

fn bench_fixed_point(c: &mut Criterion) {
    let manager = PassManager::with_default_passes(PassConfig {
        collect_rejections: false,
        ..PassConfig::default()
    });
    let mut group = c.benchmark_group("pipeline/fixed_point");
    for maps in [1usize, 16, 64] {
        let program = chain(maps);
        group.bench_with_input(BenchmarkId::from_parameter(maps), &program, |b, program| {
            b.iter_batched(
                || program.clone(),
                |mut p| black_box(manager.run(&mut p, |_| {}).unwrap()),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_expression_parse,
    bench_matching,
    bench_eligibility,
    bench_fixed_point
);
criterion_main!(benches);
