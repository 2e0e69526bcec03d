#[macro_use]
extern crate criterion;
extern crate mandelfarm;
extern crate num;

use criterion::Criterion;
use mandelfarm::{escape_time, run, Config, LocalRenderer, Shape, Tiling};
use num::Complex;

fn kernel(c: &mut Criterion) {
    c.bench_function("escape_time interior", |b| {
        b.iter(|| escape_time(Complex::new(-0.1, 0.1), 1000))
    });
}

fn renders(c: &mut Criterion) {
    let config = Config {
        shape: Shape::new(200, 200),
        task_size: 20,
        tiling: Tiling::Rectangular,
        workers: 2,
        ..Config::default()
    };
    c.bench_function("sequential 200x200", move |b| {
        let renderer = LocalRenderer::new(config.plane().unwrap(), config.max_iterations);
        b.iter(|| renderer.render_single())
    });
    c.bench_function("farm 200x200", move |b| b.iter(|| run(&config).unwrap()));
}

criterion_group!(benches, kernel, renders);
criterion_main!(benches);
