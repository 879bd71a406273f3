//! # S-Curve Benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use nalgebra::Vector3;
use nav_lib::{
    loc::{AltFrame, NavState},
    scurve::{ScurveLimits, ScurveProfile},
    wp_nav::WpNav,
};

fn scurve_benchmark(c: &mut Criterion) {
    let limits = ScurveLimits::new(5.0, 1.0, 1.0);

    // Short leg needs the peak velocity search, long leg cruises
    c.bench_function("ScurveProfile::new (no cruise)", |b| {
        b.iter(|| ScurveProfile::new(black_box(limits), 0.0, 0.0, black_box(20.0)))
    });
    c.bench_function("ScurveProfile::new (cruise)", |b| {
        b.iter(|| ScurveProfile::new(black_box(limits), 2.0, 0.0, black_box(500.0)))
    });

    let profile = ScurveProfile::new(limits, 0.0, 0.0, 500.0).unwrap();
    let duration = profile.duration();
    c.bench_function("ScurveProfile::evaluate", |b| {
        b.iter(|| profile.evaluate(black_box(0.37 * duration)))
    });
}

fn wp_nav_benchmark(c: &mut Criterion) {
    let mut wp_nav = WpNav::default();
    let nav = NavState::new(Vector3::new(0.0, 1.0, 10.0), Vector3::zeros());

    wp_nav
        .set_destination(
            Vector3::new(1000.0, 0.0, 10.0),
            AltFrame::AboveOrigin,
            Some(Vector3::new(1000.0, 1000.0, 10.0)),
            false,
            &nav,
            &None::<f64>,
        )
        .unwrap();

    c.bench_function("WpNav::advance", |b| {
        b.iter(|| wp_nav.advance(black_box(0.001), &nav, &None::<f64>))
    });
}

criterion_group!(benches, scurve_benchmark, wp_nav_benchmark);
criterion_main!(benches);
