use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use piflora::{
    calc_dewpoint, web::handlers::render_index, LastReading, SimulatedBank, TriggerConfig,
    TriggerRegistry, TriggerState,
};
use std::hint::black_box;
use std::sync::Arc;

/// Benchmark the dew point formula
fn bench_dewpoint(c: &mut Criterion) {
    c.bench_function("calc_dewpoint", |b| {
        b.iter(|| calc_dewpoint(black_box(23.4), black_box(52.1)).expect("Should compute dew point"))
    });
}

/// Benchmark switching a single trigger
fn bench_trigger_set(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Should create tokio runtime");
    let bank = SimulatedBank::new().expect("Should create simulated bank");
    let triggers = TriggerConfig::from_pairs([("sofa", 23)]).expect("Should build triggers");
    let registry = TriggerRegistry::initialize(&triggers, &bank).expect("Should initialize");

    c.bench_function("trigger_set", |b| {
        b.to_async(&rt).iter(|| async {
            registry
                .set("sofa", TriggerState::On)
                .await
                .expect("Should switch trigger")
        })
    });
}

/// Benchmark concurrent switching across distinct triggers
fn bench_concurrent_triggers(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Should create tokio runtime");
    let bank = SimulatedBank::new().expect("Should create simulated bank");

    for count in [1u8, 2, 4, 8].iter() {
        let pairs: Vec<_> = (0..*count)
            .map(|i| (format!("trigger{}", i), 10 + i))
            .collect();
        let triggers = TriggerConfig::from_pairs(pairs).expect("Should build triggers");
        let registry =
            Arc::new(TriggerRegistry::initialize(&triggers, &bank).expect("Should initialize"));

        c.bench_with_input(
            BenchmarkId::new("concurrent_trigger_set", count),
            count,
            |b, &count| {
                let registry = Arc::clone(&registry);
                b.to_async(&rt).iter(|| {
                    let registry = Arc::clone(&registry);
                    async move {
                        let mut handles = Vec::new();

                        for i in 0..count {
                            let registry = Arc::clone(&registry);
                            handles.push(tokio::spawn(async move {
                                registry
                                    .set(&format!("trigger{}", i), TriggerState::On)
                                    .await
                                    .expect("Should switch trigger")
                            }));
                        }

                        futures_util::future::join_all(handles).await
                    }
                })
            },
        );
        // Registry drops here, releasing the pins for the next group
    }
}

/// Benchmark rendering the reading page
fn bench_render_index(c: &mut Criterion) {
    let reading = LastReading {
        temperature: 23.41,
        humidity: 52.1,
        dewpoint: Some(13.0),
        message: "measured at: 10:15:00".to_string(),
        measured_at: Some(chrono::Utc::now()),
    };

    c.bench_function("render_index", |b| b.iter(|| render_index(black_box(&reading))));
}

/// Benchmark JSON serialization of the last reading
fn bench_reading_serialization(c: &mut Criterion) {
    let reading = LastReading::default();

    c.bench_function("reading_json_serialization", |b| {
        b.iter(|| serde_json::to_string(black_box(&reading)).expect("Should serialize"))
    });
}

criterion_group!(
    benches,
    bench_dewpoint,
    bench_trigger_set,
    bench_concurrent_triggers,
    bench_render_index,
    bench_reading_serialization
);
criterion_main!(benches);
