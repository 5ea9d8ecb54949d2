//! Performance benchmarks for the per-tick hot paths

use server::classifier::DisconnectClassifier;
use server::config::{DisconnectConfig, PlacementConfig};
use server::host::ConfigTask;
use server::placement::SafePlacementResolver;
use server::session::describe_tasks;
use server::world::FlatLevel;
use shared::BlockState;
use std::time::Instant;

/// Benchmarks termination-reason classification
#[test]
fn benchmark_disconnect_classification() {
    let classifier = DisconnectClassifier::new(&DisconnectConfig::default());
    let reasons = [
        "Invalid move player packet received",
        "Player left the game",
        "Timed out",
        "Flying is not enabled on this server",
        "Something entirely unrelated",
    ];

    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        let _ = classifier.classify(reasons[i % reasons.len()]);
    }

    let duration = start.elapsed();
    println!(
        "Disconnect classification: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // Runs on every termination request; must stay well under a tick
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks the downward column scan on a flat level
#[test]
fn benchmark_safe_y_scan() {
    let resolver = SafePlacementResolver::new(PlacementConfig::default());
    let level = FlatLevel::new(63);

    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        let x = (i % 100) as f64;
        let _ = resolver.find_safe_y(&level, x, -x);
    }

    let duration = start.elapsed();
    println!(
        "Safe y scan: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}

/// Benchmarks the worst case: a column with nothing standable in it
#[test]
fn benchmark_safe_y_fallback() {
    let resolver = SafePlacementResolver::new(PlacementConfig::default());
    let mut level = FlatLevel::void();
    // Lava floor: solid nowhere, so every scan runs to the bottom.
    level.set_block(0, 0, 0, BlockState::Lava);

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _ = resolver.find_safe_y(&level, 0.5, 0.5);
    }

    let duration = start.elapsed();
    println!(
        "Safe y fallback: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks bounded task-list descriptions used in debug logging
#[test]
fn benchmark_task_description() {
    let tasks: Vec<ConfigTask> = (0..16)
        .map(|id| ConfigTask::new(id, "neoforge:sync_registries"))
        .collect();

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _ = describe_tasks(&tasks, 50);
    }

    let duration = start.elapsed();
    println!(
        "Task description: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}
