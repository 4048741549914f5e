//! Reference test binary entry point
//!
//! Runs the full-size reference scenarios and exits non-zero on any failure.

use reference_tests::{scenarios, ReferenceTest, TestResult};

/// Get all reference tests
fn all_tests(workers: usize) -> Vec<ReferenceTest> {
    vec![
        scenarios::free_fall(25, workers),
        scenarios::overlapping_pair(workers),
        scenarios::stress_fill(20_000, workers),
        scenarios::stress_fill(100_000, workers),
    ]
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    tracing::info!("Verlet Particle Pit Reference Suite");
    tracing::info!("===================================");

    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    let tests = all_tests(workers);
    tracing::info!("Found {} reference tests ({} workers)", tests.len(), workers);

    let outcomes: Vec<(String, Result<TestResult, String>)> = tests
        .iter()
        .map(|test| (test.name.clone(), test.run()))
        .collect();

    let mut failures = Vec::new();
    for (name, outcome) in &outcomes {
        match outcome {
            Ok(result) => {
                result.print_summary();
                if !result.passed {
                    failures.push(name.as_str());
                }
            }
            Err(e) => {
                eprintln!("\nERROR running test {}: {}", name, e);
                failures.push(name.as_str());
            }
        }
    }

    println!("\n{}", "=".repeat(80));
    println!(
        "{} of {} reference tests passed",
        outcomes.len() - failures.len(),
        outcomes.len()
    );
    for name in &failures {
        println!("  failed: {}", name);
    }
    println!("{}", "=".repeat(80));

    if !failures.is_empty() {
        std::process::exit(1);
    }
}
