//! Simulated training run exercising the full tracker lifecycle

use anyhow::{Context, Result};
use mltrack_core::TrackingConfig;
use mltrack_tracker::{LoopAdapter, Tracker};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

fn noise(rng: &mut impl Rng) -> f64 {
    rng.gen_range(-1.0..1.0)
}

fn batch_loss(epoch: u64, rng: &mut impl Rng) -> f64 {
    let base = 0.9f64.powi(epoch as i32);
    (base + noise(rng) * base * 0.1).max(0.01)
}

fn batch_accuracy(epoch: u64, batch: u64, rng: &mut impl Rng) -> f64 {
    (0.5 + epoch as f64 * 0.08 + batch as f64 * 0.001 + noise(rng) * 0.02).min(0.99)
}

/// Run `epochs` simulated epochs, then optionally save the report and plots
///
/// The same `seed` reproduces the same metric values.
pub async fn run(
    config: TrackingConfig,
    epochs: u64,
    steps_per_epoch: u64,
    seed: u64,
    report: bool,
) -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let tracker = Arc::new(
        Tracker::new(config)
            .await
            .context("Failed to initialize tracker")?,
    );
    let adapter = LoopAdapter::new(Arc::clone(&tracker));

    tracker
        .start_training()
        .await
        .context("Failed to start training")?;

    for epoch in 0..epochs {
        let learning_rate = 0.001 * 0.95f64.powi(epoch as i32);

        for _ in 0..steps_per_epoch {
            adapter
                .log_step(epoch, batch_loss(epoch, &mut rng), Some(learning_rate))
                .await?;
        }

        let loss = batch_loss(epoch, &mut rng);
        let accuracy = batch_accuracy(epoch, steps_per_epoch, &mut rng);
        let logs: HashMap<String, f64> = [
            ("loss", loss),
            ("accuracy", accuracy),
            ("val_loss", loss * 1.1),
            ("val_accuracy", accuracy * 0.95),
            ("lr", learning_rate),
            ("gradient_norm", 0.1 + noise(&mut rng).abs() * 0.1),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let outcome = adapter.end_epoch(epoch, &logs).await?;
        println!(
            "Epoch {} completed - Loss: {:.4}, Accuracy: {:.4}",
            epoch + 1,
            loss,
            accuracy
        );
        if outcome.should_stop {
            warn!("Stopping early at epoch {}", epoch);
            break;
        }
    }

    tracker.end_training().await;

    if report {
        let path = tracker
            .save_report(None)
            .await
            .context("Failed to save training report")?;
        println!("Report: {}", path.display());
    }

    let summary = tracker.summary();
    info!(
        "Run {} finished: {} steps, {} epochs",
        summary.run_id, summary.total_steps, summary.total_epochs
    );
    crate::print_summary(&summary);
    Ok(())
}
