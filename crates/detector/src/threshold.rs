//! Adaptive per-security whale thresholds.
//!
//! The cutoff is the smallest observed notional that leaves at most
//! `target_count` events at or above it, raised to a size-scaled floor.

use rust_decimal::Decimal;
use thiserror::Error;
use whale_watch_core::{DetectionConfig, ThresholdSet};

/// Threshold search failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThresholdError {
    #[error("insufficient data: {population} events, need at least {min_events}")]
    InsufficientData { population: usize, min_events: usize },
}

/// Number of values in an ascending slice that are `>= threshold`.
fn count_at_or_above(sorted: &[Decimal], threshold: Decimal) -> usize {
    sorted.len() - sorted.partition_point(|v| *v < threshold)
}

/// Unfloored search over the distinct observed values.
///
/// Returns `max + resolution` when no observed value admits `target_count` or
/// fewer events (ties at the top), and `None` for an empty population.
fn search(sorted: &[Decimal], target_count: usize, resolution: Decimal) -> Option<Decimal> {
    let max = *sorted.last()?;
    let mut grid = sorted.to_vec();
    grid.dedup();

    // count_at_or_above is non-increasing along the grid
    let idx = grid.partition_point(|g| count_at_or_above(sorted, *g) > target_count);
    Some(grid.get(idx).copied().unwrap_or(max + resolution))
}

/// Adaptive threshold for a population of notionals.
///
/// When no more than `target_count` events reach `floor` the floor itself is
/// returned; otherwise the search result, never below the floor. Increasing
/// `target_count` never raises the result.
#[must_use]
pub fn adaptive_threshold(
    notionals: &[Decimal],
    target_count: usize,
    floor: Decimal,
    resolution: Decimal,
) -> Decimal {
    let mut sorted = notionals.to_vec();
    sorted.sort_unstable();

    if count_at_or_above(&sorted, floor) <= target_count {
        return floor;
    }
    search(&sorted, target_count, resolution).map_or(floor, |t| t.max(floor))
}

/// Full tier boundaries for one security.
///
/// `multiplier` scales every floor (ticker size class).
pub fn threshold_set(
    notionals: &[Decimal],
    config: &DetectionConfig,
    multiplier: Decimal,
) -> Result<ThresholdSet, ThresholdError> {
    if notionals.len() < config.min_events {
        return Err(ThresholdError::InsufficientData {
            population: notionals.len(),
            min_events: config.min_events,
        });
    }

    let floor = config.floor_notional * multiplier;
    let notable = adaptive_threshold(notionals, config.target_count, floor, config.resolution);

    let mut sorted = notionals.to_vec();
    sorted.sort_unstable();
    let base = search(&sorted, config.target_count, config.resolution).unwrap_or(notable);

    let large = (notable * config.large_factor)
        .max(config.large_floor * multiplier)
        .max(notable);
    let mega = (notable * config.mega_factor)
        .max(config.mega_floor * multiplier)
        .max(large);

    Ok(ThresholdSet {
        base,
        notable,
        large,
        mega,
        multiplier,
        population: notionals.len(),
        target_count: config.target_count,
    })
}
