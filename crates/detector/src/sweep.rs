//! Clusters prints on the same instrument into sweeps.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::time::Duration;
use whale_watch_core::{DetectionConfig, Sweep, TradeEvent};

/// Groups time-adjacent, price-adjacent prints per instrument.
///
/// A print joins the open cluster when it lands within `window` of the
/// cluster's first print and within `price_tolerance` (relative) of the
/// cluster's price range. Every event ends up in exactly one [`Sweep`].
#[derive(Debug, Clone)]
pub struct SweepDetector {
    window: Duration,
    price_tolerance: Decimal,
    min_sweep_size: u64,
}

impl SweepDetector {
    pub fn new(window: Duration, price_tolerance: Decimal, min_sweep_size: u64) -> Self {
        Self {
            window,
            price_tolerance,
            min_sweep_size,
        }
    }

    #[must_use]
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(
            config.sweep_window,
            config.price_tolerance,
            config.min_sweep_size,
        )
    }

    /// Clusters one security's events.
    ///
    /// Output is ordered by start time; true sweeps get ids
    /// `{SYMBOL}-sweep-{n}` numbered from 1 in that order.
    #[must_use]
    pub fn detect(&self, events: &[TradeEvent]) -> Vec<Sweep> {
        let mut by_instrument: BTreeMap<&str, Vec<&TradeEvent>> = BTreeMap::new();
        for event in events {
            by_instrument
                .entry(event.instrument_key())
                .or_default()
                .push(event);
        }

        let mut sweeps = Vec::new();
        for (_, mut group) in by_instrument {
            group.sort_by_key(|e| e.timestamp);
            self.cluster(&group, &mut sweeps);
        }

        sweeps.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| instrument_key(a).cmp(instrument_key(b)))
        });

        let mut counters: BTreeMap<String, usize> = BTreeMap::new();
        for sweep in sweeps.iter_mut().filter(|s| s.is_sweep) {
            let n = counters.entry(sweep.symbol.clone()).or_insert(0);
            *n += 1;
            sweep.id = Some(format!("{}-sweep-{}", sweep.symbol, n));
        }
        sweeps
    }

    fn cluster(&self, sorted: &[&TradeEvent], out: &mut Vec<Sweep>) {
        let mut current: Vec<TradeEvent> = Vec::new();
        let mut low = Decimal::ZERO;
        let mut high = Decimal::ZERO;

        for event in sorted {
            let joins = current.first().is_some_and(|first| {
                let within_window = (event.timestamp - first.timestamp)
                    .to_std()
                    .is_ok_and(|elapsed| elapsed <= self.window);
                within_window && self.price_fits(event.price, low, high)
            });

            if joins {
                low = low.min(event.price);
                high = high.max(event.price);
            } else {
                self.close(std::mem::take(&mut current), out);
                low = event.price;
                high = event.price;
            }
            current.push((*event).clone());
        }
        self.close(current, out);
    }

    fn price_fits(&self, price: Decimal, low: Decimal, high: Decimal) -> bool {
        price >= low * (Decimal::ONE - self.price_tolerance)
            && price <= high * (Decimal::ONE + self.price_tolerance)
    }

    fn close(&self, events: Vec<TradeEvent>, out: &mut Vec<Sweep>) {
        if let Some(mut sweep) = Sweep::from_events(events) {
            sweep.is_sweep = sweep.print_count > 1
                && (sweep.venue_count > 1 || sweep.total_size >= self.min_sweep_size);
            out.push(sweep);
        }
    }
}

fn instrument_key(sweep: &Sweep) -> &str {
    sweep.events.first().map_or("", TradeEvent::instrument_key)
}
