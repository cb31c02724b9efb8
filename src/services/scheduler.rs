use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, error, info};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

use super::aggregator::{Aggregator, POWER_DATA};
use super::dispatch::Dispatcher;
use crate::config::ScheduleConfig;
use crate::output::publish_message;
use crate::utils::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Full,
    Quick,
}

pub fn cycle_kind(counter: u32) -> CycleKind {
    if counter == 0 {
        CycleKind::Full
    } else {
        CycleKind::Quick
    }
}

/// Position of the cycle after `counter` in a round of one full and
/// `quick_cycles` quick cycles.
pub fn next_counter(counter: u32, quick_cycles: u32) -> u32 {
    match counter.checked_add(1) {
        Some(next) if next <= quick_cycles => next,
        _ => 0,
    }
}

/// First multiple of `period_secs` since the epoch strictly after `now`.
pub fn next_boundary(now: DateTime<Utc>, period_secs: u64) -> DateTime<Utc> {
    let period = period_secs.max(1) as i64;
    let next = (now.timestamp().div_euclid(period) + 1) * period;
    DateTime::<Utc>::from_timestamp(next, 0).unwrap_or_else(|| now + ChronoDuration::seconds(period))
}

/// Time left until the next boundary, never negative.
pub fn sleep_duration(now: DateTime<Utc>, period_secs: u64) -> Duration {
    (next_boundary(now, period_secs) - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Drives the acquisition loop: one full cycle followed by the configured
/// number of quick cycles, each started on a wall-clock boundary.
pub struct Scheduler {
    aggregator: Aggregator,
    dispatcher: Dispatcher,
    period_secs: u64,
    quick_cycles: u32,
    stop: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        aggregator: Aggregator,
        dispatcher: Dispatcher,
        schedule: &ScheduleConfig,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            aggregator,
            dispatcher,
            period_secs: schedule.period_secs,
            quick_cycles: schedule.quick_cycles,
            stop,
        }
    }

    /// Runs until the stop flag is raised. A cycle or a sleep in progress
    /// is abandoned at its next suspension point. Returns the number of
    /// completed cycles.
    pub async fn run(self) -> u64 {
        let mut stop = self.stop.clone();
        let mut counter: u32 = 0;
        let mut completed: u64 = 0;
        info!(
            "⏰ Scheduler started: {} s period, 1 full and {} quick cycles per round",
            self.period_secs, self.quick_cycles
        );

        loop {
            if *stop.borrow() {
                break;
            }

            let kind = cycle_kind(counter);
            tokio::select! {
                result = self.run_cycle(kind) => {
                    if let Err(e) = result {
                        error!("{:?} cycle failed: {}", kind, e);
                    }
                    completed += 1;
                }
                _ = stop_requested(&mut stop) => break,
            }
            counter = next_counter(counter, self.quick_cycles);

            let nap = sleep_duration(Utc::now(), self.period_secs);
            debug!("next cycle in {:?}", nap);
            tokio::select! {
                _ = sleep(nap) => {}
                _ = stop_requested(&mut stop) => break,
            }
        }

        info!("🛑 Scheduler stopped after {} cycles", completed);
        completed
    }

    async fn run_cycle(&self, kind: CycleKind) -> Result<(), ServiceError> {
        match kind {
            CycleKind::Full => {
                let cycle = self.aggregator.full_cycle().await;
                if self.dispatcher.publishing() {
                    if let Some(power) = cycle.record(POWER_DATA) {
                        self.dispatcher.publish(publish_message(power))?;
                    }
                }
                if cycle.records.is_empty() {
                    debug!("full cycle produced no records");
                    return Ok(());
                }
                self.dispatcher.write(cycle.records)
            }
            CycleKind::Quick => {
                self.aggregator.quick_cycle().await;
                Ok(())
            }
        }
    }
}

// Resolves once the flag is raised or its sender is gone
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_cycle_pattern() {
        let kinds: Vec<CycleKind> = (0..12).map(|i| cycle_kind(i % 6)).collect();
        assert_eq!(kinds.iter().filter(|k| **k == CycleKind::Full).count(), 2);
        assert_eq!(kinds[0], CycleKind::Full);
        assert_eq!(kinds[6], CycleKind::Full);
        assert!(kinds[1..6].iter().all(|k| *k == CycleKind::Quick));
    }

    #[test]
    fn test_counter_wraps_after_quick_cycles() {
        let counters: Vec<u32> = std::iter::successors(Some(0), |c| Some(next_counter(*c, 5)))
            .take(8)
            .collect();
        assert_eq!(counters, vec![0, 1, 2, 3, 4, 5, 0, 1]);
        assert_eq!(next_counter(0, 0), 0);
        assert_eq!(next_counter(u32::MAX - 1, u32::MAX), u32::MAX);
        assert_eq!(next_counter(u32::MAX, u32::MAX), 0);
    }

    #[test]
    fn test_next_boundary_from_three_seconds_past() {
        let now = at(12, 0, 3);
        assert_eq!(next_boundary(now, 10), at(12, 0, 10));
        assert_eq!(sleep_duration(now, 10), Duration::from_secs(7));
    }

    #[test]
    fn test_boundary_is_strictly_after_now() {
        assert_eq!(next_boundary(at(12, 0, 10), 10), at(12, 0, 20));
        assert_eq!(next_boundary(at(12, 59, 55), 10), at(13, 0, 0));
    }

    #[test]
    fn test_sub_second_remainder() {
        let now = at(12, 0, 3) + ChronoDuration::milliseconds(250);
        assert_eq!(sleep_duration(now, 10), Duration::from_millis(6750));
    }

    #[tokio::test]
    async fn test_stop_requested_on_dropped_sender() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        stop_requested(&mut rx).await;
    }
}
