//! Batched, throttled execution of independent units of work.
//!
//! Units in a batch run concurrently on their own tasks and the scheduler
//! waits for the whole batch to settle before sleeping a random cool-down and
//! starting the next one. A unit that errors or panics is reported on its own;
//! its siblings and later batches are unaffected.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use leadharvest_shared::{LeadHarvestError, Result, ScheduleConfig};

/// Why a unit produced no value.
#[derive(Debug)]
pub enum UnitFailure {
    /// The unit returned an error.
    Failed(LeadHarvestError),
    /// The unit's task panicked or was cancelled.
    Aborted(String),
}

impl std::fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "{e}"),
            Self::Aborted(msg) => write!(f, "unit aborted: {msg}"),
        }
    }
}

/// Settled result of one unit.
#[derive(Debug)]
pub struct UnitReport<T, O> {
    pub item: T,
    pub result: std::result::Result<O, UnitFailure>,
}

/// Inclusive range the inter-batch cool-down is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Result<Self> {
        if min > max {
            return Err(LeadHarvestError::config(format!(
                "delay minimum {min:?} exceeds maximum {max:?}"
            )));
        }
        Ok(Self { min, max })
    }

    /// Uniform sample in `[min, max]` at millisecond resolution.
    pub fn sample(&self) -> Duration {
        let lo = self.min.as_millis() as u64;
        let hi = self.max.as_millis() as u64;
        if lo >= hi {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }
}

/// Runs units of work in fixed-size concurrent batches.
#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    batch_size: usize,
    delay: DelayRange,
}

impl BatchScheduler {
    pub fn new(config: ScheduleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            batch_size: config.batch_size,
            delay: DelayRange::new(config.min_delay, config.max_delay)?,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches `len` items split into.
    pub fn batch_count(&self, len: usize) -> usize {
        len.div_ceil(self.batch_size)
    }

    /// Run `work` for every item and report each unit as its batch settles.
    ///
    /// `on_settled` sees units in item order within a batch; the returned
    /// vector holds every report in that same order.
    pub async fn run<T, O, F, Fut>(
        &self,
        items: Vec<T>,
        work: F,
        mut on_settled: impl FnMut(&UnitReport<T, O>),
    ) -> Vec<UnitReport<T, O>>
    where
        T: Clone + Send + 'static,
        O: Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        let total_batches = self.batch_count(items.len());
        let mut reports = Vec::with_capacity(items.len());
        let mut remaining = items.into_iter().peekable();
        let mut batch_no = 0usize;

        while remaining.peek().is_some() {
            batch_no += 1;
            let batch: Vec<T> = remaining.by_ref().take(self.batch_size).collect();
            info!(batch = batch_no, of = total_batches, units = batch.len(), "starting batch");

            let mut handles = Vec::with_capacity(batch.len());
            for item in batch {
                let fut = work(item.clone());
                handles.push((item, tokio::spawn(fut)));
            }

            for (item, handle) in handles {
                let result = match handle.await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => {
                        warn!(batch = batch_no, error = %e, "unit failed");
                        Err(UnitFailure::Failed(e))
                    }
                    Err(e) => {
                        warn!(batch = batch_no, error = %e, "unit task aborted");
                        Err(UnitFailure::Aborted(e.to_string()))
                    }
                };
                let report = UnitReport { item, result };
                on_settled(&report);
                reports.push(report);
            }

            if remaining.peek().is_some() {
                let pause = self.delay.sample();
                info!(batch = batch_no, pause_ms = pause.as_millis() as u64, "cooling down");
                tokio::time::sleep(pause).await;
            } else {
                debug!(batch = batch_no, "last batch settled");
            }
        }

        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scheduler(batch_size: usize) -> BatchScheduler {
        BatchScheduler::new(ScheduleConfig {
            batch_size,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        })
        .unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(
            BatchScheduler::new(ScheduleConfig {
                batch_size: 0,
                min_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
            })
            .is_err()
        );
        assert!(DelayRange::new(Duration::from_secs(10), Duration::from_secs(5)).is_err());
    }

    #[test]
    fn delay_samples_stay_in_range() {
        let range = DelayRange::new(Duration::from_secs(5), Duration::from_secs(10)).unwrap();
        for _ in 0..200 {
            let d = range.sample();
            assert!(d >= Duration::from_secs(5) && d <= Duration::from_secs(10));
        }
        let fixed = DelayRange::new(Duration::from_secs(2), Duration::from_secs(2)).unwrap();
        assert_eq!(fixed.sample(), Duration::from_secs(2));
    }

    #[test]
    fn batch_count_rounds_up() {
        let s = scheduler(3);
        assert_eq!(s.batch_count(0), 0);
        assert_eq!(s.batch_count(3), 1);
        assert_eq!(s.batch_count(7), 3);
    }

    #[tokio::test]
    async fn failure_does_not_abort_siblings() {
        let s = scheduler(3);
        let reports = s
            .run(
                vec![1u32, 2, 3],
                |n| async move {
                    if n == 2 {
                        Err(LeadHarvestError::navigation("https://x", "boom"))
                    } else {
                        Ok(n * 10)
                    }
                },
                |_| {},
            )
            .await;

        let ok: Vec<u32> = reports
            .iter()
            .filter_map(|r| r.result.as_ref().ok().copied())
            .collect();
        assert_eq!(ok, vec![10, 30]);
        assert!(matches!(reports[1].result, Err(UnitFailure::Failed(_))));
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let s = scheduler(2);
        let reports = s
            .run(
                vec![1u32, 2],
                |n| async move {
                    if n == 1 {
                        panic!("unit exploded");
                    }
                    Ok(n)
                },
                |_| {},
            )
            .await;
        assert!(matches!(reports[0].result, Err(UnitFailure::Aborted(_))));
        assert_eq!(reports[1].result.as_ref().ok(), Some(&2));
    }

    #[tokio::test]
    async fn batches_never_overlap() {
        let s = scheduler(3);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut settled = 0usize;

        let reports = s
            .run(
                (0..8u32).collect(),
                |_| {
                    let in_flight = in_flight.clone();
                    let peak = peak.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
                |_| settled += 1,
            )
            .await;

        assert_eq!(reports.len(), 8);
        assert_eq!(settled, 8);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        let items: Vec<u32> = reports.iter().map(|r| r.item).collect();
        assert_eq!(items, (0..8).collect::<Vec<_>>());
    }
}
