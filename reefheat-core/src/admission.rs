//! Backpressure against the remote job queue.

use std::time::Duration;

use tracing::info;

use crate::config::AdmissionConfig;
use crate::error::Result;
use crate::remote::QueueProbe;

/// Delays new submissions while the remote queue is at or above a threshold.
///
/// The controller never cancels or reorders remote jobs; waiting is its only
/// effect.
#[derive(Clone, Copy, Debug)]
pub struct AdmissionController {
    ceiling: usize,
    poll_interval: Duration,
}

impl AdmissionController {
    pub fn new(ceiling: usize, poll_interval: Duration) -> Self {
        Self {
            ceiling,
            poll_interval,
        }
    }

    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self::new(config.max_queued_jobs, config.poll_interval())
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Whether an observed queue depth calls for a capacity wait.
    pub fn is_saturated(&self, active: usize) -> bool {
        active > self.ceiling
    }

    /// Returns once fewer than `threshold` jobs are active, with that count.
    pub async fn ensure_capacity<P>(&self, probe: &P, threshold: usize) -> Result<usize>
    where
        P: QueueProbe + ?Sized,
    {
        loop {
            let active = probe.active_count().await?;
            if active < threshold {
                return Ok(active);
            }
            info!(
                active,
                threshold,
                wait_secs = self.poll_interval.as_secs_f64(),
                "remote queue full; waiting for capacity"
            );
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::PipelineError;

    struct ScriptedProbe {
        samples: Mutex<VecDeque<usize>>,
        polls: Mutex<usize>,
    }

    impl ScriptedProbe {
        fn new(samples: &[usize]) -> Self {
            Self {
                samples: Mutex::new(samples.iter().copied().collect()),
                polls: Mutex::new(0),
            }
        }

        fn polls(&self) -> usize {
            *self.polls.lock().unwrap()
        }
    }

    #[async_trait]
    impl QueueProbe for ScriptedProbe {
        async fn active_count(&self) -> Result<usize> {
            *self.polls.lock().unwrap() += 1;
            self.samples
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| PipelineError::Remote("script exhausted".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_once_per_sample_at_or_above_threshold() {
        let controller = AdmissionController::new(3, Duration::from_secs(30));
        let probe = ScriptedProbe::new(&[5, 3, 4, 2, 0]);
        let started = tokio::time::Instant::now();

        let active = controller.ensure_capacity(&probe, 3).await.unwrap();

        assert_eq!(active, 2);
        assert_eq!(probe.polls(), 4);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(90) && waited < Duration::from_secs(91));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_immediately_with_headroom() {
        let controller = AdmissionController::new(10, Duration::from_secs(30));
        let probe = ScriptedProbe::new(&[9]);
        let started = tokio::time::Instant::now();

        assert_eq!(controller.ensure_capacity(&probe, 10).await.unwrap(), 9);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_failure_propagates_out_of_the_wait() {
        let controller = AdmissionController::new(1, Duration::from_secs(1));
        let probe = ScriptedProbe::new(&[4, 4]);
        assert!(controller.ensure_capacity(&probe, 1).await.is_err());
        assert_eq!(probe.polls(), 3);
    }

    #[test]
    fn saturation_is_strictly_above_the_ceiling() {
        let controller = AdmissionController::new(2_500, Duration::from_secs(30));
        assert!(!controller.is_saturated(2_500));
        assert!(controller.is_saturated(2_501));
    }
}
