//! Bounded polling of the ComfyUI history endpoint.
//!
//! State machine per job: `PENDING -> (tick) -> PENDING | COMPLETE | FAILED`.
//! Each tick fetches `/history/{prompt_id}`. The job completes once the
//! sink node lists an image. Transport failures and malformed bodies
//! count as a pending tick. After `max_attempts` ticks without an image,
//! or once backoff has slept through `interval * max_attempts`, the poller
//! gives up with [`FailureReason::Timeout`]; nothing is sent to the
//! server, which may still finish the job on its own.

use std::sync::Arc;
use std::time::Duration;

use icongen_core::job::{FailureReason, JobHandle, JobResult};

use crate::backoff::PollBackoff;
use crate::clock::{Clock, TokioClock};
use crate::history::{inspect, JobProgress};
use crate::service::GenerationService;

/// Default delay between ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default tick budget.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// Tunable polling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Base delay between ticks.
    pub interval: Duration,
    /// Maximum number of history queries per job.
    pub max_attempts: u32,
    pub backoff: PollBackoff,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: PollBackoff::Fixed,
        }
    }
}

impl PollConfig {
    /// Upper bound on total sleep per job: `interval * max_attempts`.
    pub fn max_wait(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

/// Waits for submitted jobs to produce their sink output.
pub struct JobPoller {
    service: Arc<dyn GenerationService>,
    clock: Arc<dyn Clock>,
    config: PollConfig,
}

impl JobPoller {
    pub fn new(service: Arc<dyn GenerationService>, config: PollConfig) -> Self {
        Self::with_clock(service, Arc::new(TokioClock), config)
    }

    pub fn with_clock(
        service: Arc<dyn GenerationService>,
        clock: Arc<dyn Clock>,
        config: PollConfig,
    ) -> Self {
        Self {
            service,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll until `sink_node_id` of the job behind `handle` lists an
    /// image, the server reports an execution error, or the attempt
    /// budget is exhausted.
    ///
    /// Sleeps between ticks only, so completion on tick `k` costs `k`
    /// queries and `k - 1` sleeps. Total sleep never exceeds
    /// [`PollConfig::max_wait`]; when backoff spends it before the last
    /// tick, the job times out after the ticks already made.
    pub async fn await_completion(&self, handle: JobHandle, sink_node_id: &str) -> JobResult {
        let prompt_id = handle.as_str();
        let max_attempts = self.config.max_attempts;
        let budget = self.config.max_wait();
        let mut delay = self.config.interval;
        let mut slept = Duration::ZERO;

        for attempt in 1..=max_attempts {
            match self.tick(prompt_id, sink_node_id).await {
                Some(JobProgress::Complete { filename }) => {
                    tracing::info!(
                        prompt_id = %prompt_id,
                        attempt,
                        artifact = %filename,
                        "Generation completed",
                    );
                    return JobResult::complete(filename);
                }
                Some(JobProgress::Errored { message }) => {
                    tracing::warn!(
                        prompt_id = %prompt_id,
                        attempt,
                        error = %message,
                        "ComfyUI reported execution error",
                    );
                    return JobResult::failed(FailureReason::Protocol {
                        message: format!("service reported execution error: {message}"),
                    });
                }
                Some(progress) => {
                    tracing::debug!(prompt_id = %prompt_id, attempt, ?progress, "Job still pending");
                }
                None => {}
            }

            if attempt == max_attempts {
                break;
            }

            // Stop early rather than poll back-to-back once the wait budget
            // is spent; with backoff this can happen before the last tick.
            let remaining = budget.saturating_sub(slept);
            if remaining.is_zero() || remaining < self.config.interval {
                return self.timed_out(prompt_id, attempt);
            }
            let nap = self.config.backoff.sleep_for(delay).min(remaining);
            self.clock.sleep(nap).await;
            slept += nap;
            delay = self
                .config
                .backoff
                .next_delay(delay)
                .max(self.config.interval);
        }

        self.timed_out(prompt_id, max_attempts)
    }

    fn timed_out(&self, prompt_id: &str, attempts: u32) -> JobResult {
        tracing::warn!(
            prompt_id = %prompt_id,
            attempts,
            "Timed out waiting for ComfyUI; abandoning job",
        );
        JobResult::failed(FailureReason::Timeout { attempts })
    }

    /// One history query. `None` means the tick failed and is tolerated.
    async fn tick(&self, prompt_id: &str, sink_node_id: &str) -> Option<JobProgress> {
        let body = match self.service.fetch_history(prompt_id).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(prompt_id = %prompt_id, error = %e, "History query failed");
                return None;
            }
        };

        match inspect(&body, prompt_id, sink_node_id) {
            Ok(progress) => Some(progress),
            Err(e) => {
                tracing::warn!(prompt_id = %prompt_id, error = %e, "Malformed history response");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::api::ComfyUIApiError;

    // -- Fakes -----------------------------------------------------------------

    /// Clock that records requested sleeps instead of sleeping.
    #[derive(Default)]
    struct RecordingClock {
        sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Clock for RecordingClock {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    /// Scripted history replies; once the script runs out it answers `{}`.
    struct ScriptedHistory {
        replies: Mutex<VecDeque<Result<serde_json::Value, ComfyUIApiError>>>,
        queries: Mutex<u32>,
    }

    impl ScriptedHistory {
        fn new(replies: Vec<Result<serde_json::Value, ComfyUIApiError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                queries: Mutex::new(0),
            })
        }

        /// Unknown for `k - 1` ticks, then complete with `filename`.
        fn completes_on(k: usize, filename: &str) -> Arc<Self> {
            let mut replies: Vec<_> = (1..k).map(|_| Ok(json!({}))).collect();
            replies.push(Ok(done("p-1", filename)));
            Self::new(replies)
        }

        fn queries(&self) -> u32 {
            *self.queries.lock().unwrap()
        }
    }

    #[async_trait]
    impl GenerationService for ScriptedHistory {
        async fn submit_prompt(
            &self,
            _: &serde_json::Value,
            _: &str,
        ) -> Result<serde_json::Value, ComfyUIApiError> {
            unreachable!("poller never submits")
        }

        async fn fetch_history(&self, _: &str) -> Result<serde_json::Value, ComfyUIApiError> {
            *self.queries.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({})))
        }
    }

    fn done(prompt_id: &str, filename: &str) -> serde_json::Value {
        json!({
            prompt_id: {
                "outputs": { "9": { "images": [{ "filename": filename, "subfolder": "", "type": "output" }] } },
                "status": { "status_str": "success", "completed": true, "messages": [] }
            }
        })
    }

    fn config(interval_ms: u64, max_attempts: u32) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(interval_ms),
            max_attempts,
            backoff: PollBackoff::Fixed,
        }
    }

    fn poller(
        service: Arc<ScriptedHistory>,
        clock: Arc<RecordingClock>,
        config: PollConfig,
    ) -> JobPoller {
        JobPoller::with_clock(service, clock, config)
    }

    // -- Completion ------------------------------------------------------------

    #[tokio::test]
    async fn completes_on_first_tick_without_sleeping() {
        let service = ScriptedHistory::completes_on(1, "icon_00001_.png");
        let clock = Arc::new(RecordingClock::default());
        let result = poller(service.clone(), clock.clone(), config(1000, 60))
            .await_completion(JobHandle::new("p-1"), "9")
            .await;

        assert_eq!(result, JobResult::complete("icon_00001_.png"));
        assert_eq!(service.queries(), 1);
        assert!(clock.sleeps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn completes_on_tick_k_after_k_queries() {
        for k in [2usize, 3, 5] {
            let service = ScriptedHistory::completes_on(k, "out.png");
            let clock = Arc::new(RecordingClock::default());
            let result = poller(service.clone(), clock.clone(), config(250, 5))
                .await_completion(JobHandle::new("p-1"), "9")
                .await;

            assert_eq!(result, JobResult::complete("out.png"), "k={k}");
            assert_eq!(service.queries(), k as u32);
            assert_eq!(
                *clock.sleeps.lock().unwrap(),
                vec![Duration::from_millis(250); k - 1]
            );
        }
    }

    #[tokio::test]
    async fn output_on_other_node_keeps_polling() {
        let service = ScriptedHistory::new(vec![
            Ok(json!({ "p-1": { "outputs": { "74": { "images": [{ "filename": "x.png" }] } } } })),
            Ok(done("p-1", "final.png")),
        ]);
        let clock = Arc::new(RecordingClock::default());
        let result = poller(service.clone(), clock, config(10, 5))
            .await_completion(JobHandle::new("p-1"), "9")
            .await;
        assert_eq!(result, JobResult::complete("final.png"));
        assert_eq!(service.queries(), 2);
    }

    // -- Timeout ---------------------------------------------------------------

    #[tokio::test]
    async fn never_completing_job_times_out_after_exactly_max_attempts() {
        let service = ScriptedHistory::new(vec![]);
        let clock = Arc::new(RecordingClock::default());
        let result = poller(service.clone(), clock.clone(), config(100, 4))
            .await_completion(JobHandle::new("p-1"), "9")
            .await;

        assert_eq!(result, JobResult::failed(FailureReason::Timeout { attempts: 4 }));
        assert_eq!(service.queries(), 4);
        assert_eq!(clock.sleeps.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn completion_after_budget_is_never_seen() {
        let service = ScriptedHistory::completes_on(4, "late.png");
        let clock = Arc::new(RecordingClock::default());
        let result = poller(service.clone(), clock, config(10, 3))
            .await_completion(JobHandle::new("p-1"), "9")
            .await;
        assert_eq!(result, JobResult::failed(FailureReason::Timeout { attempts: 3 }));
        assert_eq!(service.queries(), 3);
    }

    #[tokio::test]
    async fn zero_attempts_times_out_without_querying() {
        let service = ScriptedHistory::new(vec![]);
        let clock = Arc::new(RecordingClock::default());
        let result = poller(service.clone(), clock, config(10, 0))
            .await_completion(JobHandle::new("p-1"), "9")
            .await;
        assert_eq!(result, JobResult::failed(FailureReason::Timeout { attempts: 0 }));
        assert_eq!(service.queries(), 0);
    }

    // -- Tolerated failures ----------------------------------------------------

    #[tokio::test]
    async fn failed_query_counts_as_pending_tick() {
        let service = ScriptedHistory::new(vec![
            Err(ComfyUIApiError::Protocol("response is not valid JSON".into())),
            Err(ComfyUIApiError::ApiError {
                status: 502,
                body: "bad gateway".into(),
            }),
            Ok(done("p-1", "icon.png")),
        ]);
        let clock = Arc::new(RecordingClock::default());
        let result = poller(service.clone(), clock, config(10, 5))
            .await_completion(JobHandle::new("p-1"), "9")
            .await;
        assert_eq!(result, JobResult::complete("icon.png"));
        assert_eq!(service.queries(), 3);
    }

    #[tokio::test]
    async fn persistent_errors_exhaust_budget_not_abort() {
        let replies = (0..3)
            .map(|_| Err(ComfyUIApiError::Protocol("flaky".into())))
            .collect();
        let service = ScriptedHistory::new(replies);
        let clock = Arc::new(RecordingClock::default());
        let result = poller(service.clone(), clock, config(10, 3))
            .await_completion(JobHandle::new("p-1"), "9")
            .await;
        assert_eq!(result, JobResult::failed(FailureReason::Timeout { attempts: 3 }));
        assert_eq!(service.queries(), 3);
    }

    #[tokio::test]
    async fn malformed_history_counts_as_pending_tick() {
        let service = ScriptedHistory::new(vec![
            Ok(json!({ "p-1": { "outputs": "garbage" } })),
            Ok(done("p-1", "icon.png")),
        ]);
        let clock = Arc::new(RecordingClock::default());
        let result = poller(service, clock, config(10, 5))
            .await_completion(JobHandle::new("p-1"), "9")
            .await;
        assert_eq!(result, JobResult::complete("icon.png"));
    }

    #[tokio::test]
    async fn execution_error_fails_immediately() {
        let service = ScriptedHistory::new(vec![Ok(json!({
            "p-1": { "outputs": {}, "status": { "status_str": "error", "messages": [] } }
        }))]);
        let clock = Arc::new(RecordingClock::default());
        let result = poller(service.clone(), clock, config(10, 10))
            .await_completion(JobHandle::new("p-1"), "9")
            .await;
        assert!(matches!(
            result.failure(),
            Some(FailureReason::Protocol { message }) if message.contains("execution error")
        ));
        assert_eq!(service.queries(), 1);
    }

    // -- Backoff ---------------------------------------------------------------

    #[tokio::test]
    async fn exponential_backoff_stops_when_wait_budget_is_spent() {
        let service = ScriptedHistory::new(vec![]);
        let clock = Arc::new(RecordingClock::default());
        let cfg = PollConfig {
            interval: Duration::from_millis(100),
            max_attempts: 6,
            backoff: PollBackoff::Exponential {
                multiplier: 2.0,
                max_delay: Duration::from_secs(10),
                jitter: false,
            },
        };
        let budget = cfg.max_wait();
        let result = poller(service.clone(), clock.clone(), cfg)
            .await_completion(JobHandle::new("p-1"), "9")
            .await;

        // The third delay (400ms) is clamped to the 300ms left of the 600ms
        // budget; the fourth tick then gives up instead of polling again.
        assert_eq!(result, JobResult::failed(FailureReason::Timeout { attempts: 4 }));
        assert_eq!(service.queries(), 4);
        let sleeps = clock.sleeps.lock().unwrap().clone();
        assert_eq!(
            sleeps,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
            ]
        );
        assert!(sleeps.iter().sum::<Duration>() <= budget);
    }

    #[tokio::test]
    async fn default_exponential_settings_never_poll_back_to_back() {
        let service = ScriptedHistory::new(vec![]);
        let clock = Arc::new(RecordingClock::default());
        let cfg = PollConfig {
            interval: Duration::from_secs(1),
            max_attempts: 60,
            backoff: PollBackoff::Exponential {
                multiplier: 2.0,
                max_delay: Duration::from_secs(10),
                jitter: false,
            },
        };
        let result = poller(service.clone(), clock.clone(), cfg)
            .await_completion(JobHandle::new("p-1"), "9")
            .await;

        let sleeps = clock.sleeps.lock().unwrap().clone();
        assert!(sleeps.iter().all(|d| *d >= Duration::from_secs(1)), "{sleeps:?}");
        assert_eq!(sleeps.iter().sum::<Duration>(), Duration::from_secs(60));
        // 1 + 2 + 4 + 8 + 10 * 4 + 5 = 60s over nine sleeps, so ten ticks.
        assert_eq!(sleeps.len(), 9);
        assert_eq!(service.queries(), 10);
        assert_eq!(result, JobResult::failed(FailureReason::Timeout { attempts: 10 }));
    }

    #[tokio::test]
    async fn interval_is_the_floor_when_max_delay_is_smaller() {
        let service = ScriptedHistory::new(vec![]);
        let clock = Arc::new(RecordingClock::default());
        let cfg = PollConfig {
            interval: Duration::from_millis(100),
            max_attempts: 4,
            backoff: PollBackoff::Exponential {
                multiplier: 2.0,
                max_delay: Duration::ZERO,
                jitter: false,
            },
        };
        poller(service, clock.clone(), cfg)
            .await_completion(JobHandle::new("p-1"), "9")
            .await;
        assert_eq!(
            *clock.sleeps.lock().unwrap(),
            vec![Duration::from_millis(100); 3]
        );
    }

    #[tokio::test]
    async fn fixed_backoff_uses_whole_attempt_budget() {
        let service = ScriptedHistory::new(vec![]);
        let clock = Arc::new(RecordingClock::default());
        let result = poller(service.clone(), clock.clone(), config(1000, 60))
            .await_completion(JobHandle::new("p-1"), "9")
            .await;

        assert_eq!(result, JobResult::failed(FailureReason::Timeout { attempts: 60 }));
        assert_eq!(
            *clock.sleeps.lock().unwrap(),
            vec![Duration::from_secs(1); 59]
        );
    }

    #[test]
    fn max_wait_is_interval_times_attempts() {
        assert_eq!(config(500, 60).max_wait(), Duration::from_secs(30));
        assert_eq!(PollConfig::default().max_wait(), Duration::from_secs(60));
    }
}
