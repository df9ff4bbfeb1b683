//! Readiness polling: wait until `/analyze` stops returning the `Empty` sentinel.

use pagechat_shared::{AnalysisResult, PageChatError, PollConfig, Result, Target};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::client::{RequestClient, duration_ms};

/// Polls `/analyze` on a fixed interval until the page is ready.
#[derive(Debug, Clone)]
pub struct ReadinessPoller {
    client: RequestClient,
    config: PollConfig,
}

impl ReadinessPoller {
    pub fn new(client: RequestClient, config: PollConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll until a non-`Empty` analysis arrives, `max_wait` elapses, or `cancel` fires.
    ///
    /// The first poll is issued immediately. An `Empty` result and a failed
    /// poll both count as "not ready yet". `max_wait` is a hard deadline: a
    /// poll still in flight when it passes is dropped, and
    /// [`PageChatError::IndexingTimeout`] is returned.
    #[instrument(skip_all, fields(target = %target))]
    pub async fn await_ready(
        &self,
        target: &Target,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult> {
        let started = Instant::now();
        let deadline = started + self.config.max_wait;
        let mut polls: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }
            if polls > 0 && Instant::now() >= deadline {
                return Err(timed_out(started, polls));
            }

            polls += 1;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = tokio::time::sleep_until(deadline) => return Err(timed_out(started, polls)),
                outcome = self.client.analyze(target) => outcome,
            };

            match outcome {
                Ok(analysis) if !analysis.is_empty_sentinel() => {
                    info!(polls, kind = %analysis.kind, "page is ready");
                    return Ok(analysis);
                }
                Ok(_) => debug!(polls, "analysis not ready yet"),
                Err(error) => debug!(polls, %error, "readiness poll failed, will retry"),
            }

            let next_poll = deadline.min(Instant::now() + self.config.interval);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = tokio::time::sleep_until(next_poll) => {}
            }
        }
    }
}

fn timed_out(started: Instant, polls: u32) -> PageChatError {
    let waited_ms = duration_ms(started.elapsed());
    info!(polls, waited_ms, "page never became ready");
    PageChatError::IndexingTimeout { waited_ms }
}

fn cancelled() -> PageChatError {
    PageChatError::Cancelled("readiness polling stopped".to_string())
}
