//! Batch upload with per-file retry, exponential backoff and bounded
//! concurrency.
//!
//! Files are processed in sequential chunks of `concurrency`; files inside
//! a chunk upload concurrently. Retries of one file are strictly sequential.
//! One file running out of attempts never aborts the batch.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use shared_types::{UploadProgress, UploadResult};
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::task::UploadTask;
use crate::transport::{ByteProgress, UploadTransport};

/// Observer for progress snapshots
pub type ProgressSink = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// Percentage reported at the start of each attempt when the transport
/// does not report byte progress
const ATTEMPT_MILESTONE: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub concurrency: usize,
    pub timeout: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            concurrency: 3,
            timeout: Duration::from_millis(30_000),
        }
    }
}

/// `retry_delay * 2^(attempt-1)` for a 1-based attempt number
pub fn backoff_delay(retry_delay: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    retry_delay.saturating_mul(1u32 << exponent)
}

pub struct UploadOrchestrator<T> {
    transport: T,
    options: UploadOptions,
}

impl<T: UploadTransport> UploadOrchestrator<T> {
    pub fn new(transport: T, options: UploadOptions) -> Self {
        Self { transport, options }
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Upload every task and return one result per task, in input order.
    pub async fn upload(
        &self,
        tasks: &[UploadTask],
        on_progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Vec<UploadResult> {
        let mut results = Vec::with_capacity(tasks.len());
        for chunk in tasks.chunks(self.options.concurrency.max(1)) {
            let chunk_results = join_all(
                chunk
                    .iter()
                    .map(|task| self.upload_one(task, &on_progress, &cancel)),
            )
            .await;
            results.extend(chunk_results);
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        tracing::info!(
            total = results.len(),
            succeeded,
            failed = results.len() - succeeded,
            "Upload batch finished"
        );
        results
    }

    async fn upload_one(
        &self,
        task: &UploadTask,
        on_progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> UploadResult {
        on_progress(UploadProgress::pending(&task.file_name));

        let attempts = self.options.max_retries.max(1);
        let mut last_error: Option<TransportError> = None;

        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return cancelled(task, on_progress);
            }

            let milestone = (ATTEMPT_MILESTONE * attempt).min(100) as u8;
            on_progress(UploadProgress::uploading(&task.file_name, milestone));

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransportError::Cancelled),
                sent = tokio::time::timeout(
                    self.options.timeout,
                    self.transport.send(task, byte_progress(task, on_progress)),
                ) => sent.unwrap_or(Err(TransportError::Timeout)),
            };

            match outcome {
                Ok(meta) => {
                    tracing::debug!(file = %task.file_name, attempt, url = %meta.url, "Uploaded");
                    on_progress(UploadProgress::completed(&task.file_name));
                    return UploadResult::success(meta);
                }
                Err(e) if !e.is_retryable() => return cancelled(task, on_progress),
                Err(e) => {
                    tracing::warn!(
                        file = %task.file_name,
                        attempt,
                        max = attempts,
                        error = %e,
                        "Upload attempt failed"
                    );
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                let delay = backoff_delay(self.options.retry_delay, attempt);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return cancelled(task, on_progress),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Upload failed".to_string());
        on_progress(UploadProgress::failed(&task.file_name, message.clone()));
        UploadResult::failure(message)
    }
}

fn cancelled(task: &UploadTask, on_progress: &ProgressSink) -> UploadResult {
    let reason = TransportError::Cancelled.to_string();
    tracing::info!(file = %task.file_name, "Upload cancelled");
    on_progress(UploadProgress::failed(&task.file_name, reason.clone()));
    UploadResult::failure(reason)
}

fn byte_progress(task: &UploadTask, on_progress: &ProgressSink) -> ByteProgress {
    let sink = on_progress.clone();
    let file_name = task.file_name.clone();
    Arc::new(move |sent, total| {
        if total > 0 {
            let percent = (sent.min(total) * 100 / total) as u8;
            sink(UploadProgress::uploading(&file_name, percent));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use shared_types::{StoredFileMeta, UploadStatus};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Fails the first `failures[name]` attempts for a file, then succeeds.
    /// Records the instant of every attempt.
    #[derive(Default)]
    struct ScriptedTransport {
        failures: HashMap<String, u32>,
        delay: Option<Duration>,
        attempts: Mutex<HashMap<String, Vec<Instant>>>,
        in_flight: Mutex<(usize, usize)>,
    }

    impl ScriptedTransport {
        fn failing(pairs: &[(&str, u32)]) -> Self {
            Self {
                failures: pairs.iter().map(|(n, c)| (n.to_string(), *c)).collect(),
                ..Default::default()
            }
        }

        fn attempts_for(&self, name: &str) -> Vec<Instant> {
            self.attempts.lock().unwrap().get(name).cloned().unwrap_or_default()
        }

        fn max_in_flight(&self) -> usize {
            self.in_flight.lock().unwrap().1
        }
    }

    #[async_trait]
    impl UploadTransport for ScriptedTransport {
        async fn send(
            &self,
            task: &UploadTask,
            progress: ByteProgress,
        ) -> Result<StoredFileMeta, TransportError> {
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                let entry = attempts.entry(task.file_name.clone()).or_default();
                entry.push(Instant::now());
                entry.len() as u32
            };
            {
                let mut g = self.in_flight.lock().unwrap();
                g.0 += 1;
                g.1 = g.1.max(g.0);
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.lock().unwrap().0 -= 1;

            if attempt <= self.failures.get(&task.file_name).copied().unwrap_or(0) {
                return Err(TransportError::Http {
                    status: 503,
                    message: format!("attempt {} refused", attempt),
                });
            }
            progress(task.size, task.size);
            Ok(StoredFileMeta {
                id: "id".to_string(),
                filename: format!("stored_{}", task.file_name),
                original_name: task.file_name.clone(),
                size: task.size,
                mime_type: task.declared_mime_type.clone(),
                sha256_hash: String::new(),
                uploaded_at: Utc::now(),
                url: format!("/api/files/stored_{}", task.file_name),
            })
        }
    }

    fn task(name: &str) -> UploadTask {
        UploadTask::new(name, "application/pdf", b"%PDF".to_vec())
    }

    fn recorder() -> (ProgressSink, Arc<Mutex<Vec<UploadProgress>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        let sink: ProgressSink = Arc::new(move |p| sink_events.lock().unwrap().push(p));
        (sink, events)
    }

    #[test]
    fn test_backoff_delay() {
        let base = Duration::from_millis(1000);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds_with_backoff() {
        let transport = Arc::new(ScriptedTransport::failing(&[("a.pdf", 2)]));
        let orchestrator = UploadOrchestrator::new(transport.clone(), UploadOptions::default());
        let (sink, events) = recorder();

        let results = orchestrator
            .upload(&[task("a.pdf")], sink, CancellationToken::new())
            .await;

        assert_eq!(results.len(), 1);
        assert!(results[0].success);

        let attempts = transport.attempts_for("a.pdf");
        assert_eq!(attempts.len(), 3);
        assert!(attempts[1] - attempts[0] >= Duration::from_millis(1000));
        assert!(attempts[2] - attempts[1] >= Duration::from_millis(2000));

        let events = events.lock().unwrap();
        assert_eq!(events.first().unwrap().status, UploadStatus::Pending);
        assert_eq!(events.last().unwrap().status, UploadStatus::Completed);
        assert_eq!(events.last().unwrap().percent, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_isolated() {
        let transport = ScriptedTransport::failing(&[("b.pdf", u32::MAX)]);
        let orchestrator = UploadOrchestrator::new(transport, UploadOptions::default());
        let (sink, events) = recorder();

        let results = orchestrator
            .upload(
                &[task("a.pdf"), task("b.pdf"), task("c.pdf")],
                sink,
                CancellationToken::new(),
            )
            .await;

        let outcome: Vec<_> = results.iter().map(|r| r.success).collect();
        assert_eq!(outcome, vec![true, false, true]);
        assert_eq!(results[0].stored_file.as_ref().unwrap().original_name, "a.pdf");
        assert_eq!(results[1].error.as_deref(), Some("attempt 3 refused"));
        assert_eq!(results[2].stored_file.as_ref().unwrap().original_name, "c.pdf");

        let b_terminal = events
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.file_name == "b.pdf" && p.status.is_terminal())
            .cloned()
            .collect::<Vec<_>>();
        assert_eq!(b_terminal.len(), 1);
        assert_eq!(b_terminal[0].status, UploadStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded_and_order_preserved() {
        let transport = Arc::new(ScriptedTransport {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let options = UploadOptions {
            concurrency: 2,
            ..Default::default()
        };
        let orchestrator = UploadOrchestrator::new(transport.clone(), options);
        let (sink, _) = recorder();
        let tasks: Vec<_> = (0..5).map(|i| task(&format!("{}.pdf", i))).collect();

        let results = orchestrator.upload(&tasks, sink, CancellationToken::new()).await;

        assert_eq!(transport.max_in_flight(), 2);
        let names: Vec<_> = results
            .iter()
            .map(|r| r.stored_file.as_ref().unwrap().original_name.clone())
            .collect();
        assert_eq!(names, vec!["0.pdf", "1.pdf", "2.pdf", "3.pdf", "4.pdf"]);

        // Chunk {2,3} starts only after chunk {0,1} has finished
        let first_chunk_done = transport.attempts_for("0.pdf")[0] + Duration::from_millis(50);
        assert!(transport.attempts_for("2.pdf")[0] >= first_chunk_done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failed_attempt() {
        let transport = ScriptedTransport {
            delay: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let options = UploadOptions {
            max_retries: 2,
            timeout: Duration::from_secs(1),
            ..Default::default()
        };
        let orchestrator = UploadOrchestrator::new(transport, options);
        let (sink, _) = recorder();

        let results = orchestrator
            .upload(&[task("slow.pdf")], sink, CancellationToken::new())
            .await;

        assert!(!results[0].success);
        assert_eq!(results[0].error.as_deref(), Some("Upload timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_is_terminal_and_not_retried() {
        let transport = Arc::new(ScriptedTransport {
            delay: Some(Duration::from_secs(10)),
            ..Default::default()
        });
        let orchestrator = UploadOrchestrator::new(transport.clone(), UploadOptions::default());
        let (sink, events) = recorder();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let results = orchestrator.upload(&[task("a.pdf")], sink, cancel).await;

        assert!(!results[0].success);
        assert_eq!(results[0].error.as_deref(), Some("cancelled"));
        assert_eq!(transport.attempts_for("a.pdf").len(), 1);
        let last = events.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.status, UploadStatus::Error);
        assert_eq!(last.error.as_deref(), Some("cancelled"));
    }
}
