use crate::sender::MetricsSender;
use anyhow::Result;
use pulse_collector::runtime::RuntimeCollector;
use pulse_collector::system::SystemCollector;
use pulse_collector::Collector;
use pulse_common::types::Metric;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

/// Whole-send deadline per batch, retries included.
const SEND_DEADLINE: Duration = Duration::from_secs(3);

/// The sampling/reporting pipeline: a poll ticker accumulating `PollCount`,
/// a report ticker batching runtime gauges, a system sampler, and a bounded
/// worker pool of concurrent senders. Everything winds down when the root
/// token is cancelled; send failures never kill the agent.
pub struct Agent {
    poll_interval: Duration,
    report_interval: Duration,
    rate_limit: usize,
    sender: Arc<MetricsSender>,
}

impl Agent {
    pub fn new(
        poll_interval: Duration,
        report_interval: Duration,
        rate_limit: usize,
        sender: MetricsSender,
    ) -> Self {
        Self {
            poll_interval,
            report_interval,
            rate_limit: rate_limit.max(1),
            sender: Arc::new(sender),
        }
    }

    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        // Small buffer so sampling keeps up through short delivery spikes.
        let (jobs_tx, jobs_rx) = mpsc::channel::<Vec<Metric>>(self.rate_limit * 2);
        let jobs_rx = Arc::new(tokio::sync::Mutex::new(jobs_rx));

        tracing::info!(
            poll_secs = self.poll_interval.as_secs(),
            report_secs = self.report_interval.as_secs(),
            workers = self.rate_limit,
            "agent started"
        );

        let mut tasks = Vec::new();

        // Sender workers: block only on the queue and on HTTP.
        for worker_id in 1..=self.rate_limit {
            let jobs_rx = jobs_rx.clone();
            let sender = self.sender.clone();
            let token = token.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    let batch = {
                        let mut rx = jobs_rx.lock().await;
                        tokio::select! {
                            _ = token.cancelled() => return,
                            batch = rx.recv() => batch,
                        }
                    };
                    let Some(batch) = batch else { return };
                    match tokio::time::timeout(SEND_DEADLINE, sender.send_batch(&batch)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::warn!(worker = worker_id, error = %e, "batch delivery failed")
                        }
                        Err(_) => {
                            tracing::warn!(worker = worker_id, "batch delivery deadline exceeded")
                        }
                    }
                }
            }));
        }

        let poll_count = Arc::new(AtomicI64::new(0));

        // Poll ticker: the only writer that increments.
        {
            let poll_count = poll_count.clone();
            let token = token.clone();
            let mut tick = interval(self.poll_interval);
            tick.tick().await;
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = tick.tick() => {
                            poll_count.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            }));
        }

        // Report ticker: snapshot the runtime gauges, append PollCount, hand
        // the batch to the queue, and only then subtract the handed-off
        // delta so accumulation resumes from zero without losing concurrent
        // increments.
        {
            let mut runtime = RuntimeCollector::new()?;
            let poll_count = poll_count.clone();
            let jobs_tx = jobs_tx.clone();
            let token = token.clone();
            let mut tick = interval(self.report_interval);
            tick.tick().await;
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = tick.tick() => {
                            let mut batch = match runtime.collect() {
                                Ok(points) => points,
                                Err(e) => {
                                    tracing::warn!(error = %e, "runtime collection failed");
                                    Vec::new()
                                }
                            };
                            let delta = poll_count.load(Ordering::SeqCst);
                            batch.push(Metric::counter("PollCount", delta));
                            tracing::debug!(gauges = batch.len() - 1, poll_count = delta, "report enqueued");

                            tokio::select! {
                                _ = token.cancelled() => return,
                                sent = jobs_tx.send(batch) => {
                                    if sent.is_err() {
                                        return;
                                    }
                                    // Reset only after successful handoff.
                                    poll_count.fetch_sub(delta, Ordering::SeqCst);
                                }
                            }
                        }
                    }
                }
            }));
        }

        // System sampler on its own ticker.
        {
            let mut system = SystemCollector::new();
            let jobs_tx = jobs_tx.clone();
            let token = token.clone();
            let mut tick = interval(self.poll_interval);
            tick.tick().await;
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = tick.tick() => {
                            let points = match system.collect() {
                                Ok(points) => points,
                                Err(e) => {
                                    tracing::warn!(error = %e, "system collection failed");
                                    continue;
                                }
                            };
                            if points.is_empty() {
                                continue;
                            }
                            tokio::select! {
                                _ = token.cancelled() => return,
                                sent = jobs_tx.send(points) => {
                                    if sent.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                    }
                }
            }));
        }
        drop(jobs_tx);

        token.cancelled().await;
        tracing::info!("agent shutting down");
        for task in tasks {
            task.await.ok();
        }
        Ok(())
    }
}
