//! Named recurring jobs.
//!
//! A job runs its task, waits `interval`, and repeats. Iterations never
//! overlap. Cancellation is observed between iterations, so a running
//! iteration always finishes.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstRun {
	Immediately,
	AfterInterval,
}

pub fn spawn_job<F, Fut>(
	name: &'static str,
	interval: Duration,
	first_run: FirstRun,
	shutdown: CancellationToken,
	mut task: F,
) -> JoinHandle<()>
where
	F: FnMut() -> Fut + Send + 'static,
	Fut: Future<Output = ()> + Send + 'static,
{
	tokio::spawn(async move {
		info!(job = name, interval_secs = interval.as_secs(), "job started");
		if first_run == FirstRun::Immediately && !shutdown.is_cancelled() {
			task().await;
		}
		loop {
			tokio::select! {
				_ = shutdown.cancelled() => break,
				_ = tokio::time::sleep(interval) => {}
			}
			debug!(job = name, "job tick");
			task().await;
		}
		info!(job = name, "job stopped");
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	fn counting(counter: &Arc<AtomicUsize>) -> impl FnMut() -> std::future::Ready<()> + Send + 'static {
		let counter = counter.clone();
		move || {
			counter.fetch_add(1, Ordering::SeqCst);
			std::future::ready(())
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_job_repeats_until_cancelled() {
		let runs = Arc::new(AtomicUsize::new(0));
		let shutdown = CancellationToken::new();
		let handle = spawn_job(
			"test",
			Duration::from_secs(10),
			FirstRun::Immediately,
			shutdown.clone(),
			counting(&runs),
		);

		tokio::time::sleep(Duration::from_secs(25)).await;
		shutdown.cancel();
		handle.await.unwrap();
		assert_eq!(runs.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_delayed_first_run() {
		let runs = Arc::new(AtomicUsize::new(0));
		let shutdown = CancellationToken::new();
		let handle = spawn_job(
			"delayed",
			Duration::from_secs(10),
			FirstRun::AfterInterval,
			shutdown.clone(),
			counting(&runs),
		);

		tokio::time::sleep(Duration::from_secs(5)).await;
		assert_eq!(runs.load(Ordering::SeqCst), 0);
		tokio::time::sleep(Duration::from_secs(10)).await;
		shutdown.cancel();
		handle.await.unwrap();
		assert_eq!(runs.load(Ordering::SeqCst), 1);
	}
}
