use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::jobs::queue::QueueReceiver;
use crate::jobs::shutdown::Shutdown;
use crate::jobs::JobError;

/// Runs `job` every `period` until shutdown. When `immediate` is false the
/// first run happens one period after start. A failed run is followed by a
/// `backoff` pause on top of the regular cadence.
pub async fn run_interval<F, Fut>(
    name: &'static str,
    period: Duration,
    backoff: Duration,
    immediate: bool,
    mut shutdown: Shutdown,
    mut job: F,
) -> Result<(), JobError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), JobError>>,
{
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    if !immediate {
        ticker.tick().await;
    }
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.wait() => break,
        }
        if shutdown.is_set() {
            break;
        }
        if let Err(err) = job().await {
            warn!(error = %err, job = name, "job execution failed");
            if !shutdown.sleep(backoff).await {
                break;
            }
        }
    }
    info!(job = name, "job stopped");
    Ok(())
}

/// Feeds every queued item to `handler`, one at a time, until shutdown.
pub async fn drain_queue<T, F, Fut>(
    name: &'static str,
    mut queue: QueueReceiver<T>,
    mut shutdown: Shutdown,
    mut handler: F,
) -> Result<(), JobError>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some(item) = queue.recv(&mut shutdown).await {
        handler(item).await;
    }
    info!(job = name, "queue consumer stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::run_interval;
    use crate::jobs::shutdown;
    use crate::jobs::JobError;

    #[tokio::test(start_paused = true)]
    async fn interval_job_runs_until_shutdown() {
        let (trigger, stop) = shutdown::channel();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let job = tokio::spawn(run_interval(
            "test",
            Duration::from_secs(10),
            Duration::from_secs(5),
            false,
            stop,
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), JobError>(())
                }
            },
        ));
        tokio::time::sleep(Duration::from_secs(35)).await;
        trigger.trigger();
        job.await.unwrap().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
