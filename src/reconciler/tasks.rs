use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::reconciler::Reconciler;
use super::sink::RenderSink;
use crate::history::{HistoryError, HistorySource};

/// Fetches a track's history and installs it. The lock is only taken once the
/// fetch has completed, so concurrent loads for one track land in completion
/// order. Failures are returned to the caller and not retried.
pub async fn load_history<H, S>(
    source: &H,
    reconciler: &Mutex<Reconciler<S>>,
    track_id: &str,
) -> Result<usize, HistoryError>
where
    H: HistorySource,
    S: RenderSink,
{
    let history = source.load(track_id).await?;
    let mut reconciler = reconciler.lock().await;
    Ok(reconciler.apply_history(track_id, history))
}

/// Periodically marks channels that stopped reporting as disconnected.
pub fn spawn_sweeper<S>(reconciler: Arc<Mutex<Reconciler<S>>>, every: Duration) -> JoinHandle<()>
where
    S: RenderSink + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let changed = reconciler.lock().await.sweep(Utc::now());
            if changed > 0 {
                log::debug!("Sweep changed connectivity of {} channels", changed);
            }
        }
    })
}
