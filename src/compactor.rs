use std::sync::Weak;
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::Scheduler;

/// Background task that compacts the WAL once `threshold` appends have piled up
/// and drops notification channels nobody listens to. Exits when the scheduler is dropped or shut down.
pub async fn run_compactor(scheduler: Weak<Scheduler>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;
    loop {
        interval.tick().await;
        let Some(scheduler) = scheduler.upgrade() else {
            debug!("compactor: scheduler dropped, exiting");
            return;
        };
        if scheduler.is_shut_down() {
            return;
        }
        scheduler.notify.prune();
        if let Err(e) = compact_if_needed(&scheduler, threshold).await {
            warn!("compaction failed: {e}");
        }
    }
}

/// Compact when at least `threshold` appends have accumulated. Returns whether it ran.
pub async fn compact_if_needed(
    scheduler: &Scheduler,
    threshold: u64,
) -> Result<bool, crate::engine::EngineError> {
    let appends = scheduler.wal_appends_since_compact().await;
    if appends < threshold {
        return Ok(false);
    }
    debug!(appends, threshold, "compacting WAL");
    scheduler.compact_wal().await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticDirectory;
    use crate::model::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    const T0: Ms = 1_767_225_600_000;
    const H: Ms = 3_600_000;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("fitclub_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn directory() -> Arc<StaticDirectory> {
        let dir = StaticDirectory::new();
        dir.add_trainer(1);
        dir.add_room(1);
        Arc::new(dir)
    }

    #[tokio::test]
    async fn below_threshold_does_nothing() {
        let scheduler = Scheduler::open(test_wal_path("below.wal"), directory()).unwrap();
        scheduler
            .create_group_class("Yoga", 1, 1, Span::new(T0, T0 + H), 5)
            .await
            .unwrap();
        assert!(!compact_if_needed(&scheduler, 10).await.unwrap());
        assert_eq!(scheduler.wal_appends_since_compact().await, 1);
    }

    #[tokio::test]
    async fn at_threshold_compacts() {
        let scheduler = Scheduler::open(test_wal_path("at.wal"), directory()).unwrap();
        for i in 0..3 {
            let id = scheduler
                .create_group_class("Spin", 1, 1, Span::new(T0 + i * H, T0 + (i + 1) * H), 5)
                .await
                .unwrap();
            scheduler.cancel(id).await.unwrap();
        }
        assert!(compact_if_needed(&scheduler, 6).await.unwrap());
        assert_eq!(scheduler.wal_appends_since_compact().await, 0);
    }

    #[tokio::test]
    async fn compactor_exits_when_scheduler_dropped() {
        let scheduler = Arc::new(Scheduler::open(test_wal_path("exit.wal"), directory()).unwrap());
        let task = tokio::spawn(run_compactor(
            Arc::downgrade(&scheduler),
            1,
            Duration::from_millis(10),
        ));
        drop(scheduler);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("compactor should exit")
            .unwrap();
    }
}
