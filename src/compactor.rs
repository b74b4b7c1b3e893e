use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::{Engine, EngineError};

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites a tenant's WAL once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_due(&engine, threshold).await {
            tracing::error!("WAL compaction failed: {e}");
        }
    }
}

/// Compact when at least `threshold` events were appended since the last rewrite.
/// Returns whether a compaction ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    let appended = engine.wal_appends_since_compact().await;
    if appended < threshold {
        return Ok(false);
    }
    info!("compacting WAL after {appended} appends");
    engine.compact_wal().await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdmissionPolicy;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use rust_decimal_macros::dec;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("registrar_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn open(path: &PathBuf) -> Arc<Engine> {
        let notify = Arc::new(NotifyHub::new());
        Arc::new(Engine::new(path.clone(), notify, AdmissionPolicy::default()).unwrap())
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let engine = open(&path);

        for i in 0..3 {
            engine
                .create_classroom(NewClassroom {
                    name: format!("Room {i}"),
                    capacity: 20,
                    description: None,
                })
                .await
                .unwrap();
        }
        assert!(!compact_if_due(&engine, 10).await.unwrap());
        assert_eq!(engine.wal_appends_since_compact().await, 3);

        assert!(compact_if_due(&engine, 3).await.unwrap());
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }

    #[tokio::test]
    async fn compacted_log_reopens() {
        let path = test_wal_path("reopen.wal");
        let engine = open(&path);
        let teacher = engine
            .create_teacher(NewTeacher {
                name: "Ada".into(),
                subject: "Math".into(),
                working_hours: dec!(10),
            })
            .await
            .unwrap();
        engine
            .update_teacher(
                teacher.id,
                TeacherPatch {
                    working_hours: Some(dec!(12)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(compact_if_due(&engine, 1).await.unwrap());
        drop(engine);

        let reopened = open(&path);
        let info = reopened.get_teacher(teacher.id).await.unwrap();
        assert_eq!(info.working_hours, dec!(12));
    }
}
