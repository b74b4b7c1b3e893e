use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::compactor;
use crate::config::AdmissionPolicy;
use crate::engine::Engine;
use crate::limits::*;
use crate::notify::NotifyHub;

/// One engine per college database. The database name from the startup packet
/// picks the tenant; each tenant owns a WAL file and a compactor task.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    policy: AdmissionPolicy,
}

/// Reduce a database name to the characters allowed in a WAL file name.
///
/// Names that differ only in stripped characters share a tenant.
fn tenant_key(database: &str) -> io::Result<String> {
    if database.len() > MAX_TENANT_NAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("tenant name too long: {} > {MAX_TENANT_NAME_LEN}", database.len()),
        ));
    }
    let key: String = database
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-'))
        .collect();
    if key.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no usable characters in tenant name {database:?}"),
        ));
    }
    Ok(key)
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64, policy: AdmissionPolicy) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            policy,
        }
    }

    /// The engine for `database`, opened from its WAL on first use.
    pub fn get_or_create(&self, database: &str) -> io::Result<Arc<Engine>> {
        let key = tenant_key(database)?;
        if let Some(engine) = self.engines.get(&key) {
            return Ok(Arc::clone(engine.value()));
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(io::Error::other(format!("too many tenants (max {MAX_TENANTS})")));
        }

        // Concurrent first connections meet on the entry lock; one replays the WAL.
        let engine = match self.engines.entry(key) {
            Entry::Occupied(existing) => return Ok(Arc::clone(existing.get())),
            Entry::Vacant(slot) => {
                let wal_path = self.data_dir.join(format!("{}.wal", slot.key()));
                let engine = Arc::new(Engine::new(
                    wal_path,
                    Arc::new(NotifyHub::new()),
                    self.policy,
                )?);
                tokio::spawn(compactor::run_compactor(
                    Arc::clone(&engine),
                    self.compact_threshold,
                ));
                tracing::info!("tenant {} opened", slot.key());
                slot.insert(Arc::clone(&engine));
                engine
            }
        };

        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use rust_decimal_macros::dec;
    use std::fs;
    use tokio_test::assert_ok;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("registrar_test_tenant").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn manager(dir: PathBuf) -> TenantManager {
        TenantManager::new(dir, 1000, AdmissionPolicy::default())
    }

    #[tokio::test]
    async fn tenant_isolation() {
        let dir = test_data_dir("isolation");
        let tm = manager(dir);

        let eng_a = tm.get_or_create("college_a").unwrap();
        let eng_b = tm.get_or_create("college_b").unwrap();

        let ada = NewTeacher {
            name: "Ada".into(),
            subject: "Math".into(),
            working_hours: dec!(3),
        };
        let in_a = eng_a.create_teacher(ada.clone()).await.unwrap();
        // Same name and subject is fine in another tenant.
        let in_b = eng_b.create_teacher(ada).await.unwrap();
        assert_eq!(in_a.id, in_b.id);

        eng_a
            .update_teacher(
                in_a.id,
                TeacherPatch {
                    working_hours: Some(dec!(40)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(eng_b.working_hours(in_b.id).await.unwrap(), dec!(3));
        assert_eq!(eng_a.working_hours(in_a.id).await.unwrap(), dec!(40));
    }

    #[tokio::test]
    async fn tenant_lazy_creation() {
        let dir = test_data_dir("lazy");
        let tm = manager(dir.clone());

        let entries: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert!(entries.is_empty());

        let _eng = assert_ok!(tm.get_or_create("my_db"));
        assert!(dir.join("my_db.wal").exists());
    }

    #[tokio::test]
    async fn tenant_same_engine_returned() {
        let dir = test_data_dir("same_eng");
        let tm = manager(dir);

        let eng1 = tm.get_or_create("foo").unwrap();
        let eng2 = tm.get_or_create("foo").unwrap();
        assert!(Arc::ptr_eq(&eng1, &eng2));
    }

    #[tokio::test]
    async fn tenant_policy_is_applied() {
        let dir = test_data_dir("policy");
        let policy = AdmissionPolicy {
            day_check: crate::config::DayCheck::Reject,
            classroom_conflicts: true,
        };
        let tm = TenantManager::new(dir, 1000, policy);
        let engine = tm.get_or_create("strict").unwrap();
        assert_eq!(engine.policy, policy);
    }

    #[tokio::test]
    async fn tenant_name_sanitized() {
        let dir = test_data_dir("sanitize");
        let tm = manager(dir.clone());

        let _eng = assert_ok!(tm.get_or_create("../evil"));
        assert!(dir.join("evil.wal").exists());

        assert!(tm.get_or_create("../..").is_err());
    }

    #[tokio::test]
    async fn tenant_names_sharing_a_wal_share_an_engine() {
        let dir = test_data_dir("shared_key");
        let tm = manager(dir);

        let plain = assert_ok!(tm.get_or_create("evil"));
        let dotted = assert_ok!(tm.get_or_create("../evil"));
        assert!(Arc::ptr_eq(&plain, &dotted));
    }

    #[tokio::test]
    async fn tenant_name_too_long() {
        let dir = test_data_dir("name_too_long");
        let tm = manager(dir);

        let long_name = "x".repeat(MAX_TENANT_NAME_LEN + 1);
        let err = tm.get_or_create(&long_name).err().unwrap();
        assert!(err.to_string().contains("tenant name too long"));
    }

    #[tokio::test]
    async fn tenant_count_limit() {
        let dir = test_data_dir("count_limit");
        let tm = manager(dir);

        for i in 0..MAX_TENANTS {
            tm.get_or_create(&format!("t{i}")).unwrap();
        }
        let err = tm.get_or_create("one_more").err().unwrap();
        assert!(err.to_string().contains("too many tenants"));
    }
}
