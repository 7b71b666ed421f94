//! Audit service
//!
//! Provides:
//! - A file-backed [`AuditStore`]; writes run on the blocking pool under a mutex
//! - Query, count and export over everything on disk
//! - Summary statistics and chain verification for compliance reporting
//! - A periodic purge of expired files, kept off the write path

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use pharmaguard_core::{AuditRecord, Result, RiskLevel};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::audit::{self, ChainError};
use crate::persistence::{
    purge_expired, AuditQuery, AuditReader, AuditWriter, ExportFormat, PersistenceConfig,
    StoredRecord,
};
use crate::store::AuditStore;

/// File-backed audit store
pub struct AuditService {
    config: PersistenceConfig,
    writer: Arc<Mutex<AuditWriter>>,
    reader: AuditReader,
}

impl AuditService {
    /// Create a new audit service
    pub fn new(config: PersistenceConfig) -> Result<Self> {
        let writer = AuditWriter::new(config.clone())?;
        let reader = AuditReader::new(config.clone());

        info!("Audit service started with dir: {:?}", config.audit_dir);

        Ok(Self {
            config,
            writer: Arc::new(Mutex::new(writer)),
            reader,
        })
    }

    /// Append a record and return it as stored
    pub fn append(&self, record: &AuditRecord) -> Result<StoredRecord> {
        let stored = self.writer.lock().write(record)?;
        debug!(id = %stored.id, event_type = %record.event_type, "Audit record stored");
        Ok(stored)
    }

    /// Flush pending records to disk
    pub fn flush(&self) -> Result<()> {
        self.writer.lock().flush()
    }

    /// Query audit records
    pub fn query(&self, query: &AuditQuery) -> Result<Vec<StoredRecord>> {
        self.flush()?;
        self.reader.query(query)
    }

    /// Count records matching query
    pub fn count(&self, query: &AuditQuery) -> Result<usize> {
        self.flush()?;
        self.reader.count(query)
    }

    /// Export records to file
    pub fn export(&self, query: &AuditQuery, output_path: &Path, format: ExportFormat) -> Result<usize> {
        self.flush()?;
        self.reader.export_to_file(query, output_path, format)
    }

    /// Verify the hash chain of everything on disk
    ///
    /// An unreadable line anywhere fails verification.
    pub fn verify(&self) -> Result<std::result::Result<usize, ChainError>> {
        self.flush()?;
        let lines = self.reader.read_lines()?;
        Ok(audit::verify_lines(&lines))
    }

    /// Remove rotated files whose records have all expired
    pub fn purge_expired(&self) -> Result<usize> {
        purge_expired(&self.config.audit_dir, Utc::now())
    }

    /// Purge expired files every `purge_interval_secs` on the blocking pool
    pub fn spawn_purge_task(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let period = Duration::from_secs(self.config.purge_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let service = Arc::clone(&service);
                match tokio::task::spawn_blocking(move || service.purge_expired()).await {
                    Ok(Ok(0)) => {}
                    Ok(Ok(removed)) => info!("Purged {} expired audit files", removed),
                    Ok(Err(e)) => warn!("Failed to purge expired audit files: {}", e),
                    Err(e) => warn!("Audit purge task failed: {}", e),
                }
            }
        })
    }

    /// Get audit statistics
    pub fn stats(&self) -> Result<AuditStats> {
        self.flush()?;
        let records = self.reader.read_all()?;

        let now = Utc::now().fixed_offset();
        let yesterday = now - ChronoDuration::hours(24);
        let recent = AuditQuery::new().time_range(yesterday, now);

        Ok(AuditStats {
            total_records: records.len(),
            critical_records: count_where(&records, |r| r.record.risk_level == RiskLevel::Critical),
            high_risk_records: count_where(&records, |r| r.record.risk_level.is_elevated()),
            phi_records: count_where(&records, |r| r.record.flags.is_phi_access),
            controlled_substance_records: count_where(&records, |r| {
                r.record.flags.is_controlled_substance
            }),
            records_last_24h: count_where(&records, |r| recent.matches(r)),
        })
    }
}

fn count_where(records: &[StoredRecord], pred: impl Fn(&StoredRecord) -> bool) -> usize {
    records.iter().filter(|r| pred(*r)).count()
}

#[async_trait]
impl AuditStore for AuditService {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        let writer = Arc::clone(&self.writer);
        let owned = record.clone();

        let stored = tokio::task::spawn_blocking(move || writer.lock().write(&owned))
            .await
            .map_err(|e| pharmaguard_core::Error::store(format!("audit write task failed: {}", e)))??;

        debug!(id = %stored.id, event_type = %record.event_type, "Audit record stored");
        Ok(())
    }

    fn name(&self) -> &str {
        "audit_file"
    }
}

impl std::fmt::Debug for AuditService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditService")
            .field("audit_dir", &self.config.audit_dir)
            .finish()
    }
}

/// Audit statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    pub total_records: usize,
    pub critical_records: usize,
    pub high_risk_records: usize,
    pub phi_records: usize,
    pub controlled_substance_records: usize,
    pub records_last_24h: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;
    use pharmaguard_core::EventType;
    use tempfile::TempDir;

    fn test_config(dir: &Path) -> PersistenceConfig {
        PersistenceConfig {
            audit_dir: dir.to_path_buf(),
            max_file_size: 1024 * 1024,
            max_file_age_secs: 3600,
            flush_interval: 10,
            purge_interval_secs: 3600,
        }
    }

    #[tokio::test]
    async fn test_audit_service_record_and_query() {
        let temp_dir = TempDir::new().unwrap();
        let service = AuditService::new(test_config(temp_dir.path())).unwrap();

        service
            .record(&record("POST", "/login").event(EventType::Login).actor(4).build())
            .await
            .unwrap();

        // Query flushes the buffered writer first
        let records = service.query(&AuditQuery::new()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record.event_type, EventType::Login);
        assert_eq!(records[0].record.actor_id(), Some(4));
    }

    #[tokio::test]
    async fn test_stats() {
        let temp_dir = TempDir::new().unwrap();
        let service = AuditService::new(test_config(temp_dir.path())).unwrap();

        let now = Utc::now().fixed_offset().to_rfc3339();
        let records = [
            record("GET", "/patients/1").phi().occurred_at(&now).build(),
            record("POST", "/prescription/2")
                .controlled()
                .risk(RiskLevel::High)
                .build(),
            record("POST", "/admin/users")
                .status(403)
                .risk(RiskLevel::Critical)
                .build(),
        ];
        for r in &records {
            service.record(r).await.unwrap();
        }

        let stats = service.stats().unwrap();
        assert_eq!(
            stats,
            AuditStats {
                total_records: 3,
                critical_records: 1,
                high_risk_records: 2,
                phi_records: 1,
                controlled_substance_records: 1,
                records_last_24h: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_verify_and_tamper() {
        let temp_dir = TempDir::new().unwrap();
        let service = AuditService::new(test_config(temp_dir.path())).unwrap();

        for i in 0..3 {
            service
                .record(&record("GET", &format!("/api/{}", i)).build())
                .await
                .unwrap();
        }
        assert_eq!(service.verify().unwrap(), Ok(3));

        // Rewrite the middle line on disk
        let path = temp_dir.path().join("audit_current.jsonl");
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, content.replacen("/api/1", "/api/9", 1)).unwrap();

        assert!(matches!(
            service.verify().unwrap(),
            Err(ChainError::HashMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_high_precision_payload_verifies() {
        let temp_dir = TempDir::new().unwrap();
        let service = AuditService::new(test_config(temp_dir.path())).unwrap();

        let payload = serde_json::from_str(
            r#"{"dose_mg": 982.101945428758691, "price": 0.30000000000000004, "lat": 51.50735091023}"#,
        )
        .unwrap();
        service
            .record(&record("POST", "/prescriptions/1").payload(payload).build())
            .await
            .unwrap();

        assert_eq!(service.verify().unwrap(), Ok(1));
    }

    #[tokio::test]
    async fn test_verify_fails_on_unreadable_first_line() {
        let temp_dir = TempDir::new().unwrap();
        let service = AuditService::new(test_config(temp_dir.path())).unwrap();

        for i in 0..3 {
            service
                .record(&record("GET", &format!("/api/{}", i)).build())
                .await
                .unwrap();
        }
        service.flush().unwrap();

        let path = temp_dir.path().join("audit_current.jsonl");
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, format!("X{}", content)).unwrap();

        assert!(matches!(
            service.verify().unwrap(),
            Err(ChainError::Unreadable { line: 1, .. })
        ));
        // Queries still return the readable records
        assert_eq!(service.count(&AuditQuery::new()).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_backdated_retention_fails_verify() {
        let temp_dir = TempDir::new().unwrap();
        let service = AuditService::new(test_config(temp_dir.path())).unwrap();

        service
            .record(&record("GET", "/patients/2").phi().build())
            .await
            .unwrap();
        service.flush().unwrap();

        let path = temp_dir.path().join("audit_current.jsonl");
        let content = std::fs::read_to_string(&path).unwrap();
        let mut line: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        line["retain_until"] = serde_json::json!("2001-01-01T00:00:00+00:00");
        std::fs::write(&path, format!("{}\n", line)).unwrap();

        assert!(matches!(
            service.verify().unwrap(),
            Err(ChainError::HashMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_purge_task_runs_periodically() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());

        {
            let mut writer = AuditWriter::new(config.clone()).unwrap();
            writer
                .write(
                    &record("GET", "/api/old")
                        .occurred_at("2010-01-01T00:00:00+00:00")
                        .retention(2)
                        .build(),
                )
                .unwrap();
            writer.rotate().unwrap();
        }

        let service = Arc::new(AuditService::new(config).unwrap());
        let task = service.spawn_purge_task();

        // The first tick fires immediately
        for _ in 0..50 {
            if service.count(&AuditQuery::new()).unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(service.count(&AuditQuery::new()).unwrap(), 0);
        task.abort();
    }

    #[tokio::test]
    async fn test_export_json() {
        let temp_dir = TempDir::new().unwrap();
        let service = AuditService::new(test_config(temp_dir.path())).unwrap();

        service.record(&record("GET", "/api/a").build()).await.unwrap();

        let out = temp_dir.path().join("export.json");
        let count = service
            .export(&AuditQuery::new(), &out, ExportFormat::Json)
            .unwrap();
        assert_eq!(count, 1);

        let exported: Vec<StoredRecord> =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(exported[0].record.route.path, "/api/a");
    }
}
