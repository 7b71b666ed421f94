//! Cryptographic audit trail
//!
//! Every stored record carries the SHA-256 of its own content and the hash of
//! the record written before it. Editing, removing or reordering a record
//! breaks the chain at that point. The retention horizon is part of the hashed
//! content, so backdating it to force an early purge is detected too.

use chrono::{DateTime, Utc};
use pharmaguard_core::{AuditRecord, Result};
use sha2::{Digest, Sha256};

use crate::persistence::{retain_until, AuditLine, StoredRecord};

/// Running head of a hash chain
#[derive(Debug, Clone, Default)]
pub struct HashChain {
    head: Option<String>,
}

impl HashChain {
    /// Start a new chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue a chain whose last hash is `head`
    pub fn resume(head: Option<String>) -> Self {
        Self { head }
    }

    pub fn head(&self) -> Option<&str> {
        self.head.as_deref()
    }

    /// Link a record onto the chain
    pub fn seal(&mut self, record: AuditRecord, recorded_at: DateTime<Utc>) -> Result<StoredRecord> {
        let mut stored = StoredRecord::new(record, recorded_at);
        stored.previous_hash = self.head.clone();

        let hash = compute_hash(&stored)?;
        stored.hash = hash.clone();

        self.head = Some(hash);
        Ok(stored)
    }
}

/// Compute the hash of a stored record (excluding the hash field itself)
pub fn compute_hash(stored: &StoredRecord) -> Result<String> {
    let mut hasher = Sha256::new();

    hasher.update(stored.id.as_bytes());
    hasher.update(stored.recorded_at.to_rfc3339().as_bytes());
    hasher.update(stored.retain_until.to_rfc3339().as_bytes());
    hasher.update(serde_json::to_vec(&stored.record)?);
    if let Some(ref prev) = stored.previous_hash {
        hasher.update(prev.as_bytes());
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Whether a record still matches its hash and its derived retention horizon
pub fn is_intact(stored: &StoredRecord) -> bool {
    stored.retain_until == retain_until(&stored.record)
        && compute_hash(stored).is_ok_and(|hash| hash == stored.hash)
}

/// Where a chain stopped verifying
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("line {line} of {file} is not a readable audit record")]
    Unreadable { file: String, line: usize },

    #[error("record {id} does not link to its predecessor")]
    BrokenLink { id: String },

    #[error("record {id} content does not match its hash")]
    HashMismatch { id: String },
}

/// Verify the integrity of a sequence of stored records
///
/// The first record's `previous_hash` is taken as the anchor, so a chain
/// whose oldest files were purged still verifies.
pub fn verify(records: &[StoredRecord]) -> std::result::Result<(), ChainError> {
    let mut prev_hash = records.first().and_then(|r| r.previous_hash.clone());

    for stored in records {
        if stored.previous_hash != prev_hash {
            return Err(ChainError::BrokenLink {
                id: stored.id.clone(),
            });
        }

        match compute_hash(stored) {
            Ok(computed) if computed == stored.hash => {}
            _ => {
                return Err(ChainError::HashMismatch {
                    id: stored.id.clone(),
                })
            }
        }

        prev_hash = Some(stored.hash.clone());
    }

    Ok(())
}

/// Verify audit file lines in write order, failing on the first unreadable one
pub fn verify_lines(lines: &[AuditLine]) -> std::result::Result<usize, ChainError> {
    let mut records = Vec::with_capacity(lines.len());
    for line in lines {
        match line {
            AuditLine::Record(stored) => records.push(stored.clone()),
            AuditLine::Unreadable { path, line } => {
                return Err(ChainError::Unreadable {
                    file: path.display().to_string(),
                    line: *line,
                })
            }
        }
    }

    verify(&records).map(|()| records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;

    fn sample_record(path: &str, status: u16) -> AuditRecord {
        record("GET", path).status(status).build()
    }

    fn chain_of(n: usize) -> Vec<StoredRecord> {
        let mut chain = HashChain::new();
        (0..n)
            .map(|i| {
                chain
                    .seal(sample_record(&format!("/patients/{}", i), 200), Utc::now())
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_chain_links_records() {
        let records = chain_of(3);

        assert!(records[0].previous_hash.is_none());
        assert_eq!(records[1].previous_hash.as_deref(), Some(records[0].hash.as_str()));
        assert_eq!(records[2].previous_hash.as_deref(), Some(records[1].hash.as_str()));
        assert!(verify(&records).is_ok());
    }

    #[test]
    fn test_tamper_detection() {
        let mut records = chain_of(3);

        // Tamper with a record
        records[1].record.status_code = 500;

        assert_eq!(
            verify(&records),
            Err(ChainError::HashMismatch {
                id: records[1].id.clone()
            })
        );
    }

    #[test]
    fn test_backdated_retention_detected() {
        let mut records = chain_of(2);
        assert!(is_intact(&records[0]));

        records[0].retain_until = DateTime::parse_from_rfc3339("2001-01-01T00:00:00+00:00").unwrap();

        assert!(!is_intact(&records[0]));
        assert_eq!(
            verify(&records),
            Err(ChainError::HashMismatch {
                id: records[0].id.clone()
            })
        );
    }

    #[test]
    fn test_unreadable_line_fails_verification() {
        let records = chain_of(2);
        let lines = vec![
            AuditLine::Unreadable {
                path: "audit_current.jsonl".into(),
                line: 1,
            },
            AuditLine::Record(records[1].clone()),
        ];

        assert_eq!(
            verify_lines(&lines),
            Err(ChainError::Unreadable {
                file: "audit_current.jsonl".to_string(),
                line: 1,
            })
        );

        let lines: Vec<_> = records.into_iter().map(AuditLine::Record).collect();
        assert_eq!(verify_lines(&lines), Ok(2));
    }

    #[test]
    fn test_removed_record_breaks_link() {
        let mut records = chain_of(3);
        let removed = records.remove(1);
        assert_ne!(removed.id, records[1].id);

        assert!(matches!(verify(&records), Err(ChainError::BrokenLink { .. })));
    }

    #[test]
    fn test_verifies_from_anchor() {
        let records = chain_of(4);
        assert!(verify(&records[2..]).is_ok());
        assert!(verify(&[]).is_ok());
    }

    #[test]
    fn test_resume_continues_head() {
        let records = chain_of(1);
        let mut chain = HashChain::resume(Some(records[0].hash.clone()));

        let next = chain.seal(sample_record("/patients/9", 200), Utc::now()).unwrap();
        assert_eq!(next.previous_hash.as_deref(), Some(records[0].hash.as_str()));
        assert_eq!(chain.head(), Some(next.hash.as_str()));
    }
}
