//! Audit trail persistence layer
//!
//! Provides file-based persistence for audit records with:
//! - JSON-lines format for append-only writes
//! - Automatic rotation based on size/time
//! - Per-record retention and purge of fully expired, intact files
//! - Query and filter capabilities
//! - Export functionality for compliance reports

use chrono::{DateTime, FixedOffset, Months, Utc};
use pharmaguard_core::{AuditRecord, EntityType, EventType, Result, RiskLevel};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::audit::{self, HashChain};

const CURRENT_FILE: &str = "audit_current.jsonl";

/// Configuration for audit persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory to store audit files
    #[serde(default = "default_audit_dir")]
    pub audit_dir: PathBuf,

    /// Maximum file size before rotation (bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Maximum age before rotation (seconds)
    #[serde(default = "default_max_file_age")]
    pub max_file_age_secs: u64,

    /// Flush to disk after this many records
    #[serde(default = "default_flush_interval")]
    pub flush_interval: usize,

    /// How often expired rotated files are purged (seconds)
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            audit_dir: default_audit_dir(),
            max_file_size: default_max_file_size(),
            max_file_age_secs: default_max_file_age(),
            flush_interval: default_flush_interval(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

fn default_audit_dir() -> PathBuf {
    PathBuf::from("./audit")
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024 // 100MB
}

fn default_max_file_age() -> u64 {
    86400 // 24 hours
}

fn default_flush_interval() -> usize {
    1
}

fn default_purge_interval() -> u64 {
    3600
}

/// Audit record as written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Unique record ID
    pub id: String,

    /// SHA-256 of this record
    pub hash: String,

    /// Hash of the record written before this one
    pub previous_hash: Option<String>,

    /// When the store accepted the record
    pub recorded_at: DateTime<Utc>,

    /// End of the mandated retention horizon
    pub retain_until: DateTime<FixedOffset>,

    #[serde(flatten)]
    pub record: AuditRecord,
}

impl StoredRecord {
    /// Wrap a record; the hash fields are filled in by [`HashChain::seal`]
    pub fn new(record: AuditRecord, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: generate_record_id(),
            hash: String::new(),
            previous_hash: None,
            recorded_at,
            retain_until: retain_until(&record),
            record,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.retain_until < now
    }
}

/// `occurred_at` plus the record's retention horizon
pub fn retain_until(record: &AuditRecord) -> DateTime<FixedOffset> {
    let months = Months::new(u32::from(record.retention_years()) * 12);
    record
        .occurred_at
        .checked_add_months(months)
        .unwrap_or(record.occurred_at)
}

/// Generate a cryptographically secure unique record ID using UUID v4
fn generate_record_id() -> String {
    format!("aud_{}", uuid::Uuid::new_v4())
}

/// Audit file writer with rotation support
pub struct AuditWriter {
    config: PersistenceConfig,
    current_file: Option<BufWriter<File>>,
    current_path: PathBuf,
    current_size: u64,
    current_start: Instant,
    records_since_flush: usize,
    chain: HashChain,
}

impl AuditWriter {
    /// Create a new audit writer, continuing any chain already on disk
    ///
    /// A partial last line left by an interrupted write is cut off first, so
    /// the next record starts on a line of its own.
    pub fn new(config: PersistenceConfig) -> Result<Self> {
        // Ensure audit directory exists
        std::fs::create_dir_all(&config.audit_dir)?;

        let current_path = config.audit_dir.join(CURRENT_FILE);
        if current_path.exists() {
            truncate_torn_tail(&current_path)?;
        }
        let head = last_hash(&config.audit_dir)?;

        let mut writer = Self {
            config,
            current_file: None,
            current_path,
            current_size: 0,
            current_start: Instant::now(),
            records_since_flush: 0,
            chain: HashChain::resume(head),
        };

        writer.open_current_file()?;
        Ok(writer)
    }

    /// Hash-chain a record and append it to the audit log
    pub fn write(&mut self, record: &AuditRecord) -> Result<StoredRecord> {
        // Check if rotation is needed
        if self.should_rotate() {
            self.rotate()?;
        }

        let stored = self.chain.seal(record.clone(), Utc::now())?;

        // Serialize record to JSON line
        let mut line = serde_json::to_vec(&stored)?;
        line.push(b'\n');

        let writer = match self.current_file.as_mut() {
            Some(writer) => writer,
            None => return Err(pharmaguard_core::Error::store("audit file is not open")),
        };

        writer.write_all(&line)?;
        self.current_size += line.len() as u64;
        self.records_since_flush += 1;

        // Flush if needed
        if self.records_since_flush >= self.config.flush_interval {
            writer.flush()?;
            self.records_since_flush = 0;
        }

        Ok(stored)
    }

    /// Force flush to disk
    pub fn flush(&mut self) -> Result<()> {
        if let Some(ref mut writer) = self.current_file {
            writer.flush()?;
            self.records_since_flush = 0;
        }
        Ok(())
    }

    /// Rotate to a new file regardless of size and age
    pub fn rotate(&mut self) -> Result<()> {
        // Flush and close current file
        if let Some(ref mut writer) = self.current_file {
            writer.flush()?;
        }
        self.current_file = None;

        if self.current_size > 0 {
            let rotated_path = rotated_path(&self.config.audit_dir);
            match std::fs::rename(&self.current_path, &rotated_path) {
                Ok(()) => info!("Rotated audit file to: {:?}", rotated_path),
                Err(e) => warn!("Failed to rotate audit file: {}", e),
            }
        }

        self.open_current_file()
    }

    /// Hash of the last record written
    pub fn head(&self) -> Option<&str> {
        self.chain.head()
    }

    fn should_rotate(&self) -> bool {
        if self.current_size >= self.config.max_file_size {
            return true;
        }

        self.current_size > 0
            && self.current_start.elapsed() >= Duration::from_secs(self.config.max_file_age_secs)
    }

    fn open_current_file(&mut self) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.current_path)?;

        self.current_size = file.metadata()?.len();
        self.current_start = Instant::now();
        self.current_file = Some(BufWriter::new(file));
        self.records_since_flush = 0;

        Ok(())
    }
}

impl Drop for AuditWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush audit writer on drop: {}", e);
        }
    }
}

/// Cut a file back to its last complete line
fn truncate_torn_tail(path: &Path) -> Result<()> {
    const CHUNK: u64 = 4096;

    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }

    let mut buf = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut buf)?;
    if buf[0] == b'\n' {
        return Ok(());
    }

    // Scan backwards for the newline ending the last complete record
    let mut end = len;
    let mut keep = 0;
    while end > 0 {
        let start = end.saturating_sub(CHUNK);
        let mut chunk = vec![0u8; (end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            keep = start + pos as u64 + 1;
            break;
        }
        end = start;
    }

    warn!(
        "Truncating {} bytes of an incomplete audit record in {:?}",
        len - keep,
        path
    );
    file.set_len(keep)?;
    file.sync_all()?;
    Ok(())
}

/// Timestamped name for a rotated file, sortable after older ones
fn rotated_path(dir: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6f");
    let mut path = dir.join(format!("audit_{}.jsonl", stamp));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("audit_{}_{}.jsonl", stamp, n));
        n += 1;
    }
    path
}

/// Audit files in write order: rotated files oldest first, then the current file
pub fn audit_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut rotated = Vec::new();
    let mut current = None;

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.extension().is_some_and(|e| e == "jsonl") {
            continue;
        }
        if path.file_name().is_some_and(|n| n == CURRENT_FILE) {
            current = Some(path);
        } else {
            rotated.push(path);
        }
    }

    rotated.sort();
    rotated.extend(current);
    Ok(rotated)
}

/// One non-empty line of an audit file
#[derive(Debug, Clone)]
pub enum AuditLine {
    Record(StoredRecord),
    /// A line that does not parse; `line` is 1-based
    Unreadable { path: PathBuf, line: usize },
}

impl AuditLine {
    pub fn into_record(self) -> Option<StoredRecord> {
        match self {
            Self::Record(stored) => Some(stored),
            Self::Unreadable { path, line } => {
                warn!("Skipping unreadable audit record at {:?} line {}", path, line);
                None
            }
        }
    }
}

/// Read every line of one file
fn read_file(path: &Path) -> Result<Vec<AuditLine>> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<StoredRecord>(&line) {
            Ok(stored) => lines.push(AuditLine::Record(stored)),
            Err(_) => lines.push(AuditLine::Unreadable {
                path: path.to_path_buf(),
                line: index + 1,
            }),
        }
    }

    Ok(lines)
}

fn last_hash(dir: &Path) -> Result<Option<String>> {
    for path in audit_files(dir)?.iter().rev() {
        let last = read_file(path)?.into_iter().rev().find_map(|line| match line {
            AuditLine::Record(stored) => Some(stored.hash),
            AuditLine::Unreadable { .. } => None,
        });
        if last.is_some() {
            return Ok(last);
        }
    }
    Ok(None)
}

/// Remove rotated files whose records have all passed their retention horizon
///
/// A file is kept if any line is unreadable or any record fails its hash, so
/// an edited retention horizon never leads to deletion.
pub fn purge_expired(dir: &Path, now: DateTime<Utc>) -> Result<usize> {
    let mut removed = 0;

    for path in audit_files(dir)? {
        if path.file_name().is_some_and(|n| n == CURRENT_FILE) {
            continue;
        }

        let lines = read_file(&path)?;
        let mut intact = true;
        let mut expired = !lines.is_empty();
        for line in &lines {
            match line {
                AuditLine::Record(stored) if audit::is_intact(stored) => {
                    expired &= stored.is_expired(now);
                }
                _ => intact = false,
            }
        }

        if !intact {
            warn!("Audit file {:?} failed integrity checks, not purging", path);
            continue;
        }
        if expired {
            info!("Removing expired audit file: {:?}", path);
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }

    Ok(removed)
}

/// Query filter for audit records
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditQuery {
    /// Filter by event type
    pub event_type: Option<EventType>,

    /// Filter by actor
    pub actor_id: Option<u64>,

    /// Filter by entity type
    pub entity_type: Option<EntityType>,

    /// Filter by minimum risk level
    pub min_risk: Option<RiskLevel>,

    /// Only records flagged as PHI access
    pub phi_only: bool,

    /// Filter by request ID
    pub request_id: Option<String>,

    /// Start time filter (inclusive)
    pub start_time: Option<DateTime<FixedOffset>>,

    /// End time filter (inclusive)
    pub end_time: Option<DateTime<FixedOffset>>,

    /// Maximum results to return
    pub limit: Option<usize>,

    /// Offset for pagination
    pub offset: Option<usize>,
}

impl AuditQuery {
    /// Create a new empty query
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn actor_id(mut self, actor_id: u64) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    pub fn min_risk(mut self, level: RiskLevel) -> Self {
        self.min_risk = Some(level);
        self
    }

    pub fn phi_only(mut self) -> Self {
        self.phi_only = true;
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Set time range
    pub fn time_range(mut self, start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    /// Set limit and offset
    pub fn paginate(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    /// Set just limit (for convenience)
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check if a record matches every set filter
    pub fn matches(&self, stored: &StoredRecord) -> bool {
        let record = &stored.record;

        if self.event_type.is_some_and(|t| t != record.event_type) {
            return false;
        }

        if self.actor_id.is_some() && self.actor_id != record.actor_id() {
            return false;
        }

        if self.entity_type.is_some() && self.entity_type != record.entity.entity_type {
            return false;
        }

        if self.min_risk.is_some_and(|min| record.risk_level < min) {
            return false;
        }

        if self.phi_only && !record.flags.is_phi_access {
            return false;
        }

        if let Some(ref request_id) = self.request_id {
            if &record.correlation.request_id != request_id {
                return false;
            }
        }

        if self.start_time.is_some_and(|start| record.occurred_at < start) {
            return false;
        }

        if self.end_time.is_some_and(|end| record.occurred_at > end) {
            return false;
        }

        true
    }
}

/// Audit reader for querying persisted records
#[derive(Debug, Clone)]
pub struct AuditReader {
    config: PersistenceConfig,
}

impl AuditReader {
    /// Create a new audit reader
    pub fn new(config: PersistenceConfig) -> Self {
        Self { config }
    }

    /// Every line on disk, in write order, including unreadable ones
    pub fn read_lines(&self) -> Result<Vec<AuditLine>> {
        let mut lines = Vec::new();
        for path in audit_files(&self.config.audit_dir)? {
            lines.extend(read_file(&path)?);
        }
        Ok(lines)
    }

    /// Every readable record on disk, in write order
    pub fn read_all(&self) -> Result<Vec<StoredRecord>> {
        Ok(self
            .read_lines()?
            .into_iter()
            .filter_map(AuditLine::into_record)
            .collect())
    }

    /// Query audit records
    pub fn query(&self, query: &AuditQuery) -> Result<Vec<StoredRecord>> {
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(1000);

        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| query.matches(r))
            .skip(offset)
            .take(limit)
            .collect())
    }

    /// Count total records matching query
    pub fn count(&self, query: &AuditQuery) -> Result<usize> {
        Ok(self.read_all()?.iter().filter(|r| query.matches(r)).count())
    }

    /// Export records to a file for compliance reporting
    pub fn export_to_file(
        &self,
        query: &AuditQuery,
        output_path: &Path,
        format: ExportFormat,
    ) -> Result<usize> {
        let records = self.query(query)?;
        let mut file = BufWriter::new(File::create(output_path)?);
        write_export(&mut file, &records, format)?;
        file.flush()?;
        Ok(records.len())
    }
}

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// JSON Lines format (one JSON object per line)
    #[default]
    JsonLines,
    /// Pretty-printed JSON array
    Json,
    /// CSV format
    Csv,
}

const CSV_HEADER: &str = "id,occurred_at,event_type,entity_type,entity_id,actor_id,ip_address,\
method,path,status_code,risk_level,data_classification,is_phi_access,\
is_controlled_substance,is_financial_data,retention_years,request_id,description";

/// Write records in the given format
pub fn write_export<W: Write>(out: &mut W, records: &[StoredRecord], format: ExportFormat) -> Result<()> {
    match format {
        ExportFormat::JsonLines => {
            for stored in records {
                serde_json::to_writer(&mut *out, stored)?;
                writeln!(out)?;
            }
        }
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, records)?;
        }
        ExportFormat::Csv => {
            writeln!(out, "{}", CSV_HEADER)?;

            for stored in records {
                let r = &stored.record;
                let fields = [
                    stored.id.clone(),
                    r.occurred_at.to_rfc3339(),
                    r.event_type.to_string(),
                    r.entity.entity_type.map(|t| t.to_string()).unwrap_or_default(),
                    r.entity.entity_id.map(|id| id.to_string()).unwrap_or_default(),
                    r.actor_id().map(|id| id.to_string()).unwrap_or_default(),
                    r.network.ip_address.clone().unwrap_or_default(),
                    r.route.method.clone(),
                    r.route.path.clone(),
                    r.status_code.to_string(),
                    r.risk_level.to_string(),
                    r.data_classification.to_string(),
                    r.flags.is_phi_access.to_string(),
                    r.flags.is_controlled_substance.to_string(),
                    r.flags.is_financial_data.to_string(),
                    r.flags.retention_years.to_string(),
                    r.correlation.request_id.clone(),
                    r.description.clone(),
                ];

                let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
                writeln!(out, "{}", line.join(","))?;
            }
        }
    }

    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
