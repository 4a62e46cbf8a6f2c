//! Key-lifecycle audit trail.
//!
//! Records every key creation, decryption attempt and revocation. Records
//! hold no key material, hashes or file contents. The most recent records
//! are retained in memory up to a fixed capacity; older ones are dropped.
//!
//! Records can be forwarded to pluggable sinks (file, database, log
//! shipper). Sinks run on a dedicated forwarding thread, so a slow sink
//! never holds up the operation that produced the record.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::store::{KeyId, OwnerId};

/// Number of records kept in memory by [`AuditLog::new`].
pub const DEFAULT_RETAINED_RECORDS: usize = 4096;

/// A sink that receives audit records. Implement this to forward records
/// to a file, database, or other persistent store.
///
/// Sinks are called from the forwarding thread, one record at a time, in
/// the order the records were produced.
pub trait AuditSink: Send {
    /// Append a record. Called once per audited event.
    fn append(&mut self, record: AuditRecord);
}

/// What happened to a key record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAction {
    /// A new data key was generated, wrapped and stored.
    Created,
    /// A file was decrypted with the record's key.
    Decrypted,
    /// Lookup failed: missing, not owned by the caller, or revoked.
    Denied,
    /// The wrapped key could not be unwrapped: corrupted, or the master
    /// secret changed.
    UnwrapFailed,
    /// The unwrapped key did not match the stored hash.
    IntegrityFailure,
    /// The file ciphertext failed authentication.
    TamperDetected,
    /// Revocation was requested. Logged whether or not the record existed.
    Revoked,
}

/// A permanent record of a key-lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub record_id: KeyId,
    /// The principal that made the request, not necessarily the owner.
    pub owner_id: OwnerId,
    pub action: KeyAction,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn now(record_id: KeyId, owner_id: &str, action: KeyAction) -> Self {
        Self {
            record_id,
            owner_id: owner_id.to_string(),
            action,
            timestamp: Utc::now(),
        }
    }
}

enum Dispatch {
    Record(AuditRecord),
    AddSink(Box<dyn AuditSink>),
    Flush(mpsc::SyncSender<()>),
}

struct Forwarder {
    sender: mpsc::Sender<Dispatch>,
    worker: JoinHandle<()>,
}

/// A bounded log of recent key events.
/// Can forward records to additional sinks via `add_forward_sink`.
pub struct AuditLog {
    recent: Mutex<VecDeque<AuditRecord>>,
    capacity: usize,
    forwarder: Mutex<Option<Forwarder>>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("retained", &self.len())
            .field("capacity", &self.capacity)
            .field("forwarding", &self.forwarder.lock().is_some())
            .finish()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RETAINED_RECORDS)
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log retaining at most `capacity` records in memory. Zero keeps
    /// nothing in memory; sinks still receive every record.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            recent: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_RETAINED_RECORDS))),
            capacity,
            forwarder: Mutex::new(None),
        }
    }

    /// Add a sink to receive a copy of every future record.
    ///
    /// The first sink starts the forwarding thread.
    pub fn add_forward_sink(&self, sink: Box<dyn AuditSink>) -> io::Result<()> {
        let mut forwarder = self.forwarder.lock();
        if let Some(existing) = forwarder.as_ref() {
            return existing
                .sender
                .send(Dispatch::AddSink(sink))
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "audit forwarder stopped"));
        }

        let (sender, receiver) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("medvault-audit".into())
            .spawn(move || forward(receiver, vec![sink]))?;
        *forwarder = Some(Forwarder { sender, worker });
        Ok(())
    }

    /// Record an event and hand it to the forwarding thread.
    pub fn append(&self, record: AuditRecord) {
        if self.capacity > 0 {
            let mut recent = self.recent.lock();
            if recent.len() == self.capacity {
                recent.pop_front();
            }
            recent.push_back(record.clone());
        }

        if let Some(forwarder) = self.forwarder.lock().as_ref() {
            if forwarder.sender.send(Dispatch::Record(record)).is_err() {
                tracing::warn!("audit forwarder stopped; record not forwarded");
            }
        }
    }

    /// Block until every record appended so far has reached the sinks.
    pub fn flush(&self) {
        let (done, wait) = mpsc::sync_channel(1);
        let sent = match self.forwarder.lock().as_ref() {
            Some(forwarder) => forwarder.sender.send(Dispatch::Flush(done)).is_ok(),
            None => false,
        };
        if sent {
            let _ = wait.recv();
        }
    }

    /// Number of records currently retained in memory.
    pub fn len(&self) -> usize {
        self.recent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Retained records, oldest first.
    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.recent.lock().iter().cloned().collect()
    }

    /// Retained records concerning one key record, oldest first.
    pub fn for_record(&self, record_id: &KeyId) -> Vec<AuditRecord> {
        self.recent
            .lock()
            .iter()
            .filter(|r| r.record_id == *record_id)
            .cloned()
            .collect()
    }
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is queued, then exit.
        if let Some(Forwarder { sender, worker }) = self.forwarder.get_mut().take() {
            drop(sender);
            if worker.join().is_err() {
                tracing::warn!("audit sink panicked");
            }
        }
    }
}

fn forward(receiver: mpsc::Receiver<Dispatch>, mut sinks: Vec<Box<dyn AuditSink>>) {
    for message in receiver {
        match message {
            Dispatch::Record(record) => {
                for sink in sinks.iter_mut() {
                    sink.append(record.clone());
                }
            }
            Dispatch::AddSink(sink) => sinks.push(sink),
            Dispatch::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in sink: file
// ---------------------------------------------------------------------------

/// Writes audit records as JSON lines (one per record) to a file.
/// Creates the file if it doesn't exist; appends if it does.
pub struct FileAuditSink {
    file: std::fs::File,
}

impl FileAuditSink {
    /// Open or create a file for append-only audit logging.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl AuditSink for FileAuditSink {
    fn append(&mut self, record: AuditRecord) {
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize audit record");
                return;
            }
        };
        if let Err(err) = writeln!(self.file, "{line}").and_then(|_| self.file.flush()) {
            tracing::warn!(error = %err, "failed to write audit record");
        }
    }
}
