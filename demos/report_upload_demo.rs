//! Minimal example: encrypted report upload, download and delete.
//!
//! Run with: `cargo run --example report_upload_demo`
//!
//! Reads the master secret from `MASTER_ENCRYPTION_KEY`, which must be set:
//!
//! ```sh
//! MASTER_ENCRYPTION_KEY=$(openssl rand -hex 32) cargo run --example report_upload_demo
//! ```
//!
//! Set `RUST_LOG=medvault=debug` to see the
//! key lifecycle in the logs. The audit trail is written to a JSON-lines
//! file in the temp directory.

use std::error::Error;
use std::sync::Arc;

use medvault::audit::FileAuditSink;
use medvault::{
    EnvelopeConfig, EnvelopeError, InMemoryBlobStore, InMemoryKeyStore, ReportArchive,
};
use medvault::config::MASTER_SECRET_VAR;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("medvault=info")),
        )
        .init();

    // 1. Setup
    let config = EnvelopeConfig::from_env().map_err(|err| {
        eprintln!("{err}");
        eprintln!("set {MASTER_SECRET_VAR} to a long random value and run again");
        err
    })?;

    let archive = ReportArchive::from_config(
        Arc::new(InMemoryKeyStore::new()),
        Arc::new(InMemoryBlobStore::new()),
        &config,
    );

    let audit_path = std::env::temp_dir().join("medvault_audit.jsonl");
    archive
        .envelope()
        .add_audit_sink(Box::new(FileAuditSink::new(&audit_path)?))?;

    // 2. Patient uploads a report
    let report = archive.upload(
        "patient-42",
        "visual-field.pdf",
        "application/pdf",
        b"%PDF-1.7 visual field: within normal limits",
    )?;
    println!("Stored {} at {}", report.file_name, report.locator);

    // 3. Owner reads it back; anyone else is refused
    let file = archive.download(&report, "patient-42")?;
    println!("Downloaded {} ({} bytes)", file.file_name, file.data.len());

    match archive.download(&report, "patient-7") {
        Err(EnvelopeError::KeyNotFoundOrRevoked) => println!("patient-7 denied"),
        other => println!("unexpected: {other:?}"),
    }

    // 4. Delete revokes the key; the ciphertext is now unreadable
    archive.delete(&report, "patient-42")?;
    assert!(archive.download(&report, "patient-42").is_err());
    println!("Report deleted");

    // 5. Audit log
    let log = archive.envelope().audit_log();
    log.flush();
    println!("Audit log: {} record(s)", log.len());
    for record in log.snapshot() {
        println!(
            "  {:?} {} by {} @ {}",
            record.action, record.record_id, record.owner_id, record.timestamp
        );
    }
    println!("Full audit also written to: {}", audit_path.display());

    Ok(())
}
