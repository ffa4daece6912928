//! Telemetry records and the relay that delivers them.
//!
//! Records are posted through a cloneable [`TelemetrySink`] onto an unbounded
//! queue. A single background task owned by the [`TelemetryRelay`] forwards
//! each record to every registered [`TelemetryService`]. Shutting the relay
//! down drains the queue and flushes every service.
//!
//! # Example
//!
//! ```
//! use compscan::telemetry::{LoggingTelemetryService, TelemetryRelay};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (relay, sink) = TelemetryRelay::start(vec![Arc::new(LoggingTelemetryService)]);
//! assert_eq!(sink.correlation_id(), relay.correlation_id());
//! relay.shutdown().await;
//! # }
//! ```

mod records;

pub use records::*;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long shutdown waits for queued records to be delivered.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(20);

/// A typed telemetry payload.
pub trait Record: Serialize + Send {
    /// Name the record is published under.
    fn record_name(&self) -> &'static str;

    /// Called by [`TelemetryGuard`] with the time the record was alive.
    fn set_execution_time(&mut self, _elapsed: Duration) {}
}

/// A record as delivered to services.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub name: &'static str,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// A destination for telemetry records.
pub trait TelemetryService: Send + Sync {
    fn post_record(&self, record: &TelemetryRecord);

    fn flush(&self) {}
}

/// Writes every record to the debug log.
pub struct LoggingTelemetryService;

impl TelemetryService for LoggingTelemetryService {
    fn post_record(&self, record: &TelemetryRecord) {
        debug!(
            record = record.name,
            correlation_id = %record.correlation_id,
            payload = %record.payload,
            "Telemetry"
        );
    }
}

/// Appends every record as one JSON line to a file.
pub struct FileTelemetryService {
    writer: Mutex<BufWriter<File>>,
}

impl FileTelemetryService {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl TelemetryService for FileTelemetryService {
    fn post_record(&self, record: &TelemetryRecord) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize telemetry record");
                return;
            }
        };
        if let Ok(mut writer) = self.writer.lock() {
            if let Err(e) = writeln!(writer, "{}", line) {
                warn!(error = %e, "Failed to write telemetry record");
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut writer) = self.writer.lock() {
            if let Err(e) = writer.flush() {
                warn!(error = %e, "Failed to flush telemetry file");
            }
        }
    }
}

/// Cloneable handle for posting records.
#[derive(Debug, Clone)]
pub struct TelemetrySink {
    tx: mpsc::UnboundedSender<TelemetryRecord>,
    correlation_id: Arc<str>,
}

impl TelemetrySink {
    /// A sink whose records go nowhere.
    pub fn disabled() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self {
            tx,
            correlation_id: Arc::from(uuid::Uuid::new_v4().to_string()),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn post<R: Record>(&self, record: &R) {
        let payload = match serde_json::to_value(record) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(record = record.record_name(), error = %e, "Failed to serialize telemetry record");
                return;
            }
        };
        let envelope = TelemetryRecord {
            name: record.record_name(),
            correlation_id: self.correlation_id.to_string(),
            timestamp: Utc::now(),
            payload,
        };
        // A closed relay just drops records.
        let _ = self.tx.send(envelope);
    }

    /// Wraps `record` in a guard that posts it when dropped.
    pub fn track<R: Record>(&self, record: R) -> TelemetryGuard<R> {
        TelemetryGuard {
            record,
            started: Instant::now(),
            sink: self.clone(),
        }
    }
}

/// Posts its record to the sink when dropped, stamped with the elapsed time.
pub struct TelemetryGuard<R: Record> {
    record: R,
    started: Instant,
    sink: TelemetrySink,
}

impl<R: Record> Deref for TelemetryGuard<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.record
    }
}

impl<R: Record> DerefMut for TelemetryGuard<R> {
    fn deref_mut(&mut self) -> &mut R {
        &mut self.record
    }
}

impl<R: Record> Drop for TelemetryGuard<R> {
    fn drop(&mut self) {
        self.record.set_execution_time(self.started.elapsed());
        self.sink.post(&self.record);
    }
}

/// Owns the background task that forwards records to services.
pub struct TelemetryRelay {
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
    correlation_id: Arc<str>,
}

impl TelemetryRelay {
    /// Starts the relay and returns it with a sink for posting records.
    pub fn start(services: Vec<Arc<dyn TelemetryService>>) -> (Self, TelemetrySink) {
        let (tx, mut rx) = mpsc::unbounded_channel::<TelemetryRecord>();
        let correlation_id: Arc<str> = Arc::from(uuid::Uuid::new_v4().to_string());
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(record) => deliver(&services, &record),
                        None => break,
                    },
                    _ = token.cancelled() => {
                        rx.close();
                        while let Some(record) = rx.recv().await {
                            deliver(&services, &record);
                        }
                        break;
                    }
                }
            }
            for service in &services {
                service.flush();
            }
        });

        let sink = TelemetrySink {
            tx,
            correlation_id: Arc::clone(&correlation_id),
        };
        (
            Self {
                handle,
                shutdown,
                correlation_id,
            },
            sink,
        )
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Delivers everything already queued, flushes the services and stops.
    ///
    /// Gives up after [`SHUTDOWN_TIMEOUT`].
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let abort = self.handle.abort_handle();
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, self.handle).await.is_err() {
            warn!(
                timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                "Telemetry did not flush in time"
            );
            abort.abort();
        }
    }
}

fn deliver(services: &[Arc<dyn TelemetryService>], record: &TelemetryRecord) {
    for service in services {
        service.post_record(record);
    }
}
