//! Buffered columnar storage sink, per `spec.md` §4.10: in-memory buffers
//! keyed by `(source, symbol, type)` partition, a background flusher, and
//! an eager flush when a buffer reaches capacity.
//!
//! Within one calendar day a partition's parquet writer stays open across
//! flushes, appending one row group per flush; the writer is finalized
//! (footer written) only when the day rolls over or the sink shuts down.
//! Parquet's format has no supported way to append a row group to an
//! already-closed file, so "closes it" in the spec is read as "closes it
//! when the partition's file stops accepting new row groups", not "after
//! every flush".

pub mod codec;
pub mod path;
pub mod schema;

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use dashmap::DashMap;
use ingest_types::{Compression, EventKind, IngestError, MarketEvent, StorageConfig};
use parquet::file::writer::SerializedFileWriter;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use self::codec::CompressedWriter;
use self::path::{partition_path, PartitionKey};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PartitionId {
    source: String,
    symbol: String,
    kind: EventKind,
}

/// An open parquet writer plus the day it was opened for, so the sink can
/// tell when a partition needs to roll over to a fresh file.
struct OpenFile {
    writer: SerializedFileWriter<CompressedWriter<File>>,
    day: (i32, u32, u32),
}

struct Partition {
    events: Vec<MarketEvent>,
    file: Option<OpenFile>,
}

impl Partition {
    const fn new() -> Self {
        Self { events: Vec::new(), file: None }
    }
}

/// Buffered, partitioned, columnar event sink.
///
/// `append` is lock-free with respect to other partitions: each partition
/// gets its own [`tokio::sync::Mutex`], reached through a [`DashMap`] shard.
pub struct StorageSink {
    cfg: StorageConfig,
    partitions: Arc<DashMap<PartitionId, Arc<AsyncMutex<Partition>>>>,
}

impl StorageSink {
    #[must_use]
    pub fn new(cfg: StorageConfig) -> Self {
        Self { cfg, partitions: Arc::new(DashMap::new()) }
    }

    fn partition_for(&self, id: &PartitionId) -> Arc<AsyncMutex<Partition>> {
        if let Some(existing) = self.partitions.get(id) {
            return Arc::clone(&existing);
        }
        Arc::clone(self.partitions.entry(id.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(Partition::new()))).value())
    }

    /// Buffer `event`, flushing its partition eagerly if it has reached
    /// `buffer_size`.
    ///
    /// # Errors
    /// Returns an [`IngestError`] if an eager flush fails.
    pub async fn append(&self, event: MarketEvent) -> Result<(), IngestError> {
        let id = PartitionId { source: event.source.clone(), symbol: event.symbol.clone(), kind: event.kind };
        let partition = self.partition_for(&id);
        let should_flush = {
            let mut guard = partition.lock().await;
            guard.events.push(event);
            guard.events.len() >= self.cfg.buffer_size
        };
        if should_flush {
            self.flush_partition(&id, &partition).await?;
        }
        Ok(())
    }

    /// Flush every partition with buffered events. Called by the background
    /// flusher loop and once more on graceful shutdown.
    ///
    /// # Errors
    /// Returns the first [`IngestError`] encountered; subsequent partitions
    /// are still attempted so one bad partition cannot stall the others.
    pub async fn flush_all(&self) -> Result<(), IngestError> {
        let ids: Vec<PartitionId> = self.partitions.iter().map(|e| e.key().clone()).collect();
        let mut first_error = None;
        for id in ids {
            let partition = self.partition_for(&id);
            if let Err(err) = self.flush_partition(&id, &partition).await {
                tracing::warn!(source = %id.source, symbol = %id.symbol, kind = %id.kind, error = %err, "partition flush failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Finalize and close every partition's writer. Call once, on shutdown.
    ///
    /// # Errors
    /// Returns the first [`IngestError`] encountered while closing writers.
    pub async fn close_all(&self) -> Result<(), IngestError> {
        self.flush_all().await?;
        let ids: Vec<PartitionId> = self.partitions.iter().map(|e| e.key().clone()).collect();
        let mut first_error = None;
        for id in ids {
            let partition = self.partition_for(&id);
            let mut guard = partition.lock().await;
            if let Some(open) = guard.file.take() {
                if let Err(err) = close_writer(open.writer) {
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn flush_partition(&self, id: &PartitionId, partition: &Arc<AsyncMutex<Partition>>) -> Result<(), IngestError> {
        let mut guard = partition.lock().await;
        if guard.events.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut guard.events);
        let representative_date = batch.first().map_or_else(Utc::now, |e| e.timestamp);
        let day = (representative_date.year(), representative_date.month(), representative_date.day());

        if let Some(open) = &guard.file {
            if open.day != day {
                if let Some(open) = guard.file.take() {
                    close_writer(open.writer)?;
                }
            }
        }

        if guard.file.is_none() {
            let key = PartitionKey { source: id.source.clone(), symbol: id.symbol.clone(), kind: id.kind, asset_kind: None, date: representative_date };
            let target = partition_path(&self.cfg.root_dir, self.cfg.path_layout, &key, self.cfg.compression);
            let writer = open_writer(&target, id.kind, self.cfg.compression)?;
            guard.file = Some(OpenFile { writer, day });
        }

        let open = guard.file.as_mut().expect("file just populated above");
        schema::write_row_group(&mut open.writer, id.kind, &batch).map_err(|e| IngestError::Io(e.to_string()))?;
        Ok(())
    }
}

fn open_writer(target: &std::path::Path, kind: EventKind, compression: Compression) -> Result<SerializedFileWriter<CompressedWriter<File>>, IngestError> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| IngestError::Io(e.to_string()))?;
    }
    let file = File::create(target).map_err(|e| IngestError::Io(e.to_string()))?;
    let sink = CompressedWriter::new(file, compression).map_err(|e| IngestError::Io(e.to_string()))?;
    schema::new_writer(sink, kind).map_err(|e| IngestError::Io(e.to_string()))
}

fn close_writer(writer: SerializedFileWriter<CompressedWriter<File>>) -> Result<(), IngestError> {
    let sink = writer.into_inner().map_err(|e| IngestError::Io(e.to_string()))?;
    sink.finish().map_err(|e| IngestError::Io(e.to_string()))?;
    Ok(())
}

/// Run the background flusher loop until `ct` is cancelled. On cancellation,
/// flushes and closes every partition once more before returning.
pub async fn run_flusher(sink: Arc<StorageSink>, interval: std::time::Duration, ct: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            () = ct.cancelled() => {
                if let Err(err) = sink.close_all().await {
                    tracing::warn!(error = %err, "final storage flush failed");
                }
                return;
            }
            _ = ticker.tick() => {
                if let Err(err) = sink.flush_all().await {
                    tracing::warn!(error = %err, "periodic storage flush failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ingest_types::PathLayout;
    use serde_json::json;

    fn trade(symbol: &str, price: f64, seq: u64, ts: DateTime<Utc>) -> MarketEvent {
        MarketEvent {
            timestamp: ts,
            symbol: symbol.to_string(),
            kind: EventKind::Trade,
            payload: json!({ "price": price, "size": 1.0 }),
            sequence: seq,
            source: "mock".to_string(),
            schema_version: 1,
        }
    }

    fn cfg(root: PathBuf) -> StorageConfig {
        StorageConfig { root_dir: root, buffer_size: 3, flush_interval: std::time::Duration::from_secs(30), path_layout: PathLayout::Flat, compression: Compression::None }
    }

    #[tokio::test]
    async fn eager_flush_creates_a_file_at_buffer_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let sink = StorageSink::new(cfg(dir.path().to_path_buf()));
        let ts = Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap();
        for i in 0..3u64 {
            sink.append(trade("AAPL", 100.0 + i as f64, i, ts)).await.unwrap();
        }
        let expected = dir.path().join("AAPL.trade.parquet");
        assert!(expected.exists());
    }

    #[tokio::test]
    async fn distinct_kinds_and_symbols_never_share_a_partition() {
        let dir = tempfile::tempdir().unwrap();
        let sink = StorageSink::new(cfg(dir.path().to_path_buf()));
        let ts = Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap();
        sink.append(trade("AAPL", 100.0, 0, ts)).await.unwrap();
        sink.append(trade("MSFT", 200.0, 0, ts)).await.unwrap();
        sink.close_all().await.unwrap();
        assert!(dir.path().join("AAPL.trade.parquet").exists());
        assert!(dir.path().join("MSFT.trade.parquet").exists());
    }

    #[tokio::test]
    async fn flush_all_is_a_no_op_for_empty_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let sink = StorageSink::new(cfg(dir.path().to_path_buf()));
        sink.flush_all().await.unwrap();
    }

    #[tokio::test]
    async fn close_all_finalizes_a_partially_filled_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let sink = StorageSink::new(cfg(dir.path().to_path_buf()));
        let ts = Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap();
        sink.append(trade("AAPL", 100.0, 0, ts)).await.unwrap();
        sink.close_all().await.unwrap();
        assert!(dir.path().join("AAPL.trade.parquet").exists());
    }
}
