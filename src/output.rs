//! Snapshot assembly and hand-off to the downstream consumer.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use std::io::Write;
use tokio::sync::mpsc;
use tracing::debug;

use crate::index::build_indexes;
use crate::status::Status;
use crate::types::{ParsedSnapshot, Snapshot};

/// Format of [`Snapshot::last_update`].
pub const LAST_UPDATE_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Indexes a successfully decoded body and wraps it for emission, stamped
/// with the current local time.
pub fn assemble_snapshot(parsed: ParsedSnapshot) -> Snapshot {
    let (data, orders) = build_indexes(&parsed.rows);
    Snapshot {
        data,
        json: parsed,
        orders,
        last_update: Local::now().format(LAST_UPDATE_FORMAT).to_string(),
        last_status: Status::Success,
    }
}

/// The downstream consumer of snapshots.
///
/// Receives one snapshot per successful cycle and nothing otherwise, so a
/// consumer keeps working on the last snapshot it got while the endpoint is
/// degraded.
#[async_trait]
pub trait SnapshotSink: Send {
    async fn emit(&mut self, snapshot: Snapshot) -> Result<()>;
}

/// Hands snapshots to another task over a channel.
pub struct ChannelSink {
    tx: mpsc::Sender<Snapshot>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Snapshot>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl SnapshotSink for ChannelSink {
    async fn emit(&mut self, snapshot: Snapshot) -> Result<()> {
        self.tx
            .send(snapshot)
            .await
            .map_err(|_| anyhow::anyhow!("snapshot receiver was dropped"))
    }
}

/// Writes each snapshot as one JSON line, for a consumer on the other end of
/// a pipe.
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: Write + Send> SnapshotSink for JsonLinesSink<W> {
    async fn emit(&mut self, snapshot: Snapshot) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &snapshot).context("serialize snapshot")?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        debug!(lines = snapshot.data.len(), "Snapshot written");
        Ok(())
    }
}
