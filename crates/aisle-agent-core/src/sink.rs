//! Push interface that receives cumulative content as the model produces it.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("content sink closed")]
/// The consumer went away; nothing more will be delivered.
pub struct SinkClosed;

#[async_trait]
/// Trait contract for a streaming consumer of turn content.
pub trait ContentSink: Send + Sync {
    async fn push(&self, content: String) -> Result<(), SinkClosed>;

    fn is_closed(&self) -> bool;
}

#[async_trait]
impl ContentSink for mpsc::UnboundedSender<String> {
    async fn push(&self, content: String) -> Result<(), SinkClosed> {
        self.send(content).map_err(|_| SinkClosed)
    }

    fn is_closed(&self) -> bool {
        mpsc::UnboundedSender::is_closed(self)
    }
}

#[async_trait]
impl ContentSink for mpsc::Sender<String> {
    async fn push(&self, content: String) -> Result<(), SinkClosed> {
        self.send(content).await.map_err(|_| SinkClosed)
    }

    fn is_closed(&self) -> bool {
        mpsc::Sender::is_closed(self)
    }
}

#[derive(Debug, Clone, Copy, Default)]
/// Sink for non-streaming callers; accepts and drops every chunk.
pub struct DiscardSink;

#[async_trait]
impl ContentSink for DiscardSink {
    async fn push(&self, _content: String) -> Result<(), SinkClosed> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}
