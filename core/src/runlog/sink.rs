use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

/// Destination for flushed log batches. The file sink is the normal case;
/// silent mode is the same contract as a no-op.
#[async_trait]
pub trait LogSink: Send {
    async fn write(&mut self, chunk: &[u8]) -> std::io::Result<()>;
    async fn shutdown(&mut self) -> std::io::Result<()>;
}

pub struct FileSink {
    file: tokio::fs::File,
}

impl FileSink {
    pub fn new(file: tokio::fs::File) -> Self {
        Self { file }
    }
}

#[async_trait]
impl LogSink for FileSink {
    async fn write(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.file.write_all(chunk).await?;
        self.file.flush().await
    }

    async fn shutdown(&mut self) -> std::io::Result<()> {
        self.file.flush().await
    }
}

pub struct NullSink;

#[async_trait]
impl LogSink for NullSink {
    async fn write(&mut self, _chunk: &[u8]) -> std::io::Result<()> {
        Ok(())
    }

    async fn shutdown(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
