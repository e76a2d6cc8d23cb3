//! Request/response adapter between a transport and the commit log.
//!
//! The log itself is synchronous; every call is moved onto the blocking
//! pool so async callers (RPC handlers, streams) never block a runtime
//! worker on disk I/O.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    config::ServiceConfig,
    error::{LogError, LogResult},
    record::Record,
    storage::Log,
};

/// The slice of the log the service needs.
pub trait CommitLog: Send + Sync + 'static {
    fn append(&self, record: Record) -> LogResult<u64>;
    fn read(&self, offset: u64) -> LogResult<Record>;
}

impl CommitLog for Log {
    fn append(&self, record: Record) -> LogResult<u64> {
        Log::append(self, record)
    }

    fn read(&self, offset: u64) -> LogResult<Record> {
        Log::read(self, offset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceRequest {
    pub record: Record,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceResponse {
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeRequest {
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeResponse {
    pub record: Record,
}

/// Client-visible status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    /// The requested offset does not exist (yet).
    OutOfRange,
    ResourceExhausted,
    Unavailable,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code:?}: {message}")]
pub struct Status {
    pub code: Code,
    pub message: String,
    /// Offset the request asked for, set for [`Code::OutOfRange`].
    pub offset: Option<u64>,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            offset: None,
        }
    }
}

impl From<LogError> for Status {
    fn from(err: LogError) -> Self {
        match err {
            LogError::OffsetOutOfRange { offset } => Self {
                code: Code::OutOfRange,
                message: format!("the requested offset is outside the log's range: {}", offset),
                offset: Some(offset),
            },
            LogError::CapacityExceeded { .. } => Self::new(Code::ResourceExhausted, err.to_string()),
            LogError::Closed => Self::new(Code::Unavailable, err.to_string()),
            other => Self::new(Code::Internal, other.to_string()),
        }
    }
}

/// Produce/consume operations as a transport would expose them.
#[async_trait]
pub trait LogApi: Send + Sync {
    async fn produce(&self, req: ProduceRequest) -> Result<ProduceResponse, Status>;

    async fn consume(&self, req: ConsumeRequest) -> Result<ConsumeResponse, Status>;

    /// Answers each request in order. The response stream ends after the
    /// first error or when the request stream ends.
    async fn produce_stream(
        &self,
        requests: mpsc::Receiver<ProduceRequest>,
    ) -> mpsc::Receiver<Result<ProduceResponse, Status>>;

    /// Streams records from `req.offset` onwards, waiting for offsets that
    /// have not been written yet. Ends when the receiver is dropped or on
    /// any error other than [`Code::OutOfRange`].
    async fn consume_stream(
        &self,
        req: ConsumeRequest,
    ) -> mpsc::Receiver<Result<ConsumeResponse, Status>>;
}

pub struct LogService<L> {
    log: Arc<L>,
    config: ServiceConfig,
}

impl<L> Clone for LogService<L> {
    fn clone(&self) -> Self {
        Self {
            log: self.log.clone(),
            config: self.config.clone(),
        }
    }
}

impl<L: CommitLog> LogService<L> {
    pub fn new(log: Arc<L>, config: ServiceConfig) -> Self {
        Self { log, config }
    }

    pub fn log(&self) -> &Arc<L> {
        &self.log
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, Status>
    where
        T: Send + 'static,
        F: FnOnce(&L) -> LogResult<T> + Send + 'static,
    {
        let log = self.log.clone();
        match tokio::task::spawn_blocking(move || f(log.as_ref())).await {
            Ok(result) => result.map_err(Status::from),
            Err(e) => {
                warn!("Log task failed: {}", e);
                Err(Status::new(Code::Internal, e.to_string()))
            }
        }
    }
}

#[async_trait]
impl<L: CommitLog> LogApi for LogService<L> {
    async fn produce(&self, req: ProduceRequest) -> Result<ProduceResponse, Status> {
        let offset = self.blocking(move |log| log.append(req.record)).await?;
        Ok(ProduceResponse { offset })
    }

    async fn consume(&self, req: ConsumeRequest) -> Result<ConsumeResponse, Status> {
        let record = self.blocking(move |log| log.read(req.offset)).await?;
        Ok(ConsumeResponse { record })
    }

    async fn produce_stream(
        &self,
        mut requests: mpsc::Receiver<ProduceRequest>,
    ) -> mpsc::Receiver<Result<ProduceResponse, Status>> {
        let (tx, rx) = mpsc::channel(self.config.stream_buffer);
        let service = self.clone();

        tokio::spawn(async move {
            while let Some(req) = requests.recv().await {
                let result = service.produce(req).await;
                let failed = result.is_err();
                if tx.send(result).await.is_err() || failed {
                    break;
                }
            }
            debug!("Produce stream finished");
        });

        rx
    }

    async fn consume_stream(
        &self,
        req: ConsumeRequest,
    ) -> mpsc::Receiver<Result<ConsumeResponse, Status>> {
        let (tx, rx) = mpsc::channel(self.config.stream_buffer);
        let service = self.clone();
        let poll_interval = self.config.consume_poll_interval;

        tokio::spawn(async move {
            let mut offset = req.offset;
            loop {
                match service.consume(ConsumeRequest { offset }).await {
                    Ok(resp) => {
                        if tx.send(Ok(resp)).await.is_err() {
                            break;
                        }
                        offset += 1;
                    }
                    Err(status) if status.code == Code::OutOfRange => {
                        tokio::select! {
                            _ = tx.closed() => break,
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }
                    Err(status) => {
                        let _ = tx.send(Err(status)).await;
                        break;
                    }
                }
            }
            debug!("Consume stream stopped at offset {}", offset);
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_log_error() {
        let status = Status::from(LogError::OffsetOutOfRange { offset: 7 });
        assert_eq!(status.code, Code::OutOfRange);
        assert_eq!(status.offset, Some(7));

        let status = Status::from(LogError::CapacityExceeded { capacity: 12 });
        assert_eq!(status.code, Code::ResourceExhausted);
        assert_eq!(status.offset, None);

        assert_eq!(Status::from(LogError::Closed).code, Code::Unavailable);

        let io = std::io::Error::other("disk gone");
        assert_eq!(Status::from(LogError::Io(io)).code, Code::Internal);
    }
}
