//! Request/reply loop over a byte stream
//!
//! The runner talks to its caller with a simple length-prefixed JSON
//! protocol: every frame is a 4-byte big-endian length followed by that many
//! bytes of JSON. Requests are JSON objects handed to the worker as
//! [`RequestData`]; each request gets exactly one reply frame:
//!
//! ```text
//! {"ok": {"result": "Hello World!"}}
//! {"error": {"kind": "missing_key", "message": "Handler error: Missing key: name"}}
//! ```

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use kre_runner_sdk::{HandlerOutput, RequestData};

use crate::runtime::worker::Worker;

/// Largest frame accepted, in bytes
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Errors on the IPC stream itself
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge(usize),

    #[error("Stream ended inside a frame: got {received} of {expected} bytes")]
    Truncated { expected: usize, received: usize },
}

/// Error payload of a reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyError {
    pub kind: String,
    pub message: String,
}

/// One reply frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reply {
    Ok(HandlerOutput),
    Error(ReplyError),
}

impl Reply {
    fn error(kind: &str, message: impl Into<String>) -> Self {
        Reply::Error(ReplyError {
            kind: kind.to_string(),
            message: message.into(),
        })
    }
}

/// Fill `buf` until it is full or the stream ends; returns the bytes read
async fn fill<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, IpcError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Read one frame. Returns `None` when the stream ends between frames and
/// [`IpcError::Truncated`] when it ends inside one.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, IpcError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match fill(reader, &mut header).await? {
        0 => return Ok(None),
        4 => {}
        received => return Err(IpcError::Truncated { expected: 4, received }),
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(IpcError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    let received = fill(reader, &mut payload).await?;
    if received < len {
        return Err(IpcError::Truncated { expected: len, received });
    }
    Ok(Some(payload))
}

/// Write one frame and flush
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(IpcError::FrameTooLarge(payload.len()));
    }

    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Serialize a value as JSON and write it as one frame
pub async fn write_json<W, T>(writer: &mut W, value: &T) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(value)?;
    write_frame(writer, &payload).await
}

async fn process(worker: &Worker, payload: &[u8]) -> Reply {
    let data = match serde_json::from_slice::<serde_json::Value>(payload)
        .map_err(|e| e.to_string())
        .and_then(|v| RequestData::try_from(v).map_err(|e| e.to_string()))
    {
        Ok(data) => data,
        Err(message) => return Reply::error("invalid_request", message),
    };

    match worker.handle(data).await {
        Ok(output) => Reply::Ok(output),
        Err(e) => Reply::error(e.kind(), e.to_string()),
    }
}

/// Serve requests from `reader` until end of stream, writing replies to
/// `writer`. Returns the number of requests processed.
pub async fn serve<R, W>(worker: &Worker, reader: &mut R, writer: &mut W) -> Result<u64, IpcError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut count = 0u64;

    while let Some(payload) = read_frame(reader).await? {
        let reply = process(worker, &payload).await;
        write_json(writer, &reply).await?;
        count += 1;
    }

    tracing::info!(requests = count, "Request stream closed");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::{ContextBuilder, WorkerIdentity};
    use crate::runtime::loader::{LoadedModule, ModuleSource};
    use crate::runtime::metrics::{MemoryMetricStore, MetricSink};
    use kre_runner_sdk::{Context, HandlerError, WorkerModule};
    use serde_json::json;
    use std::sync::Arc;

    struct Upper;

    impl WorkerModule for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn handle(&self, _ctx: &dyn Context, data: RequestData) -> Result<HandlerOutput, HandlerError> {
            Ok(HandlerOutput::result(data.require_str("name")?.to_uppercase()))
        }
    }

    async fn ready_worker() -> Worker {
        let sink = MetricSink::start(
            Arc::new(MemoryMetricStore::new()),
            WorkerIdentity::default(),
            &tokio::runtime::Handle::current(),
        );
        let worker = Worker::new(
            LoadedModule::from_module(Box::new(Upper), ModuleSource::Registered("upper".into())),
            ContextBuilder::new(sink).build(),
        );
        worker.init().await.unwrap();
        worker
    }

    async fn frames(payloads: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        for payload in payloads {
            write_frame(&mut buf, payload.as_bytes()).await.unwrap();
        }
        buf
    }

    async fn read_replies(mut bytes: &[u8]) -> Vec<Reply> {
        let mut replies = Vec::new();
        while let Some(frame) = read_frame(&mut bytes).await.unwrap() {
            replies.push(serde_json::from_slice(&frame).unwrap());
        }
        replies
    }

    #[tokio::test]
    async fn test_frame_round_trip() {
        let buf = frames(&[r#"{"a":1}"#, ""]).await;
        assert_eq!(&buf[..4], &7u32.to_be_bytes());

        let mut reader = buf.as_slice();
        assert_eq!(read_frame(&mut reader).await.unwrap().unwrap(), br#"{"a":1}"#.to_vec());
        assert_eq!(read_frame(&mut reader).await.unwrap().unwrap(), Vec::<u8>::new());
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let header = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
        let mut reader = &header[..];
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(IpcError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_frames_are_errors() {
        let mut reader = &[0u8, 0][..];
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(IpcError::Truncated { expected: 4, received: 2 })
        ));

        let mut buf = frames(&[r#"{"name":"ada"}"#]).await;
        buf.truncate(4 + 3);
        let mut reader = buf.as_slice();
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(IpcError::Truncated { expected: 14, received: 3 })
        ));
    }

    #[tokio::test]
    async fn test_serve_fails_on_truncated_request() {
        let worker = ready_worker().await;
        let mut input = frames(&[r#"{"name":"ada"}"#]).await;
        input.push(0);

        let mut reader = input.as_slice();
        let mut output = Vec::new();
        let err = serve(&worker, &mut reader, &mut output).await.unwrap_err();
        assert!(matches!(err, IpcError::Truncated { expected: 4, received: 1 }));

        // The complete request before the cut was still answered
        let replies = read_replies(&output).await;
        assert_eq!(replies, vec![Reply::Ok(HandlerOutput::result("ADA"))]);
    }

    #[tokio::test]
    async fn test_serve_replies_once_per_request() {
        let worker = ready_worker().await;
        let input = frames(&[r#"{"name":"ada"}"#, r#"{"age":3}"#, "not json", "[1,2]"]).await;

        let mut reader = input.as_slice();
        let mut output = Vec::new();
        let served = serve(&worker, &mut reader, &mut output).await.unwrap();
        assert_eq!(served, 4);

        let replies = read_replies(&output).await;
        assert_eq!(replies.len(), 4);
        assert_eq!(replies[0], Reply::Ok(HandlerOutput::result("ADA")));
        assert!(matches!(&replies[1], Reply::Error(e) if e.kind == "missing_key"));
        assert!(matches!(&replies[2], Reply::Error(e) if e.kind == "invalid_request"));
        assert!(matches!(&replies[3], Reply::Error(e) if e.kind == "invalid_request"));

        let text = serde_json::to_value(&replies[0]).unwrap();
        assert_eq!(text, json!({"ok": {"result": "ADA"}}));
    }
}
