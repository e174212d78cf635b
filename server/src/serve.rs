//! Line-oriented JSON-RPC serve loop.
//!
//! One UTF-8 request line in, one response line out. Oversized lines get a
//! parse-error response instead of crashing the stream; EOF or a shutdown
//! signal ends the loop.

use std::sync::Arc;

use agentrun_protocol::{Handler, Response, RpcError};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::watch;

/// Maximum accepted request line, in bytes.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Serve newline-delimited JSON-RPC over an arbitrary byte stream until EOF
/// or shutdown.
pub async fn serve_lines<R, W>(
    handler: Arc<Handler>,
    reader: R,
    mut writer: W,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let read = tokio::select! {
            read = reader.read_line(&mut line) => read?,
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("serve loop shutting down");
                    break;
                }
                continue;
            }
        };
        if read == 0 {
            break; // EOF
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = if trimmed.len() > MAX_LINE_BYTES {
            Response::error(
                Value::Null,
                RpcError::parse_error(format!(
                    "request line exceeds maximum size of {MAX_LINE_BYTES} bytes"
                )),
            )
        } else {
            handler.handle_raw(trimmed.as_bytes()).await
        };

        let mut bytes = serde_json::to_vec(&response).unwrap_or_else(|_| b"{}".to_vec());
        bytes.push(b'\n');
        writer.write_all(&bytes).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Serve over stdin/stdout until EOF (agent mode).
pub async fn serve_stdio(handler: Arc<Handler>) -> std::io::Result<()> {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    serve_lines(handler, tokio::io::stdin(), tokio::io::stdout(), shutdown_rx).await
}
