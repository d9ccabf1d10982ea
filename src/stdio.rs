//! Line-delimited stdio transport
//!
//! One JSON object per line in each direction. Every request runs on its own
//! task, so responses may be written in a different order than requests
//! arrived; clients correlate by id.

use {
    crate::{error::McpError, server::ProtocolServer},
    anyhow::{Context, Result},
    serde_json::Value,
    std::sync::Arc,
    tokio::{
        io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
        sync::mpsc,
    },
    tracing::{debug, info, warn},
};

/// Longest request line accepted before it is answered with a parse error
pub const MAX_REQUEST_LINE_BYTES: usize = 4 * 1024 * 1024; // 4MB

/// Serve the protocol on this process's stdin/stdout until stdin closes.
pub async fn serve_stdio(server: Arc<ProtocolServer>) -> Result<()> {
    serve_lines(server, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve the protocol over any line-oriented reader/writer pair.
///
/// Returns once the reader hits EOF and every in-flight request has been
/// answered.
pub async fn serve_lines<R, W>(server: Arc<ProtocolServer>, reader: R, writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    serve_lines_with_limit(server, reader, writer, MAX_REQUEST_LINE_BYTES).await
}

/// [`serve_lines`] with an explicit cap on request line length.
///
/// Lines are handed to the server as raw bytes, so input that is not UTF-8
/// or not JSON is answered with `-32700` and the loop keeps serving.
pub async fn serve_lines_with_limit<R, W>(
    server: Arc<ProtocolServer>,
    reader: R,
    writer: W,
    max_line_bytes: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<Value>();
    let writer_task = tokio::spawn(write_frames(rx, writer));

    info!(
        server_name = server.registry().server_name(),
        tools = server.registry().tools().len(),
        "Serving protocol on stdio"
    );

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = (&mut reader)
            .take(max_line_bytes as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await
            .context("Failed to read request line")?;
        if read == 0 {
            break;
        }
        if buf.last() != Some(&b'\n') && buf.len() > max_line_bytes {
            let dropped = buf.len()
                + discard_rest_of_line(&mut reader)
                    .await
                    .context("Failed to read request line")?;
            warn!(bytes = dropped, limit = max_line_bytes, "Dropping oversized request line");
            let error = McpError::Parse(format!("Request line exceeds {max_line_bytes} bytes"));
            let _ = tx.send(error.to_json_rpc_error(None));
            continue;
        }

        let line = buf.trim_ascii().to_vec();
        if line.is_empty() {
            continue;
        }
        let server = server.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(response) = server.handle_bytes(&line).await {
                // Receiver only goes away when the writer failed
                let _ = tx.send(response);
            }
        });
    }
    debug!("Input closed, draining in-flight requests");

    // The writer finishes once every request task has dropped its sender
    drop(tx);
    writer_task
        .await
        .context("Writer task panicked")?
        .context("Failed to write response")?;
    Ok(())
}

/// Skip to just past the next line break (or EOF); returns the bytes skipped.
async fn discard_rest_of_line<R>(reader: &mut R) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut skipped = 0;
    loop {
        let (consumed, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(skipped);
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            }
        };
        reader.consume(consumed);
        skipped += consumed;
        if done {
            return Ok(skipped);
        }
    }
}

async fn write_frames<W>(mut rx: mpsc::UnboundedReceiver<Value>, mut writer: W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        let mut line = serde_json::to_vec(&frame)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}
