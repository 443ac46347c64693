// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Newline-delimited JSON transport over TCP or a Unix socket.

use std::io;
use std::sync::Arc;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Instrument};

use super::connection::{Gateway, OUTBOUND_BUFFER};
use super::protocol::{encode, ServerMessage};
use super::transport::{self, Endpoint, RelayListener};
use crate::error::{ProtocolError, TransportError};

/// Serve one client over any byte stream until it closes.
///
/// Reads one JSON envelope per line. Lines over the gateway's frame limit and
/// lines that are not UTF-8 get a failing ack; the connection stays open. The
/// writer drains until every run started on this connection has sent its
/// final message.
pub async fn serve_connection<S>(
    gateway: Arc<Gateway>,
    stream: S,
    transport: &'static str,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
    let mut session = gateway.connect(tx, transport);
    let span = session.span().clone();

    let writer = tokio::spawn(write_frames(write_half, rx).instrument(span.clone()));

    let limit = gateway.config().max_frame_bytes;
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();
    let result = async {
        loop {
            let frame = read_frame(&mut reader, &mut buf, limit)
                .await
                .map_err(|e| TransportError::from_io_error("reading frame", e))?;
            match frame {
                Frame::Eof => {
                    debug!("Client closed the stream");
                    return Ok(());
                }
                Frame::TooLarge(size) => {
                    session.reject(ProtocolError::FrameTooLarge { size, limit }).await?
                }
                Frame::Line => match std::str::from_utf8(&buf) {
                    Ok(text) if text.trim().is_empty() => {}
                    Ok(text) => session.handle_frame(text).await?,
                    Err(_) => {
                        session
                            .reject(ProtocolError::Unsupported("line is not UTF-8".to_string()))
                            .await?
                    }
                },
            }
        }
    }
    .instrument(span.clone())
    .await;

    session.close();
    drop(session);

    match writer.await {
        Ok(Err(e)) if !e.is_disconnect() => warn!(parent: &span, error = %e, "Writer failed"),
        Err(e) => error!(parent: &span, error = %e, "Writer task panicked"),
        _ => {}
    }
    result
}

enum Frame {
    Eof,
    /// `buf` holds one line, newline stripped.
    Line,
    /// Line longer than the limit, skipped through its newline.
    TooLarge(usize),
}

/// Read one line into `buf`, buffering at most `limit + 1` bytes of it.
async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let cap = limit.saturating_add(1);
    let read = (&mut *reader).take(cap as u64).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(Frame::Eof);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        return Ok(Frame::Line);
    }
    if read < cap {
        // Final line without a newline.
        return Ok(Frame::Line);
    }
    let rest = skip_line(reader).await?;
    buf.clear();
    Ok(Frame::TooLarge(read + rest))
}

/// Discard input through the next newline, returning the bytes before it.
async fn skip_line<R>(reader: &mut R) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut skipped = 0;
    loop {
        let (consumed, found) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(skipped);
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(at) => (at + 1, Some(at)),
                None => (available.len(), None),
            }
        };
        reader.consume(consumed);
        match found {
            Some(at) => return Ok(skipped + at),
            None => skipped += consumed,
        }
    }
}

async fn write_frames<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<ServerMessage>,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = rx.recv().await {
        let line = match encode(&msg) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "Failed to encode outbound message");
                continue;
            }
        };
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| TransportError::from_io_error("writing frame", e))?;
        writer
            .flush()
            .await
            .map_err(|e| TransportError::from_io_error("flushing frame", e))?;
    }
    let _ = writer.shutdown().await;
    Ok(())
}

/// Accept loop for the newline-delimited transport.
pub struct NdjsonServer {
    endpoint: Endpoint,
    gateway: Arc<Gateway>,
    listener: Option<RelayListener>,
}

impl NdjsonServer {
    pub fn new(endpoint: Endpoint, gateway: Arc<Gateway>) -> Self {
        Self {
            endpoint,
            gateway,
            listener: None,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Bind the listener.
    pub async fn start(&mut self) -> Result<(), TransportError> {
        let listener = transport::bind(&self.endpoint)
            .await
            .map_err(|e| TransportError::BindFailed {
                endpoint: self.endpoint.to_string(),
                message: e.to_string(),
            })?;
        if let Ok(bound) = listener.local_endpoint() {
            self.endpoint = bound;
        }
        info!(endpoint = %self.endpoint, "NDJSON listener ready");
        self.listener = Some(listener);
        Ok(())
    }

    /// Accept connections until the task is dropped.
    pub async fn run(&self) -> Result<(), TransportError> {
        let listener = self.listener.as_ref().ok_or(TransportError::NotStarted)?;
        let transport = self.endpoint.transport_name();

        loop {
            let stream = match listener.accept().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %TransportError::from_io_error("accepting connection", e), "Accept failed");
                    continue;
                }
            };

            let gateway = Arc::clone(&self.gateway);
            tokio::spawn(async move {
                if let Err(e) = serve_connection(gateway, stream, transport).await {
                    if e.is_disconnect() {
                        debug!("Connection dropped");
                    } else {
                        warn!(error = %e, "Connection ended with error");
                    }
                }
            });
        }
    }

    /// Drop the listener and remove any socket file.
    pub fn stop(&mut self) -> Result<(), TransportError> {
        self.listener = None;
        transport::cleanup(&self.endpoint)
            .map_err(|e| TransportError::from_io_error("cleaning up socket", e))?;
        info!(endpoint = %self.endpoint, "NDJSON listener stopped");
        Ok(())
    }
}
