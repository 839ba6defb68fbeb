//! Server-sent progress stream of a garment generation request.
//!
//! The body is split into lines at the byte level, so neither a record nor a
//! multi-byte character is lost when it straddles a chunk boundary. Each
//! `data:` line carries one JSON progress record.

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::backend::{ByteStream, FittingBackend};
use crate::error::FittingResult;
use crate::models::{ProgressEvent, SelectedFile};

/// Typed progress events; ends after the first terminal event.
pub type ProgressEventStream = BoxStream<'static, FittingResult<ProgressEvent>>;

/// Incremental decoder for `data: <json>` records.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return the records it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ProgressEvent> {
        let scan_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut line_start = 0;
        for i in scan_from..self.buffer.len() {
            if self.buffer[i] == b'\n' {
                if let Some(event) = parse_line(&self.buffer[line_start..i]) {
                    events.push(event);
                }
                line_start = i + 1;
            }
        }
        self.buffer.drain(..line_start);
        events
    }

    /// Parse whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<ProgressEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }

    /// Bytes of the current partial line
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn parse_line(line: &[u8]) -> Option<ProgressEvent> {
    let line = String::from_utf8_lossy(line);
    let line = line.strip_suffix('\r').unwrap_or(&line);

    // Blank separators, comments and other SSE fields carry no progress.
    let payload = line.strip_prefix("data:")?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload);

    match ProgressEvent::from_json(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, record = %payload, "Skipping malformed progress record");
            None
        }
    }
}

/// Decode a raw body into progress events.
///
/// The stream ends at end of body, after a `complete`/`error` event, after
/// the first read error (yielded as `Err`), or as soon as `cancel` fires.
pub fn progress_events(mut bytes: ByteStream, cancel: CancellationToken) -> ProgressEventStream {
    Box::pin(async_stream::stream! {
        let mut decoder = SseDecoder::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(discarded = decoder.pending(), "Progress stream cancelled");
                    return;
                }
                next = bytes.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    for event in decoder.push(&chunk) {
                        if cancel.is_cancelled() {
                            return;
                        }
                        let terminal = event.stage.is_terminal();
                        yield Ok(event);
                        if terminal {
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Progress stream read failed");
                    yield Err(e);
                    return;
                }
                None => {
                    if let Some(event) = decoder.finish() {
                        if !cancel.is_cancelled() {
                            yield Ok(event);
                        }
                    }
                    debug!("Progress stream ended");
                    return;
                }
            }
        }
    })
}

/// Upload `file` and return its progress events.
///
/// Fails fast when the server does not accept the request.
pub async fn open(
    backend: &dyn FittingBackend,
    file: SelectedFile,
    cancel: CancellationToken,
) -> FittingResult<ProgressEventStream> {
    let bytes = backend.open_cloth_stream(file).await?;
    Ok(progress_events(bytes, cancel))
}
