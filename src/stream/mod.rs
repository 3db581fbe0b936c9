//! Stream engine: line-buffered SSE parsing into a neutral event stream,
//! per-dialect writers, and the two fake re-framing modes.

pub mod collect;
pub mod events;
pub mod images;
pub mod line_buffer;
pub mod parser;
pub mod writers;

pub use collect::StreamCollector;
pub use events::{FinishReason, StreamEvent, ToolCallEvent, UsageEvent};
pub use images::ImageStore;
pub use line_buffer::LineBuffer;
pub use parser::SseParser;
pub use writers::{ClaudeWriter, DialectWriter, GeminiWriter, OpenaiWriter};

use crate::error::CastorError;
use axum::http::HeaderValue;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::{StreamExt, stream};
use std::convert::Infallible;
use std::time::Duration;

enum Feed {
    Chunk(Result<bytes::Bytes, reqwest::Error>),
    Eof,
}

/// Pump an upstream SSE body through the parser and a dialect writer into a
/// client SSE response.
///
/// The heartbeat keeps intermediaries from idle-closing while the upstream
/// thinks; it stops with the response body. Client disconnects drop the
/// stream, which aborts the upstream read.
pub fn sse_response<W>(
    upstream: reqwest::Response,
    parser: SseParser,
    writer: W,
    heartbeat: Duration,
) -> Response
where
    W: DialectWriter,
{
    let source = upstream
        .bytes_stream()
        .map(Feed::Chunk)
        .chain(stream::once(async { Feed::Eof }));

    let frames = source
        .scan((parser, writer, false), |(parser, writer, ended), feed| {
            let frames: Vec<Event> = if *ended {
                Vec::new()
            } else {
                match feed {
                    Feed::Chunk(Ok(bytes)) => parser
                        .feed(&bytes)
                        .iter()
                        .flat_map(|event| writer.on_event(event))
                        .collect(),
                    Feed::Chunk(Err(e)) => {
                        *ended = true;
                        tracing::warn!("Upstream stream transport error: {e}");
                        writer.on_error(&CastorError::Reqwest(e))
                    }
                    Feed::Eof => {
                        *ended = true;
                        let mut frames: Vec<Event> = parser
                            .finish()
                            .iter()
                            .flat_map(|event| writer.on_event(event))
                            .collect();
                        frames.extend(writer.finish());
                        frames
                    }
                }
            };
            futures::future::ready(Some(stream::iter(
                frames.into_iter().map(Ok::<_, Infallible>),
            )))
        })
        .flatten();

    let sse = Sse::new(frames).keep_alive(
        KeepAlive::new()
            .interval(heartbeat.max(Duration::from_secs(1)))
            .text("heartbeat"),
    );
    with_sse_headers(sse.into_response())
}

/// Serve pre-collected events as a client SSE response (fake-stream mode).
pub fn replay_sse_response<W>(events: Vec<StreamEvent>, mut writer: W, heartbeat: Duration) -> Response
where
    W: DialectWriter,
{
    let mut frames: Vec<Event> = events
        .iter()
        .flat_map(|event| writer.on_event(event))
        .collect();
    frames.extend(writer.finish());

    let sse = Sse::new(stream::iter(frames.into_iter().map(Ok::<_, Infallible>))).keep_alive(
        KeepAlive::new()
            .interval(heartbeat.max(Duration::from_secs(1)))
            .text("heartbeat"),
    );
    with_sse_headers(sse.into_response())
}

/// Drain an upstream SSE body into a collector (fake-non-stream mode).
pub async fn collect_stream(
    upstream: reqwest::Response,
    mut parser: SseParser,
) -> Result<StreamCollector, CastorError> {
    let mut collector = StreamCollector::new();
    let mut body = upstream.bytes_stream();

    while let Some(chunk) = body.next().await {
        let bytes = chunk?;
        for event in parser.feed(&bytes) {
            collector.absorb(event);
        }
    }
    for event in parser.finish() {
        collector.absorb(event);
    }
    Ok(collector)
}

fn with_sse_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert("cache-control", HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}
