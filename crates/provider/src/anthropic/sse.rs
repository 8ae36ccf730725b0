//! Server-sent events framing.

use bytes::Bytes;
use futures::{Stream, StreamExt};

/// One `event:`/`data:` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Split a response body into SSE records.
///
/// Bytes are buffered until a blank line so multi-byte characters split
/// across chunks decode correctly. Comment lines and records without data
/// are skipped.
pub fn parse_sse_stream<S>(stream: S) -> impl Stream<Item = reqwest::Result<SseEvent>> + Send
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    futures::stream::unfold(
        Some((stream.boxed(), Vec::<u8>::new())),
        |state| async move {
            let (mut stream, mut buffer) = state?;
            loop {
                if let Some((end, skip)) = find_record_end(&buffer) {
                    let record: Vec<u8> = buffer.drain(..end + skip).take(end).collect();
                    if let Some(event) = parse_record(&String::from_utf8_lossy(&record)) {
                        return Some((Ok(event), Some((stream, buffer))));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(err)) => return Some((Err(err), None)),
                    None => {
                        // A final record may lack its trailing blank line.
                        let rest = String::from_utf8_lossy(&buffer).into_owned();
                        return parse_record(&rest).map(|event| (Ok(event), None));
                    }
                }
            }
        },
    )
}

/// Position of the first blank line and the length of its separator.
fn find_record_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_record(record: &str) -> Option<SseEvent> {
    let mut event = String::new();
    let mut data: Vec<&str> = Vec::new();

    for line in record.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = value.to_string(),
            "data" => data.push(value),
            _ => {}
        }
    }

    if data.is_empty() {
        return None;
    }
    Some(SseEvent {
        event: if event.is_empty() { "message".to_string() } else { event },
        data: data.join("\n"),
    })
}
