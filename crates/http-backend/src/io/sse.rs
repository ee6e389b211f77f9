use bytes::BytesMut;

use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading server-sent events from a chunk stream.
///
/// Events are buffered until a blank line arrives, so the chunk
/// boundaries don't need to match the event boundaries.
///
/// Some backends write one event per chunk and leave out the blank line.
/// A payload never spans more than one line, so a chunk that starts with
/// a `data` field also ends the event buffered before it, and whatever is
/// left when the stream ends is read as the last event.
pub struct Sse {
    buf: BytesMut,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: BytesMut::new(),
            chunks,
        }
    }

    /// Returns the data of the next event, or `None` when the stream has
    /// ended.
    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Drain complete events from the buffer first, a single chunk
            // may carry more than one of them.
            while let Some(block) = self.take_event_block() {
                if let Some(data) = parse_event(&block)? {
                    return Ok(Some(data));
                }
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                return self.take_trailing_event();
            };
            self.end_event_before(&bytes);
            self.buf.extend_from_slice(&bytes);
        }
    }

    /// Terminates the buffered event if `next` starts a new one.
    fn end_event_before(&mut self, next: &[u8]) {
        if self.is_buf_blank() || !next.starts_with(b"data:") {
            return;
        }
        trace!("chunk boundary ends an event without a blank line");
        if !self.buf.ends_with(b"\n") {
            self.buf.extend_from_slice(b"\n");
        }
        self.buf.extend_from_slice(b"\n");
    }

    /// Reads the bytes left at the end of the stream as the last event.
    fn take_trailing_event(&mut self) -> Result<Option<String>, Error> {
        if self.is_buf_blank() {
            self.buf.clear();
            return Ok(None);
        }
        let block = self.buf.split();
        debug!("reading {} trailing bytes as an event", block.len());
        parse_event(&block)
    }

    #[inline]
    fn is_buf_blank(&self) -> bool {
        self.buf.iter().all(u8::is_ascii_whitespace)
    }

    /// Splits off the bytes of the first complete event, without the
    /// trailing blank line.
    fn take_event_block(&mut self) -> Option<BytesMut> {
        let (end, delimiter_end) = find_blank_line(&self.buf)?;
        let mut block = self.buf.split_to(delimiter_end);
        block.truncate(end);
        Some(block)
    }
}

// For `end-of-line`, we handle line feed and carriage return + line feed.
//
// event         = *( comment / field ) end-of-line
// comment       = colon *any-char end-of-line
// field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
// end-of-line   = ( cr lf / lf )
fn find_blank_line(buf: &[u8]) -> Option<(usize, usize)> {
    let mut start = 0;
    while let Some(pos) = buf[start..].iter().position(|b| *b == b'\n') {
        let lf = start + pos;
        let rest = &buf[lf + 1..];
        if rest.starts_with(b"\n") {
            return Some((lf, lf + 2));
        }
        if rest.starts_with(b"\r\n") {
            return Some((lf, lf + 3));
        }
        start = lf + 1;
    }
    None
}

/// Parses an event block, returning `None` if it carries no data.
fn parse_event(block: &[u8]) -> Result<Option<String>, Error> {
    let Ok(block) = str::from_utf8(block) else {
        return Err(Error::InvalidPayload);
    };

    let mut data: Option<String> = None;
    for line in block.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let (name, value) = match line.split_once(':') {
            Some((name, value)) => {
                (name, value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        match name {
            "data" => {
                let data = data.get_or_insert_default();
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(value);
            }
            "event" | "id" | "retry" => {
                trace!("ignoring sse field: {name}");
            }
            _ => return Err(Error::InvalidPayload),
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[tokio::test]
    async fn test_normal_events() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"data: hello\n\n"),
                Bytes::from_static(b"data: bye\n\n"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "bye");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_quirk_streaming() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"data:"),
                Bytes::from_static(b" hello\n"),
                Bytes::from_static(b"\n"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_packed_events() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"data: one\n\ndata: two\r\n\r\ndata: thr"),
                Bytes::from_static(b"ee\n\n"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "one");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "two");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "three");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_split_utf8() {
        let text = "data: héllo\n\n".as_bytes();
        // Split right inside the two-byte `é`.
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::copy_from_slice(&text[..8]),
                Bytes::copy_from_slice(&text[8..]),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "héllo");
    }

    #[tokio::test]
    async fn test_named_events_and_comments() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b": keep-alive\n\n"),
                Bytes::from_static(b"event:message\ndata:{\"a\":1}\n\n"),
                Bytes::from_static(b"event: ping\n\n"),
                Bytes::from_static(b"data: a\ndata: b\n\n"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "{\"a\":1}");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "a\nb");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_data() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"xxxxxx\n\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);

        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"data: \xff\xfe\n\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);

        // Trailing garbage without a blank line is still garbage.
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"xxxxxx\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);
    }

    #[tokio::test]
    async fn test_event_per_chunk() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"data: hello"),
                Bytes::from_static(b"data: there\n"),
                Bytes::from_static(b"data: bye"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "there");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "bye");
        assert_eq!(sse.next_event().await.unwrap(), None);
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unterminated_last_event() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"data: hello\n\n"),
                Bytes::from_static(b"data: bye\r\n"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "bye");
        assert_eq!(sse.next_event().await.unwrap(), None);

        // Only whitespace is left, there is no event to read.
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"data: hello\n\n\r\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_transport_error() {
        let chunks = Chunks::from_results(
            vec![
                Ok(Bytes::from_static(b"data: hello\n\n")),
                Err(ChunksError("connection reset".to_owned())),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert!(matches!(
            sse.next_event().await.unwrap_err(),
            Error::ChunksError(_)
        ));
    }
}
