//! Incremental event-stream framing.
//!
//! Turns an arbitrary sequence of byte chunks (as they come off the network)
//! into complete, blank-line-delimited frames. Chunk boundaries are
//! meaningless: they may split a frame, a line, or a multi-byte UTF-8
//! character, and the frames produced are the same regardless.

use memchr::memmem;

const DELIMITER: &[u8] = b"\n\n";

/// Reassembles frames from a chunked byte stream.
///
/// One parser belongs to exactly one connection; create a new one for every
/// stream and drop it when the connection ends. The internal buffer only ever
/// holds the tail of the stream that has not yet been resolved into a complete
/// frame, so a complete frame is never left behind after [`feed`](Self::feed)
/// returns.
///
/// Carriage returns are dropped while decoding, so `\r\n` and `\n` line
/// endings frame identically.
///
/// ```
/// use tfscan_protocol::FrameParser;
///
/// let mut parser = FrameParser::new();
/// assert!(parser.feed(b"data: {\"job_id\":").is_empty());
/// assert_eq!(parser.feed(b"\"a\"}\n\ndata: x"), vec!["data: {\"job_id\":\"a\"}".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct FrameParser {
    /// Trailing bytes of an incomplete UTF-8 sequence from the previous chunk.
    pending: Vec<u8>,
    /// Decoded text not yet terminated by a delimiter.
    buffer: String,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept the next chunk and return every frame it completed, in arrival
    /// order. Frames consisting only of whitespace are dropped silently.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode(chunk);
        self.drain_frames()
    }

    /// Consume the parser at end of stream, returning whatever unterminated
    /// text was left over (if it is not just whitespace). Any dangling partial
    /// UTF-8 sequence is replaced with U+FFFD.
    pub fn finish(mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.push_text(&tail);
        }
        let rest = self.buffer.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }

    /// Number of decoded bytes currently waiting for a delimiter.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn decode(&mut self, chunk: &[u8]) {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);
        let mut input = bytes.as_slice();
        while !input.is_empty() {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.push_text(text);
                    input = &[];
                },
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    self.push_text(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        // Genuinely invalid sequence: substitute and carry on.
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        },
                        // Incomplete sequence at the end of the chunk; the
                        // remaining bytes are expected in the next chunk.
                        None => {
                            self.pending = rest.to_vec();
                            break;
                        },
                    }
                },
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        self.buffer.extend(text.chars().filter(|c| *c != '\r'));
    }

    fn drain_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some(pos) = memmem::find(&self.buffer.as_bytes()[consumed..], DELIMITER) {
            let frame = &self.buffer[consumed..consumed + pos];
            if !frame.trim().is_empty() {
                frames.push(frame.to_string());
            }
            consumed += pos + DELIMITER.len();
        }
        self.buffer.drain(..consumed);
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const STREAM: &str = concat!(
        ": keep-alive comment\n",
        "data: {\"job_id\":\"j\",\"percent\":10,\"message\":\"Zählung läuft\"}\n\n",
        "data: {\"job_id\":\"j\",\"percent\":20,\"message\":\"スキャン中\"}\r\n\r\n",
        "\n\n",
        "data: {\"job_id\":\"j\",\"event_type\":\"completed\",\"message\":\"🎉\"}\n\n",
        "data: {\"job_id\":\"j\",\"percent\":99"
    );

    fn parse_whole(input: &[u8]) -> Vec<String> {
        FrameParser::new().feed(input)
    }

    fn parse_chunked(input: &[u8], size: usize) -> Vec<String> {
        let mut parser = FrameParser::new();
        input.chunks(size).flat_map(|chunk| parser.feed(chunk)).collect()
    }

    #[test]
    fn test_whole_stream() {
        let frames = parse_whole(STREAM.as_bytes());
        assert_eq!(frames.len(), 3);
        assert!(frames[0].starts_with(": keep-alive comment\ndata: "));
        assert!(frames[1].contains("スキャン中"));
        assert!(!frames[1].contains('\r'));
        assert!(frames[2].contains("🎉"));
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[case(5)]
    #[case(7)]
    #[case(64)]
    fn test_chunk_size_does_not_matter(#[case] size: usize) {
        assert_eq!(parse_chunked(STREAM.as_bytes(), size), parse_whole(STREAM.as_bytes()));
    }

    #[test]
    fn test_every_two_way_split() {
        let bytes = STREAM.as_bytes();
        let expected = parse_whole(bytes);
        for split in 0..=bytes.len() {
            let mut parser = FrameParser::new();
            let (head, tail) = bytes.split_at(split);
            let mut frames = parser.feed(head);
            frames.extend(parser.feed(tail));
            assert_eq!(frames, expected, "split at byte {split}");
        }
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let bytes = "data: é\n\n".as_bytes();
        // 'é' is two bytes; split between them.
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut parser = FrameParser::new();
        assert!(parser.feed(&bytes[..split]).is_empty());
        assert_eq!(parser.feed(&bytes[split..]), vec!["data: é".to_string()]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut parser = FrameParser::new();
        assert_eq!(parser.feed(b"data: a\xFFb\n\n"), vec!["data: a\u{FFFD}b".to_string()]);
    }

    #[test]
    fn test_partial_tail_is_retained() {
        let mut parser = FrameParser::new();
        assert_eq!(parser.feed(b"data: one\n\ndata: tw"), vec!["data: one".to_string()]);
        assert_eq!(parser.buffered(), "data: tw".len());
        assert_eq!(parser.feed(b"o\n"), Vec::<String>::new());
        assert_eq!(parser.feed(b"\n"), vec!["data: two".to_string()]);
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn test_whitespace_frames_are_discarded() {
        assert!(parse_whole(b"   \n\n\t\n\n\n\n").is_empty());
    }

    #[test]
    fn test_finish() {
        let mut parser = FrameParser::new();
        parser.feed(b"data: done\n\ndata: left");
        assert_eq!(parser.finish(), Some("data: left".to_string()));

        let mut parser = FrameParser::new();
        parser.feed(b"data: done\n\n  \n");
        assert_eq!(parser.finish(), None);
    }
}
