//! Newline framing for chunked response bodies.

/// Reassembles protocol lines from arbitrary network reads.
///
/// Bytes after the last newline of a read are carried over to the next one, so
/// a line split across two reads comes out whole. Splitting works on raw bytes,
/// which also keeps multi-byte UTF-8 sequences intact across read boundaries.
#[derive(Debug, Default)]
pub struct LineBuffer {
    carry: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one read and return every line it completed, without line terminators.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(bytes);

        let Some(last_newline) = self.carry.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let rest = self.carry.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.carry, rest);

        complete[..complete.len() - 1]
            .split(|b| *b == b'\n')
            .map(decode_line)
            .collect()
    }

    /// Take the unterminated tail left once the body is exhausted.
    pub fn finish(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.carry);
        Some(decode_line(&rest))
    }

    /// Number of carried-over bytes waiting for a newline.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }
}

/// How a single event-stream line should be treated.
#[derive(Debug, PartialEq, Eq)]
pub enum DataLine<'a> {
    /// Blank lines, comments and non-data fields.
    Skip,
    /// The `data: [DONE]` sentinel.
    Done,
    /// The payload after the `data: ` prefix.
    Payload(&'a str),
}

pub fn classify(line: &str) -> DataLine<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return DataLine::Skip;
    }
    if trimmed == "data: [DONE]" {
        return DataLine::Done;
    }
    match line.strip_prefix("data: ") {
        Some(payload) => DataLine::Payload(payload),
        None => DataLine::Skip,
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_lines_in_one_read() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"data: a\n\ndata: b\n");
        assert_eq!(lines, vec!["data: a", "", "data: b"]);
        assert_eq!(buf.pending(), 0);
    }

    #[test]
    fn line_split_across_reads_is_reconstructed() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"data: {\"choices\":[{\"del").is_empty());
        assert!(buf.pending() > 0);

        let lines = buf.push(b"ta\":{}}]}\ndata: [DO");
        assert_eq!(lines, vec!["data: {\"choices\":[{\"delta\":{}}]}"]);

        let lines = buf.push(b"NE]\n");
        assert_eq!(lines, vec!["data: [DONE]"]);
    }

    #[test]
    fn multibyte_character_split_across_reads() {
        let text = "data: 思考\n".as_bytes();
        // Cut inside the first CJK character.
        let (head, tail) = text.split_at(7);

        let mut buf = LineBuffer::new();
        assert!(buf.push(head).is_empty());
        assert_eq!(buf.push(tail), vec!["data: 思考"]);
    }

    #[test]
    fn crlf_terminators_are_stripped() {
        let mut buf = LineBuffer::new();
        assert_eq!(buf.push(b"data: x\r\n\r\n"), vec!["data: x", ""]);
    }

    #[test]
    fn classify_data_lines() {
        assert_eq!(classify(""), DataLine::Skip);
        assert_eq!(classify("   "), DataLine::Skip);
        assert_eq!(classify(": keep-alive"), DataLine::Skip);
        assert_eq!(classify("event: message_start"), DataLine::Skip);
        assert_eq!(classify("data: [DONE]"), DataLine::Done);
        assert_eq!(classify("data: [DONE]  "), DataLine::Done);
        assert_eq!(classify("data: {\"a\":1}"), DataLine::Payload("{\"a\":1}"));
    }

    #[test]
    fn finish_returns_unterminated_tail() {
        let mut buf = LineBuffer::new();
        buf.push(b"data: first\ndata: tail");
        assert_eq!(buf.finish().as_deref(), Some("data: tail"));
        assert_eq!(buf.finish(), None);
    }
}
