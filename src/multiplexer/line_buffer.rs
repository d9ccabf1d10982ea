//! Reassembly of newline-delimited lines from arbitrary read chunks

use std::mem;

/// One complete unit produced by [`LineAssembler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssembledLine {
    /// Line content without its terminator (`\n` or `\r\n`)
    Line(String),
    /// A line that exceeded the size limit; only its length is kept
    Oversized(usize),
}

/// Buffers bytes until a line break arrives.
///
/// Lines are decoded only once complete, so a multi-byte character split
/// across two reads survives intact.
#[derive(Debug)]
pub struct LineAssembler {
    buffer: Vec<u8>,
    max_line_bytes: usize,
    /// Bytes dropped from the current oversized line, 0 when not discarding
    discarded: usize,
}

impl LineAssembler {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line_bytes,
            discarded: 0,
        }
    }

    /// Feed one chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<AssembledLine> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.append(&rest[..pos]);
            lines.push(self.take_line());
            rest = &rest[pos + 1..];
        }
        self.append(rest);
        lines
    }

    /// Flush the trailing fragment at end of stream.
    pub fn finish(&mut self) -> Option<AssembledLine> {
        if self.buffer.is_empty() && self.discarded == 0 {
            return None;
        }
        Some(self.take_line())
    }

    /// Bytes held for the incomplete trailing line
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn append(&mut self, bytes: &[u8]) {
        if self.discarded > 0 {
            self.discarded += bytes.len();
            return;
        }
        if self.buffer.len() + bytes.len() > self.max_line_bytes {
            self.discarded = self.buffer.len() + bytes.len();
            self.buffer = Vec::new();
            return;
        }
        self.buffer.extend_from_slice(bytes);
    }

    fn take_line(&mut self) -> AssembledLine {
        if self.discarded > 0 {
            return AssembledLine::Oversized(mem::take(&mut self.discarded));
        }
        let mut bytes = mem::take(&mut self.buffer);
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        AssembledLine::Line(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(s: &str) -> AssembledLine {
        AssembledLine::Line(s.to_string())
    }

    #[test]
    fn keeps_partial_fragment_between_chunks() {
        let mut assembler = LineAssembler::new(1024);
        assert!(assembler.push(br#"{"jsonrpc":"2.0","#).is_empty());
        assert_eq!(assembler.pending_bytes(), 17);
        assert_eq!(
            assembler.push(b"\"id\":\"a\"}\nnext"),
            vec![line(r#"{"jsonrpc":"2.0","id":"a"}"#)]
        );
        assert_eq!(assembler.push(b" line\r\n\n"), vec![line("next line"), line("")]);
        assert_eq!(assembler.finish(), None);
    }

    #[test]
    fn multibyte_characters_split_across_reads() {
        let mut assembler = LineAssembler::new(1024);
        let text = "héllo\n".as_bytes();
        assert!(assembler.push(&text[..2]).is_empty());
        assert_eq!(assembler.push(&text[2..]), vec![line("héllo")]);
    }

    #[test]
    fn trailing_fragment_is_flushed_at_end() {
        let mut assembler = LineAssembler::new(1024);
        assembler.push(b"last words");
        assert_eq!(assembler.finish(), Some(line("last words")));
        assert_eq!(assembler.finish(), None);
    }

    #[test]
    fn oversized_lines_are_dropped_whole() {
        let mut assembler = LineAssembler::new(8);
        assert!(assembler.push(b"0123456").is_empty());
        assert!(assembler.push(b"789abc").is_empty());
        assert_eq!(assembler.pending_bytes(), 0);
        assert_eq!(
            assembler.push(b"def\nok\n"),
            vec![AssembledLine::Oversized(16), line("ok")]
        );
    }
}
