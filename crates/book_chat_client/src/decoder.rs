//! Incremental bytes → lines decoding for streamed answers.
//!
//! Transport chunks can end anywhere: inside a line, or inside a multi-byte
//! UTF-8 character. The decoder holds back both until the bytes that complete
//! them arrive, and never reorders output.

const REPLACEMENT: char = '\u{FFFD}';

#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes of a UTF-8 sequence cut off at the end of the last chunk.
    pending: Vec<u8>,
    /// Decoded text of the current, not yet terminated line.
    line: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk; returns every line it completed, without
    /// the `\n` / `\r\n` terminator.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let text = self.decode_pending();

        let mut lines = Vec::new();
        for piece in text.split_inclusive('\n') {
            match piece.strip_suffix('\n') {
                Some(body) => {
                    self.line.push_str(body);
                    lines.push(take_line(&mut self.line));
                }
                None => self.line.push_str(piece),
            }
        }
        lines
    }

    /// End of stream: returns the final line if it had no terminator.
    /// A truncated trailing character decodes to U+FFFD.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            self.line.push_str(&tail);
        }
        if self.line.is_empty() {
            None
        } else {
            Some(take_line(&mut self.line))
        }
    }

    /// Decode as much of `pending` as forms complete characters. Invalid
    /// sequences become U+FFFD; an incomplete tail stays in `pending`.
    fn decode_pending(&mut self) -> String {
        let mut out = String::new();
        let mut start = 0;
        while start < self.pending.len() {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    start = self.pending.len();
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[start..valid_end]));
                    match e.error_len() {
                        Some(invalid) => {
                            out.push(REPLACEMENT);
                            start = valid_end + invalid;
                        }
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..start);
        out
    }
}

fn take_line(line: &mut String) -> String {
    let mut taken = std::mem::take(line);
    if taken.ends_with('\r') {
        taken.pop();
    }
    taken
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_lines_in_one_chunk() {
        let mut d = FrameDecoder::new();
        let lines = d.push(b"data: {\"content\":\"a\"}\n\ndata: {\"done\":true}\n");
        assert_eq!(
            lines,
            vec!["data: {\"content\":\"a\"}", "", "data: {\"done\":true}"]
        );
        assert_eq!(d.finish(), None);
    }

    #[test]
    fn line_split_across_chunks() {
        let mut d = FrameDecoder::new();
        assert!(d.push(b"data: {\"cont").is_empty());
        assert!(d.push(b"ent\":\"ROS\"").is_empty());
        assert_eq!(d.push(b"}\ndata"), vec!["data: {\"content\":\"ROS\"}"]);
        assert_eq!(d.finish().as_deref(), Some("data"));
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        // "é" is 0xC3 0xA9, "🤖" is four bytes.
        let text = "data: {\"content\":\"café 🤖\"}\n";
        let bytes = text.as_bytes();
        let cut_e = text.find('é').unwrap() + 1;
        let cut_robot = text.find('🤖').unwrap() + 2;

        let mut d = FrameDecoder::new();
        let mut lines = d.push(&bytes[..cut_e]);
        lines.extend(d.push(&bytes[cut_e..cut_robot]));
        lines.extend(d.push(&bytes[cut_robot..]));
        assert_eq!(lines, vec!["data: {\"content\":\"café 🤖\"}"]);
    }

    #[test]
    fn one_byte_at_a_time() {
        let text = "data: {\"content\":\"ノード\"}\r\ndata: {\"content\":\"ß\"}\r\n";
        let mut d = FrameDecoder::new();
        let lines: Vec<String> = text
            .as_bytes()
            .iter()
            .flat_map(|b| d.push(std::slice::from_ref(b)))
            .collect();
        assert_eq!(
            lines,
            vec!["data: {\"content\":\"ノード\"}", "data: {\"content\":\"ß\"}"]
        );
    }

    #[test]
    fn invalid_bytes_become_replacement_characters() {
        let mut d = FrameDecoder::new();
        let lines = d.push(b"a\xFFb\n");
        assert_eq!(lines, vec!["a\u{FFFD}b"]);
    }

    #[test]
    fn truncated_character_at_end_of_stream() {
        let mut d = FrameDecoder::new();
        assert!(d.push(b"x\xE3\x83").is_empty());
        assert_eq!(d.finish().as_deref(), Some("x\u{FFFD}"));
        assert_eq!(d.finish(), None);
    }
}
