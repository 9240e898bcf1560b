use bytes::BytesMut;
use memchr::memchr;

/// Reassembles newline-terminated lines from arbitrarily split chunks.
///
/// Works on raw bytes so a UTF-8 sequence cut by a chunk boundary is joined
/// before it is decoded.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every line it completed, without the
    /// terminator. Lines that are not valid UTF-8 are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = memchr(b'\n', &self.buf) {
            let raw = self.buf.split_to(pos + 1);
            if let Some(line) = decode_line(&raw[..pos]) {
                lines.push(line);
            }
        }
        lines
    }

    /// Drains whatever trails the last newline.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let raw = self.buf.split();
        decode_line(&raw).filter(|line| !line.is_empty())
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    match std::str::from_utf8(raw) {
        Ok(line) => Some(line.to_string()),
        Err(err) => {
            tracing::debug!(error = %err, "dropping non-utf8 stream line");
            None
        }
    }
}
