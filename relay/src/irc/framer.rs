use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Longest line accepted, terminator excluded (IRCv3 message-tags limit).
pub const MAX_LINE_LENGTH: usize = 8191;

/// Frames CRLF-terminated protocol lines out of arbitrary socket reads.
///
/// Bytes after the last terminator stay in the read buffer until a later
/// read completes them, so a line split across two reads comes out exactly
/// once. Lines are decoded lossily; empty lines are skipped.
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Set after an overlong line was dropped, until its terminator arrives.
    discarding: bool,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for LineFramer {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(newline_idx) = src.iter().position(|&b| b == b'\n') else {
                if src.len() > MAX_LINE_LENGTH {
                    if !self.discarding {
                        tracing::warn!(
                            buffered = src.len(),
                            "Discarding oversized IRC line"
                        );
                    }
                    src.clear();
                    self.discarding = true;
                }
                return Ok(None);
            };

            let mut line_bytes = src.split_to(newline_idx);
            src.advance(1);

            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if line_bytes.last() == Some(&b'\r') {
                line_bytes.truncate(line_bytes.len() - 1);
            }
            if line_bytes.len() > MAX_LINE_LENGTH {
                tracing::warn!(length = line_bytes.len(), "Discarding oversized IRC line");
                continue;
            }
            if !line_bytes.is_empty() {
                return Ok(Some(String::from_utf8_lossy(&line_bytes).into_owned()));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let line = self.decode(src)?;
        if line.is_none() && !src.is_empty() {
            tracing::debug!(dropped = src.len(), "Unterminated line at end of stream");
            src.clear();
        }
        Ok(line)
    }
}
