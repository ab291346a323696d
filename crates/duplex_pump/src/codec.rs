use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{config::DEFAULT_MAX_RECORD_BYTES, error::CodecError};

const READ_CHUNK_BYTES: usize = 8192;

/// Decodes a stream of concatenated JSON values one record at a time.
///
/// Values may be separated by whitespace or not separated at all. Each input
/// byte is framed once; the completed span is then handed to serde.
pub struct RecordDecoder<R> {
    reader: R,
    buffer: Vec<u8>,
    framer: Framer,
    strict: bool,
    max_record_bytes: usize,
    eof: bool,
}

impl<R: AsyncRead + Unpin> RecordDecoder<R> {
    pub fn new(reader: R, strict: bool) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            framer: Framer::default(),
            strict,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
            eof: false,
        }
    }

    /// Caps the bytes one record may occupy; larger records fail with
    /// [`CodecError::RecordTooLarge`].
    pub fn max_record_bytes(mut self, max_record_bytes: usize) -> Self {
        self.max_record_bytes = max_record_bytes;
        self
    }

    /// Returns the next record, or `Ok(None)` once the input is cleanly exhausted.
    ///
    /// In strict mode any field the record type ignores is reported as
    /// [`CodecError::UnknownFields`].
    pub async fn next_record<T: DeserializeOwned>(&mut self) -> Result<Option<T>, CodecError> {
        loop {
            if self.framer.is_fresh() {
                let leading = self
                    .buffer
                    .iter()
                    .take_while(|b| is_json_whitespace(**b))
                    .count();
                self.buffer.drain(..leading);
            }

            if self.buffer.is_empty() {
                if self.eof {
                    return Ok(None);
                }
                self.fill().await?;
                continue;
            }

            let end = match self.framer.advance(&self.buffer) {
                Frame::Complete(end) => end,
                // Let serde report the truncation, or accept a trailing scalar.
                Frame::Partial if self.eof => self.buffer.len(),
                Frame::Partial => {
                    self.check_size(self.buffer.len())?;
                    self.fill().await?;
                    continue;
                }
            };

            self.check_size(end)?;
            self.framer = Framer::default();
            let record = decode_span(&self.buffer[..end], self.strict);
            self.buffer.drain(..end);
            return record.map(Some);
        }
    }

    fn check_size(&self, observed_bytes: usize) -> Result<(), CodecError> {
        if observed_bytes > self.max_record_bytes {
            return Err(CodecError::RecordTooLarge {
                observed_bytes,
                max_record_bytes: self.max_record_bytes,
            });
        }
        Ok(())
    }

    async fn fill(&mut self) -> Result<(), CodecError> {
        self.buffer.reserve(READ_CHUNK_BYTES);
        let n = self.reader.read_buf(&mut self.buffer).await?;
        if n == 0 {
            self.eof = true;
        }
        Ok(())
    }
}

fn is_json_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_scalar_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.')
}

enum Frame {
    Complete(usize),
    Partial,
}

/// Finds where the value starting at `buf[0]` ends, resuming where the
/// previous call stopped. Validation is left to serde.
#[derive(Debug, Default)]
struct Framer {
    pos: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Framer {
    fn is_fresh(&self) -> bool {
        self.pos == 0
    }

    fn advance(&mut self, buf: &[u8]) -> Frame {
        if !matches!(buf[0], b'{' | b'[' | b'"') {
            while self.pos < buf.len() && is_scalar_byte(buf[self.pos]) {
                self.pos += 1;
            }
            return if self.pos < buf.len() {
                // A stray structural byte still forms a one-byte span for serde to reject.
                Frame::Complete(self.pos.max(1))
            } else {
                Frame::Partial
            };
        }

        while self.pos < buf.len() {
            let b = buf[self.pos];
            self.pos += 1;
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                    if self.depth == 0 {
                        return Frame::Complete(self.pos);
                    }
                }
                continue;
            }
            match b {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        return Frame::Complete(self.pos);
                    }
                }
                _ => {}
            }
        }
        Frame::Partial
    }
}

fn decode_span<T: DeserializeOwned>(span: &[u8], strict: bool) -> Result<T, CodecError> {
    if !strict {
        return Ok(serde_json::from_slice(span)?);
    }

    let mut unknown = Vec::new();
    let mut de = serde_json::Deserializer::from_slice(span);
    let record: T = serde_ignored::deserialize(&mut de, |path| unknown.push(path.to_string()))?;
    de.end()?;
    if !unknown.is_empty() {
        return Err(CodecError::UnknownFields { fields: unknown });
    }
    Ok(record)
}

/// Writes each record as 2-space indented JSON followed by a newline.
pub struct RecordEncoder<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> RecordEncoder<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Accepts owned records as well as references.
    pub async fn write_record<U: Serialize>(&mut self, record: U) -> Result<(), CodecError> {
        let mut bytes = serde_json::to_vec_pretty(&record)?;
        bytes.push(b'\n');
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn finish(mut self) -> Result<W, CodecError> {
        self.writer.flush().await?;
        Ok(self.writer)
    }
}
