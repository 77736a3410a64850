use std::mem;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("input must start with '[' or '{{', found {0:?}")]
    UnexpectedLead(char),

    #[error("invalid JSON on line {line}: {source}")]
    Line {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid JSON input: {0}")]
    Batch(#[from] serde_json::Error),
}

/// Input format, fixed by the first non-blank byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    Undecided,
    Batch,
    Stream,
}

/// Incremental decoder for publish input.
///
/// Arrays produced by either mode are flattened: every element is yielded on
/// its own, recursively, in input order.
#[derive(Debug)]
pub struct IngestDecoder {
    mode: IngestMode,
    buffer: Vec<u8>,
    line: usize,
    after_cr: bool,
}

impl Default for IngestDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestDecoder {
    pub fn new() -> Self {
        Self {
            mode: IngestMode::Undecided,
            buffer: Vec::new(),
            line: 0,
            after_cr: false,
        }
    }

    pub fn mode(&self) -> IngestMode {
        self.mode
    }

    pub fn feed_str(&mut self, chunk: &str) -> Result<Vec<Value>, IngestError> {
        self.feed(chunk.as_bytes())
    }

    /// Consumes one chunk and returns every value completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Value>, IngestError> {
        let mut out = Vec::new();

        let chunk = if self.mode == IngestMode::Undecided {
            let Some(start) = chunk.iter().position(|b| !b.is_ascii_whitespace()) else {
                self.line += count_newlines(chunk);
                return Ok(out);
            };
            self.line += count_newlines(&chunk[..start]);
            self.mode = match chunk[start] {
                b'[' => IngestMode::Batch,
                b'{' => IngestMode::Stream,
                other => return Err(IngestError::UnexpectedLead(char::from(other))),
            };
            &chunk[start..]
        } else {
            chunk
        };

        match self.mode {
            IngestMode::Batch => self.buffer.extend_from_slice(chunk),
            IngestMode::Stream => self.feed_lines(chunk, &mut out)?,
            IngestMode::Undecided => {}
        }

        Ok(out)
    }

    /// Signals end of input and returns the remaining values: the whole
    /// document in batch mode, the unterminated last line in stream mode.
    pub fn finish(&mut self) -> Result<Vec<Value>, IngestError> {
        let mut out = Vec::new();
        match self.mode {
            IngestMode::Undecided => {}
            IngestMode::Batch => {
                let buffer = mem::take(&mut self.buffer);
                let value = serde_json::from_slice(&buffer)?;
                flatten_into(value, &mut out);
            }
            IngestMode::Stream => self.complete_line(&mut out)?,
        }
        Ok(out)
    }

    fn feed_lines(&mut self, chunk: &[u8], out: &mut Vec<Value>) -> Result<(), IngestError> {
        let mut rest = chunk;
        loop {
            // A "\r\n" split across chunks still counts as one terminator.
            if self.after_cr {
                match rest.first() {
                    Some(b'\n') => rest = &rest[1..],
                    Some(_) => {}
                    None => return Ok(()),
                }
                self.after_cr = false;
            }

            let Some(pos) = rest.iter().position(|&b| b == b'\n' || b == b'\r') else {
                self.buffer.extend_from_slice(rest);
                return Ok(());
            };

            self.buffer.extend_from_slice(&rest[..pos]);
            self.after_cr = rest[pos] == b'\r';
            rest = &rest[pos + 1..];
            self.complete_line(out)?;
        }
    }

    fn complete_line(&mut self, out: &mut Vec<Value>) -> Result<(), IngestError> {
        self.line += 1;
        let line = mem::take(&mut self.buffer);
        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }

        let value = serde_json::from_slice(&line).map_err(|source| IngestError::Line {
            line: self.line,
            source,
        })?;
        flatten_into(value, out);
        Ok(())
    }
}

fn flatten_into(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        other => out.push(other),
    }
}

fn count_newlines(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b == b'\n').count()
}
