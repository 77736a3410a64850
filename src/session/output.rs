//! Framing of consumed envelopes on the output stream.
//!
//! With a non-zero indent the output is one pretty-printed JSON array that is
//! opened by the first envelope and closed by `finish`. With indent zero
//! every envelope is written as one compact line.

use std::io::Write;

use serde::Serialize;
use serde_json::Serializer;
use serde_json::ser::PrettyFormatter;

use crate::codec::Envelope;
use crate::session::SessionError;

#[derive(Debug)]
pub struct OutputWriter<W: Write> {
    out: W,
    indent: Vec<u8>,
    emitted: u64,
}

impl<W: Write> OutputWriter<W> {
    pub fn new(out: W, indent: usize) -> Self {
        Self {
            out,
            indent: vec![b' '; indent],
            emitted: 0,
        }
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn is_array(&self) -> bool {
        !self.indent.is_empty()
    }

    pub fn write(&mut self, envelope: &Envelope) -> Result<(), SessionError> {
        if self.is_array() {
            let separator: &[u8] = if self.emitted == 0 { b"[" } else { b"," };
            self.out.write_all(separator)?;
            let formatter = PrettyFormatter::with_indent(&self.indent);
            let mut serializer = Serializer::with_formatter(&mut self.out, formatter);
            envelope.serialize(&mut serializer)?;
        } else {
            serde_json::to_writer(&mut self.out, envelope)?;
            self.out.write_all(b"\n")?;
        }

        self.emitted += 1;
        self.out.flush()?;
        Ok(())
    }

    /// Closes the array, if any. An array with no envelopes is written as
    /// `[]`.
    pub fn finish(mut self) -> Result<W, SessionError> {
        if self.is_array() {
            if self.emitted == 0 {
                self.out.write_all(b"[")?;
            }
            self.out.write_all(b"]\n")?;
        }
        self.out.flush()?;
        Ok(self.out)
    }
}
