//! Destinations for serialized JSON text.

use std::io::{self, Write};

/// Receives JSON text as the serializer produces it.
///
/// `consume` may be called many times with small fragments; a fragment can
/// end in the middle of a token. `terminate` is called once when the document
/// is finished.
pub trait JsonConsumer {
    fn consume(&mut self, json: &[u8]);

    /// Account for the trailing NUL terminator of the output.
    fn terminate(&mut self);
}

impl<C: JsonConsumer + ?Sized> JsonConsumer for &mut C {
    fn consume(&mut self, json: &[u8]) {
        (**self).consume(json);
    }

    fn terminate(&mut self) {
        (**self).terminate();
    }
}

/// Collects the text; `terminate` adds nothing.
impl JsonConsumer for Vec<u8> {
    fn consume(&mut self, json: &[u8]) {
        self.extend_from_slice(json);
    }

    fn terminate(&mut self) {}
}

/// Counts the bytes a document needs, terminator included.
///
/// Run a serializer over a counter first to size the buffer for a
/// [`JsonPrinter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLengthCounter {
    count: usize,
}

impl JsonLengthCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl JsonConsumer for JsonLengthCounter {
    fn consume(&mut self, json: &[u8]) {
        self.count += json.len();
    }

    fn terminate(&mut self) {
        self.count += 1;
    }
}

/// Writes into a fixed buffer and records whether anything was cut off.
///
/// The output is always NUL terminated as long as the buffer is not empty;
/// when it is full the last byte is overwritten by the terminator.
#[derive(Debug)]
pub struct JsonPrinter<'a> {
    output: &'a mut [u8],
    written: usize,
    overflowed: bool,
}

impl<'a> JsonPrinter<'a> {
    pub fn new(output: &'a mut [u8]) -> Self {
        Self {
            output,
            written: 0,
            overflowed: false,
        }
    }

    /// Whether some text did not fit.
    pub fn has_overflowed(&self) -> bool {
        self.overflowed
    }

    /// Bytes written, including the terminator once written.
    pub fn written(&self) -> usize {
        self.written
    }

    /// The text written so far, without the terminator.
    pub fn text(&self) -> &[u8] {
        let text = &self.output[..self.written];
        match text.iter().position(|&b| b == 0) {
            Some(end) => &text[..end],
            None => text,
        }
    }
}

impl JsonConsumer for JsonPrinter<'_> {
    fn consume(&mut self, json: &[u8]) {
        let left = self.output.len() - self.written;
        let w = left.min(json.len());
        self.output[self.written..self.written + w].copy_from_slice(&json[..w]);
        self.written += w;
        self.overflowed |= w < json.len();
    }

    fn terminate(&mut self) {
        if self.output.is_empty() {
            return;
        }
        if self.written == self.output.len() {
            self.output[self.written - 1] = 0;
        } else {
            self.output[self.written] = 0;
            self.written += 1;
        }
    }
}

/// Streams the text into an [`io::Write`].
///
/// The first I/O error is kept and later fragments are dropped; check it with
/// [`finish`](Self::finish) after serializing.
#[derive(Debug)]
pub struct IoConsumer<W: Write> {
    writer: W,
    error: Option<io::Error>,
}

impl<W: Write> IoConsumer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            error: None,
        }
    }

    pub fn error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }

    /// Return the writer, or the first error it produced.
    pub fn finish(self) -> io::Result<W> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.writer),
        }
    }
}

impl<W: Write> JsonConsumer for IoConsumer<W> {
    fn consume(&mut self, json: &[u8]) {
        if self.error.is_none() {
            if let Err(err) = self.writer.write_all(json) {
                self.error = Some(err);
            }
        }
    }

    fn terminate(&mut self) {
        if self.error.is_none() {
            if let Err(err) = self.writer.flush() {
                self.error = Some(err);
            }
        }
    }
}
