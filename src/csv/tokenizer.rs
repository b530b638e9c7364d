use tracing::warn;

use crate::{
    csv::{Format, source::ByteSource},
    error::{Error, Result},
};

/// A completed field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    /// Line index, counting only non-blank lines
    pub line: u64,
    /// Position of the field within its line
    pub index: usize,
    /// Stream offset just past the byte that completed the field
    pub offset: u64,
    pub value: &'a [u8],
    /// Whether any part of the field was enclosed in quotes
    pub quoted: bool,
}

/// A completed line, emitted after all of its fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    pub line: u64,
    pub fields: usize,
    pub offset: u64,
}

/// Receiver of tokenizer events
///
/// An error returned from either method stops tokenizing and is returned
/// from [`Tokenizer::run`] unchanged.
pub trait Sink {
    fn on_field(&mut self, field: &Field<'_>) -> Result<()>;
    fn on_line(&mut self, line: &Line) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenizerStats {
    pub lines: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Unquoted content
    Simple,
    /// Inside quotes, everything but the quote byte is content
    Quoted,
    /// A quote was seen inside quotes: either an escaped quote or the end
    CheckQuote,
    /// The first n bytes of a multi-byte terminator have been seen
    CheckEol(usize),
}

/// Quote-aware state machine turning a byte stream into field and line events
///
/// All state lives in the tokenizer itself, so the way the input is split
/// into chunks has no influence on the events produced.
pub struct Tokenizer {
    format: Format,
    state: State,
    buffer: FieldBuffer,
    quoted: bool,
    line: u64,
    field: usize,
    offset: u64,
    /// Bytes consumed since the current line started
    line_bytes: u64,
}

impl Tokenizer {
    pub fn new(format: Format, max_field_bytes: usize) -> Result<Self> {
        format.validate()?;
        Ok(Self {
            format,
            state: State::Simple,
            buffer: FieldBuffer::new(max_field_bytes),
            quoted: false,
            line: 0,
            field: 0,
            offset: 0,
            line_bytes: 0,
        })
    }

    /// Pulls chunks from `source` until it is exhausted, feeding every field
    /// and line to `sink`.
    pub fn run<S, K>(mut self, source: &mut S, sink: &mut K) -> Result<TokenizerStats>
    where
        S: ByteSource + ?Sized,
        K: Sink + ?Sized,
    {
        while let Some(chunk) = source.next_chunk()? {
            if chunk.is_empty() {
                break;
            }
            for &byte in chunk {
                self.offset += 1;
                self.line_bytes += 1;
                self.step(byte, sink)?;
            }
        }
        self.finish(sink)?;
        Ok(TokenizerStats {
            lines: self.line,
            bytes: self.offset,
        })
    }

    fn step<K: Sink + ?Sized>(&mut self, byte: u8, sink: &mut K) -> Result<()> {
        match self.state {
            State::Simple => self.simple(byte, sink),
            State::Quoted => {
                if byte == self.format.quote {
                    self.state = State::CheckQuote;
                    Ok(())
                } else {
                    self.push(byte)
                }
            }
            State::CheckQuote => {
                if byte == self.format.quote {
                    self.state = State::Quoted;
                    self.push(byte)
                } else {
                    self.state = State::Simple;
                    self.simple(byte, sink)
                }
            }
            State::CheckEol(matched) => {
                if byte == self.format.eol[matched] {
                    if matched + 1 == self.format.eol.len() {
                        self.state = State::Simple;
                        self.end_line(sink)
                    } else {
                        self.state = State::CheckEol(matched + 1);
                        Ok(())
                    }
                } else {
                    // Not a terminator after all. Its first byte is content;
                    // the rest may begin a terminator, so scan it again.
                    self.state = State::Simple;
                    self.push(self.format.eol[0])?;
                    for i in 1..matched {
                        let b = self.format.eol[i];
                        self.step(b, sink)?;
                    }
                    self.step(byte, sink)
                }
            }
        }
    }

    fn simple<K: Sink + ?Sized>(&mut self, byte: u8, sink: &mut K) -> Result<()> {
        if byte == self.format.delimiter {
            self.end_field(sink)
        } else if byte == self.format.quote {
            self.quoted = true;
            self.state = State::Quoted;
            Ok(())
        } else if byte == self.format.eol[0] {
            if self.format.eol.len() == 1 {
                self.end_line(sink)
            } else {
                self.state = State::CheckEol(1);
                Ok(())
            }
        } else {
            self.push(byte)
        }
    }

    fn push(&mut self, byte: u8) -> Result<()> {
        let (line, field) = (self.line, self.field);
        self.buffer.push(byte).map_err(|err| match err {
            Error::OutOfMemory(msg) => {
                Error::OutOfMemory(format!("line {}, field {}: {}", line, field, msg))
            }
            other => other,
        })
    }

    fn end_field<K: Sink + ?Sized>(&mut self, sink: &mut K) -> Result<()> {
        sink.on_field(&Field {
            line: self.line,
            index: self.field,
            offset: self.offset,
            value: self.buffer.as_slice(),
            quoted: self.quoted,
        })?;
        self.buffer.clear();
        self.field += 1;
        self.quoted = false;
        Ok(())
    }

    fn end_line<K: Sink + ?Sized>(&mut self, sink: &mut K) -> Result<()> {
        // Nothing but the terminator: a blank line produces no events.
        if self.line_bytes == self.format.eol.len() as u64 {
            self.line_bytes = 0;
            return Ok(());
        }
        self.emit_line(sink)
    }

    fn emit_line<K: Sink + ?Sized>(&mut self, sink: &mut K) -> Result<()> {
        self.end_field(sink)?;
        sink.on_line(&Line {
            line: self.line,
            fields: self.field,
            offset: self.offset,
        })?;
        self.line += 1;
        self.field = 0;
        self.line_bytes = 0;
        Ok(())
    }

    /// Flushes a pending line at end of stream
    fn finish<K: Sink + ?Sized>(&mut self, sink: &mut K) -> Result<()> {
        match self.state {
            State::CheckEol(matched) => {
                for i in 0..matched {
                    let b = self.format.eol[i];
                    self.push(b)?;
                }
            }
            State::Quoted => {
                warn!(
                    line = self.line,
                    field = self.field,
                    offset = self.offset,
                    "unterminated quoted field at end of input"
                );
            }
            State::Simple | State::CheckQuote => {}
        }
        self.state = State::Simple;
        if self.line_bytes > 0 {
            self.emit_line(sink)?;
        }
        Ok(())
    }
}

/// Accumulation buffer for the field being assembled
///
/// Capacity doubles on overflow through `try_reserve`, so an allocation
/// failure is reported instead of aborting, and never exceeds `limit`.
struct FieldBuffer {
    data: Vec<u8>,
    limit: usize,
}

impl FieldBuffer {
    const INITIAL_CAPACITY: usize = 64;

    fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
        }
    }

    fn push(&mut self, byte: u8) -> Result<()> {
        let len = self.data.len();
        if len >= self.limit {
            return Err(Error::OutOfMemory(format!(
                "field exceeds the {} byte limit",
                self.limit
            )));
        }
        if len == self.data.capacity() {
            let target = (len * 2).max(Self::INITIAL_CAPACITY).min(self.limit);
            self.data.try_reserve_exact(target - len)?;
        }
        self.data.push(byte);
        Ok(())
    }

    fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn clear(&mut self) {
        self.data.clear();
    }
}
