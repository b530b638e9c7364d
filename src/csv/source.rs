use std::io::{ErrorKind, Read};

use crate::error::{Error, Result};

/// Pull-based input for the tokenizer
///
/// Each call hands out the next contiguous run of bytes. `None` or an empty
/// chunk ends the stream; an error is fatal to the caller.
pub trait ByteSource {
    fn next_chunk(&mut self) -> Result<Option<&[u8]>>;
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn next_chunk(&mut self) -> Result<Option<&[u8]>> {
        (**self).next_chunk()
    }
}

/// Serves an in-memory buffer in fixed-size chunks
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
    chunk_size: usize,
}

impl<'a> SliceSource<'a> {
    pub const DEFAULT_CHUNK_SIZE: usize = 4096;

    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl<'a> ByteSource for SliceSource<'a> {
    fn next_chunk(&mut self) -> Result<Option<&[u8]>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let end = self.data.len().min(self.pos + self.chunk_size);
        let chunk = &self.data[self.pos..end];
        self.pos = end;
        Ok(Some(chunk))
    }
}

/// Reads chunks from any `Read` implementation, e.g. a file
pub struct ReaderSource<R: Read> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_capacity(8 * 1024, reader)
    }

    pub fn with_capacity(capacity: usize, reader: R) -> Self {
        Self {
            reader,
            buf: vec![0; capacity.max(1)],
        }
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn next_chunk(&mut self) -> Result<Option<&[u8]>> {
        loop {
            match self.reader.read(&mut self.buf) {
                Ok(0) => return Ok(None),
                Ok(n) => return Ok(Some(&self.buf[..n])),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(Error::Io(format!("failed to read input: {}", err)));
                }
            }
        }
    }
}
