use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read};

use super::store::read_at;

/// Reads one store file sequentially from its first byte.
///
/// Holds its own handle to the file, so it keeps working after the log
/// lock is released. Bytes appended later are picked up as long as the
/// reader has not hit the end yet.
#[derive(Debug)]
pub struct OriginReader {
    file: File,
    off: u64,
}

impl OriginReader {
    pub(crate) fn new(file: File) -> Self {
        OriginReader { file, off: 0 }
    }
}

impl Read for OriginReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = read_at(&self.file, buf, self.off)?;
        self.off += n as u64;
        Ok(n)
    }
}

/// Concatenation of every segment's store file, in segment order.
///
/// The bytes are the on-disk framing: `[u64 length][record]` repeated.
#[derive(Debug, Default)]
pub struct LogReader {
    readers: VecDeque<OriginReader>,
}

impl LogReader {
    pub(crate) fn new(readers: Vec<OriginReader>) -> Self {
        LogReader {
            readers: readers.into(),
        }
    }
}

impl Read for LogReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while let Some(reader) = self.readers.front_mut() {
            let n = reader.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            self.readers.pop_front();
        }
        Ok(0)
    }
}
