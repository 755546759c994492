use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::errors::HprofStripError;
use crate::errors::HprofStripError::TruncatedInput;

pub const PAGE_SIZE: usize = 4096;
const PAGE_MASK: u64 = PAGE_SIZE as u64 - 1;

/// Random access byte source caching a single page of the underlying file.
///
/// Reads and copies spanning at least one page bypass the cache and go straight
/// to the file so large payloads are not buffered twice.
pub struct PagedReader<R> {
    inner: R,
    len: u64,
    // logical position
    pos: u64,
    // position of `inner`, tracked to avoid redundant seeks
    inner_pos: u64,
    page: Box<[u8; PAGE_SIZE]>,
    page_start: Option<u64>,
}

impl PagedReader<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HprofStripError> {
        let file = File::open(path)?;
        Self::new(file)
    }
}

impl<R: Read + Seek> PagedReader<R> {
    pub fn new(mut inner: R) -> Result<Self, HprofStripError> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(PagedReader {
            inner,
            len,
            pos: 0,
            inner_pos: 0,
            page: Box::new([0; PAGE_SIZE]),
            page_start: None,
        })
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn length(&self) -> u64 {
        self.len
    }

    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.pos)
    }

    /// Seeking never touches the file, the next read decides what to load.
    pub fn seek(&mut self, offset: u64) {
        self.pos = offset;
    }

    pub fn skip(&mut self, n: u64) -> Result<(), HprofStripError> {
        self.ensure_available(n)?;
        self.pos += n;
        Ok(())
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), HprofStripError> {
        let n = buf.len();
        self.ensure_available(n as u64)?;
        if n >= PAGE_SIZE && !self.in_page(self.pos) {
            self.sync_inner()?;
            self.inner.read_exact(buf)?;
            self.advance_direct(n as u64);
            return Ok(());
        }
        let mut filled = 0;
        while filled < n {
            self.load_page()?;
            let available = self.page_available();
            let chunk = available.min(n - filled);
            let from = (self.pos & PAGE_MASK) as usize;
            buf[filled..filled + chunk].copy_from_slice(&self.page[from..from + chunk]);
            filled += chunk;
            self.pos += chunk as u64;
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, HprofStripError> {
        let mut b = [0; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    /// Appends `n` bytes to `buf`.
    pub fn read_into(&mut self, buf: &mut Vec<u8>, n: usize) -> Result<(), HprofStripError> {
        let start = buf.len();
        buf.resize(start + n, 0);
        self.read_exact(&mut buf[start..])
    }

    /// Streams `n` bytes to `sink` without allocating proportionally to `n`.
    pub fn copy_to<W: Write + ?Sized>(
        &mut self,
        sink: &mut W,
        n: u64,
    ) -> Result<(), HprofStripError> {
        self.ensure_available(n)?;
        let mut remaining = n;
        // drain the cached page first
        if remaining > 0 && self.in_page(self.pos) {
            let chunk = (self.page_available() as u64).min(remaining) as usize;
            let from = (self.pos & PAGE_MASK) as usize;
            sink.write_all(&self.page[from..from + chunk])?;
            self.pos += chunk as u64;
            remaining -= chunk as u64;
        }
        if remaining >= PAGE_SIZE as u64 {
            self.sync_inner()?;
            let copied = std::io::copy(&mut (&mut self.inner).take(remaining), sink)?;
            self.advance_direct(copied);
            if copied != remaining {
                return Err(TruncatedInput {
                    offset: self.pos,
                    needed: remaining - copied,
                });
            }
            return Ok(());
        }
        while remaining > 0 {
            self.load_page()?;
            let chunk = (self.page_available() as u64).min(remaining) as usize;
            let from = (self.pos & PAGE_MASK) as usize;
            sink.write_all(&self.page[from..from + chunk])?;
            self.pos += chunk as u64;
            remaining -= chunk as u64;
        }
        Ok(())
    }

    fn ensure_available(&self, n: u64) -> Result<(), HprofStripError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(TruncatedInput {
                offset: self.pos,
                needed: n - remaining,
            });
        }
        Ok(())
    }

    fn in_page(&self, offset: u64) -> bool {
        self.page_start == Some(offset & !PAGE_MASK) && offset < self.len
    }

    // bytes of the cached page available from the current position
    fn page_available(&self) -> usize {
        let page_start = self.page_start.unwrap_or(self.pos & !PAGE_MASK);
        let page_end = (page_start + PAGE_SIZE as u64).min(self.len);
        (page_end - self.pos) as usize
    }

    fn load_page(&mut self) -> Result<(), HprofStripError> {
        let page_start = self.pos & !PAGE_MASK;
        if self.page_start == Some(page_start) {
            return Ok(());
        }
        if self.inner_pos != page_start {
            self.inner.seek(SeekFrom::Start(page_start))?;
            self.inner_pos = page_start;
        }
        let fill = (self.len - page_start).min(PAGE_SIZE as u64) as usize;
        // invalidate first, a failed read leaves a partial page
        self.page_start = None;
        self.inner.read_exact(&mut self.page[..fill])?;
        self.inner_pos += fill as u64;
        self.page_start = Some(page_start);
        Ok(())
    }

    fn sync_inner(&mut self) -> Result<(), HprofStripError> {
        if self.inner_pos != self.pos {
            self.inner.seek(SeekFrom::Start(self.pos))?;
            self.inner_pos = self.pos;
        }
        Ok(())
    }

    fn advance_direct(&mut self, n: u64) {
        self.pos += n;
        self.inner_pos += n;
    }
}
