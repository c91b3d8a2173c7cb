use log::debug;
use std::cmp;
use std::io;
use std::io::prelude::*;

/// Bounds of a window in the coordinate space of the underlying source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    start: u64,
    end: u64,
}

impl Window {
    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A read-only, seekable view over a parent byte source, clamped to a stack
/// of nested windows.
///
/// Superbox contents, a codestream, a tile-part and the compressed data of a
/// tile-part are each read through a window pushed on top of the enclosing
/// one. Reads stop at the end of the innermost window and report end of input,
/// never returning bytes of the parent beyond it.
///
/// `Seek` and `stream_position` are relative to the start of the innermost
/// window, [absolute_position](fn@SubStream::absolute_position) gives the
/// position in the parent.
#[derive(Debug)]
pub struct SubStream<R> {
    inner: R,
    position: u64,
    root: Window,
    windows: Vec<Window>,
    marks: Vec<u64>,
}

impl<R: io::Read + io::Seek> SubStream<R> {
    /// Wraps `inner`, with a root window from its current position to its end.
    pub fn new(mut inner: R) -> io::Result<SubStream<R>> {
        let start = inner.stream_position()?;
        let end = inner.seek(io::SeekFrom::End(0))?;
        inner.seek(io::SeekFrom::Start(start))?;

        Ok(SubStream {
            inner,
            position: start,
            root: Window {
                start,
                end: cmp::max(start, end),
            },
            windows: vec![],
            marks: vec![],
        })
    }

    /// The innermost window.
    pub fn window(&self) -> Window {
        match self.windows.last() {
            Some(window) => *window,
            None => self.root,
        }
    }

    /// Number of windows pushed on top of the root window.
    pub fn depth(&self) -> usize {
        self.windows.len()
    }

    /// Opens a window of `length` bytes at the current position.
    ///
    /// The window is clamped to the enclosing window, check
    /// [remaining](fn@SubStream::remaining) first when a short window is an
    /// error.
    pub fn push_window(&mut self, length: u64) -> Window {
        let parent = self.window();
        let start = cmp::min(cmp::max(self.position, parent.start), parent.end);
        let end = cmp::min(start.saturating_add(length), parent.end);
        let window = Window { start, end };
        debug!(
            "push window {}..{} at depth {}",
            window.start,
            window.end,
            self.windows.len() + 1
        );
        self.windows.push(window);
        window
    }

    /// Closes the innermost window, leaving the position where it is.
    ///
    /// The root window is never popped.
    pub fn pop_window(&mut self) -> Option<Window> {
        let window = self.windows.pop();
        if let Some(window) = window {
            debug!(
                "pop window {}..{} at depth {}",
                window.start,
                window.end,
                self.windows.len() + 1
            );
        }
        window
    }

    /// Runs `f` inside a window of `length` bytes; the window is popped
    /// whether or not `f` succeeds.
    pub fn with_window<T, E, F>(&mut self, length: u64, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut SubStream<R>) -> Result<T, E>,
    {
        self.push_window(length);
        let result = f(self);
        self.pop_window();
        result
    }

    /// Bytes left between the current position and the end of the innermost
    /// window.
    pub fn remaining(&self) -> u64 {
        self.window().end.saturating_sub(self.position)
    }

    /// Position in the coordinate space of the underlying source.
    pub fn absolute_position(&self) -> u64 {
        self.position
    }

    /// Saves the current position, see [reset](fn@SubStream::reset).
    pub fn mark(&mut self) {
        self.marks.push(self.position);
    }

    /// Returns to the most recently marked position.
    pub fn reset(&mut self) -> io::Result<()> {
        match self.marks.pop() {
            Some(position) => {
                self.seek_absolute(position)?;
                Ok(())
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "reset called without a matching mark",
            )),
        }
    }

    /// Discards up to `length` bytes, returning how many were skipped.
    pub fn skip(&mut self, length: u64) -> io::Result<u64> {
        let skipped = cmp::min(length, self.remaining());
        self.seek_absolute(self.position + skipped)?;
        Ok(skipped)
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        let mut buffer: [u8; 1] = [0; 1];
        self.read_exact(&mut buffer)?;
        Ok(buffer[0])
    }

    pub fn read_i8(&mut self) -> io::Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> io::Result<u16> {
        let mut buffer: [u8; 2] = [0; 2];
        self.read_exact(&mut buffer)?;
        Ok(u16::from_be_bytes(buffer))
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        let mut buffer: [u8; 4] = [0; 4];
        self.read_exact(&mut buffer)?;
        Ok(u32::from_be_bytes(buffer))
    }

    pub fn read_u64(&mut self) -> io::Result<u64> {
        let mut buffer: [u8; 8] = [0; 8];
        self.read_exact(&mut buffer)?;
        Ok(u64::from_be_bytes(buffer))
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn seek_absolute(&mut self, position: u64) -> io::Result<u64> {
        self.inner.seek(io::SeekFrom::Start(position))?;
        self.position = position;
        Ok(position)
    }
}

impl<R: io::Read + io::Seek> io::Read for SubStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let length = cmp::min(buf.len() as u64, remaining) as usize;
        let read = self.inner.read(&mut buf[..length])?;
        self.position += read as u64;
        Ok(read)
    }
}

impl<R: io::Read + io::Seek> io::Seek for SubStream<R> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let window = self.window();
        let target = match pos {
            io::SeekFrom::Start(offset) => window.start as i128 + offset as i128,
            io::SeekFrom::End(offset) => window.end as i128 + offset as i128,
            io::SeekFrom::Current(offset) => self.position as i128 + offset as i128,
        };

        if target < window.start as i128 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the window",
            ));
        }

        let target = cmp::min(target, window.end as i128) as u64;
        self.seek_absolute(target)?;
        Ok(target - window.start)
    }
}
