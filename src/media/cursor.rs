//! Sequential big-endian reader over a seekable byte source
//!
//! [`ByteCursor`] keeps a logical read position separate from the position of
//! the underlying reader. Reads bring the reader in line with the logical
//! position first, so rewinding the cursor is just an assignment and cannot
//! fail. This is what lets [`Rewind`] restore the position from `Drop` on
//! every exit path of a lookahead.
//!
//! ```text
//!   logical pos ──┐           ┌── len
//!                 ▼           ▼
//!   [..........][x][.........]
//!                 ▲
//!   reader pos ───┘  (re-synced lazily before the next read)
//! ```

use std::io::{self, Read, Seek, SeekFrom};
use std::ops::{Deref, DerefMut};

use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// Cursor-level failures
#[derive(Debug, Error)]
pub enum CursorError {
    /// Fewer bytes remain than were requested
    #[error("needed {requested} bytes, {remaining} remaining")]
    EndOfStream { requested: u64, remaining: u64 },

    /// A relative seek would move before the start of the source
    #[error("seek by {delta} from offset {position} leaves the source")]
    InvalidSeek { position: u64, delta: i64 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Big-endian reader with peek and relative seek
#[derive(Debug)]
pub struct ByteCursor<R> {
    inner: R,
    /// Logical read position
    pos: u64,
    /// Position of `inner`, `None` when unknown after a failed read
    physical: Option<u64>,
    /// Total source length, captured at construction
    len: u64,
}

impl<R: Read + Seek> ByteCursor<R> {
    /// Wrap a reader. The source length is measured once, up front.
    pub fn new(mut inner: R) -> io::Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner,
            pos: 0,
            physical: Some(0),
            len,
        })
    }

    /// Current logical offset
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Total length of the source in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Check if the source is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes left between the current offset and the end
    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.pos)
    }

    /// Fill `buf` completely and advance past it
    pub fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<(), CursorError> {
        let requested = buf.len() as u64;
        let remaining = self.remaining();
        if requested > remaining {
            return Err(CursorError::EndOfStream {
                requested,
                remaining,
            });
        }

        self.sync()?;
        if let Err(e) = self.inner.read_exact(buf) {
            self.physical = None;
            return Err(match e.kind() {
                // The file shrank underneath us
                io::ErrorKind::UnexpectedEof => CursorError::EndOfStream {
                    requested,
                    remaining,
                },
                _ => CursorError::Io(e),
            });
        }

        self.pos += requested;
        self.physical = Some(self.pos);
        Ok(())
    }

    /// Read `n` bytes (1..=4) as a big-endian unsigned integer
    pub fn read_uint(&mut self, n: usize) -> Result<u32, CursorError> {
        debug_assert!((1..=4).contains(&n), "read_uint supports 1 to 4 bytes");
        let mut bytes = [0u8; 4];
        self.read_exact_into(&mut bytes[4 - n..])?;
        Ok(u32::from_be_bytes(bytes))
    }

    pub fn read_u8(&mut self) -> Result<u8, CursorError> {
        self.read_uint(1).map(|v| v as u8)
    }

    pub fn read_u24(&mut self) -> Result<u32, CursorError> {
        self.read_uint(3)
    }

    pub fn read_u32(&mut self) -> Result<u32, CursorError> {
        self.read_uint(4)
    }

    /// Read the 4-byte FLV time field (24-bit value followed by the high byte)
    pub fn read_time(&mut self) -> Result<u32, CursorError> {
        let mut raw = [0u8; 4];
        self.read_exact_into(&mut raw)?;
        Ok(super::flv::decode_time(raw))
    }

    /// Read `n` bytes as a payload, reusing `buf`'s allocation when possible
    pub fn read_bytes(&mut self, n: usize, buf: &mut BytesMut) -> Result<Bytes, CursorError> {
        let remaining = self.remaining();
        if n as u64 > remaining {
            return Err(CursorError::EndOfStream {
                requested: n as u64,
                remaining,
            });
        }

        buf.clear();
        buf.resize(n, 0);
        self.read_exact_into(&mut buf[..])?;
        Ok(buf.split().freeze())
    }

    /// Read `n` bytes as a big-endian integer without moving the cursor
    pub fn peek_uint(&mut self, n: usize) -> Result<u32, CursorError> {
        self.rewind().read_uint(n)
    }

    pub fn peek_u8(&mut self) -> Result<u8, CursorError> {
        self.rewind().read_u8()
    }

    /// Move the cursor by `delta` bytes in either direction.
    ///
    /// Landing exactly on the end of the source is allowed.
    pub fn skip(&mut self, delta: i64) -> Result<(), CursorError> {
        let target = i128::from(self.pos) + i128::from(delta);
        if target < 0 {
            return Err(CursorError::InvalidSeek {
                position: self.pos,
                delta,
            });
        }
        if target > i128::from(self.len) {
            return Err(CursorError::EndOfStream {
                requested: delta.unsigned_abs(),
                remaining: self.remaining(),
            });
        }

        self.pos = target as u64;
        Ok(())
    }

    /// Save the current offset; it is restored when the guard drops.
    pub fn rewind(&mut self) -> Rewind<'_, R> {
        Rewind {
            saved: self.pos,
            cursor: self,
        }
    }

    fn sync(&mut self) -> io::Result<()> {
        if self.physical != Some(self.pos) {
            self.inner.seek(SeekFrom::Start(self.pos))?;
            self.physical = Some(self.pos);
        }
        Ok(())
    }
}

/// Scoped lookahead over a [`ByteCursor`]
///
/// Everything read or skipped through the guard is undone when it goes out
/// of scope, whether the lookahead succeeded or bailed out with `?`.
pub struct Rewind<'a, R> {
    cursor: &'a mut ByteCursor<R>,
    saved: u64,
}

impl<R> Deref for Rewind<'_, R> {
    type Target = ByteCursor<R>;

    fn deref(&self) -> &Self::Target {
        self.cursor
    }
}

impl<R> DerefMut for Rewind<'_, R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.cursor
    }
}

impl<R> Drop for Rewind<'_, R> {
    fn drop(&mut self) {
        self.cursor.pos = self.saved;
    }
}
