// SPDX-License-Identifier: Apache-2.0

//! Byte sources the tokenizer pulls from.
//!
//! A [`ByteSource`] hands out one byte of lookahead and one byte of
//! consumption; `None` is the end-of-input sentinel. Three ready-made
//! implementations cover the common cases: an in-memory slice, a buffered
//! wrapper over any [`std::io::Read`], and a pair of caller-supplied
//! callbacks with an opaque context for embedding the parser over exotic
//! transports.

use std::io;

/// Pull interface over a stream of bytes.
///
/// `None` means end of input. Sources backed by fallible I/O report errors
/// out of band (see [`ReadSource::take_io_error`]); to the tokenizer a
/// failed source simply ends.
pub trait ByteSource {
    /// Consume and return the next byte.
    fn next_byte(&mut self) -> Option<u8>;
    /// Return the next byte without consuming it.
    fn peek_byte(&mut self) -> Option<u8>;
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn next_byte(&mut self) -> Option<u8> {
        (**self).next_byte()
    }
    fn peek_byte(&mut self) -> Option<u8> {
        (**self).peek_byte()
    }
}

/// In-memory byte source with a cursor.
#[derive(Debug)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl ByteSource for SliceSource<'_> {
    fn next_byte(&mut self) -> Option<u8> {
        let byte = self.data.get(self.pos).copied()?;
        self.pos += 1;
        Some(byte)
    }

    fn peek_byte(&mut self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }
}

/// Byte source over any [`std::io::Read`], holding a single byte of
/// lookahead.
///
/// An I/O error ends the stream; the error itself is kept for the caller
/// to inspect afterwards.
#[derive(Debug)]
pub struct ReadSource<R> {
    inner: R,
    lookahead: Option<u8>,
    error: Option<io::Error>,
}

impl<R: io::Read> ReadSource<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            lookahead: None,
            error: None,
        }
    }

    /// The I/O error that ended the stream, if one did.
    pub fn take_io_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    fn fill(&mut self) -> Option<u8> {
        if self.lookahead.is_none() && self.error.is_none() {
            let mut byte = [0u8; 1];
            loop {
                match self.inner.read(&mut byte) {
                    Ok(0) => break,
                    Ok(_) => {
                        self.lookahead = Some(byte[0]);
                        break;
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        self.error = Some(e);
                        break;
                    }
                }
            }
        }
        self.lookahead
    }
}

impl<R: io::Read> ByteSource for ReadSource<R> {
    fn next_byte(&mut self) -> Option<u8> {
        self.fill();
        self.lookahead.take()
    }

    fn peek_byte(&mut self) -> Option<u8> {
        self.fill()
    }
}

/// Byte source built from a `get`/`peek` function pair and an opaque
/// context value, for plugging the parser into transports that only offer
/// callback-shaped access.
pub struct CallbackSource<C> {
    context: C,
    get: fn(&mut C) -> Option<u8>,
    peek: fn(&mut C) -> Option<u8>,
}

impl<C> CallbackSource<C> {
    pub fn new(context: C, get: fn(&mut C) -> Option<u8>, peek: fn(&mut C) -> Option<u8>) -> Self {
        Self { context, get, peek }
    }

    /// Give the context back, e.g. to close a connection it wraps.
    pub fn into_context(self) -> C {
        self.context
    }
}

impl<C> ByteSource for CallbackSource<C> {
    fn next_byte(&mut self) -> Option<u8> {
        (self.get)(&mut self.context)
    }

    fn peek_byte(&mut self) -> Option<u8> {
        (self.peek)(&mut self.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_source_peek_then_next() {
        let mut src = SliceSource::new(b"ab");
        assert_eq!(src.peek_byte(), Some(b'a'));
        assert_eq!(src.peek_byte(), Some(b'a'));
        assert_eq!(src.next_byte(), Some(b'a'));
        assert_eq!(src.next_byte(), Some(b'b'));
        assert_eq!(src.peek_byte(), None);
        assert_eq!(src.next_byte(), None);
        assert_eq!(src.position(), 2);
    }

    #[test]
    fn read_source_over_io_read() {
        let mut src = ReadSource::new(&b"xy"[..]);
        assert_eq!(src.peek_byte(), Some(b'x'));
        assert_eq!(src.next_byte(), Some(b'x'));
        assert_eq!(src.peek_byte(), Some(b'y'));
        assert_eq!(src.next_byte(), Some(b'y'));
        assert_eq!(src.next_byte(), None);
        assert!(src.take_io_error().is_none());
    }

    #[test]
    fn read_source_latches_io_errors() {
        struct Failing;
        impl io::Read for Failing {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "boom"))
            }
        }
        let mut src = ReadSource::new(Failing);
        assert_eq!(src.next_byte(), None);
        assert_eq!(src.next_byte(), None);
        let err = src.take_io_error().expect("error should be kept");
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[test]
    fn callback_source_drives_context() {
        struct Cursor {
            data: &'static [u8],
            pos: usize,
        }
        fn get(c: &mut Cursor) -> Option<u8> {
            let b = c.data.get(c.pos).copied()?;
            c.pos += 1;
            Some(b)
        }
        fn peek(c: &mut Cursor) -> Option<u8> {
            c.data.get(c.pos).copied()
        }

        let mut src = CallbackSource::new(Cursor { data: b"ok", pos: 0 }, get, peek);
        assert_eq!(src.peek_byte(), Some(b'o'));
        assert_eq!(src.next_byte(), Some(b'o'));
        assert_eq!(src.next_byte(), Some(b'k'));
        assert_eq!(src.next_byte(), None);
        assert_eq!(src.into_context().pos, 2);
    }

    #[test]
    fn mut_reference_is_a_source_too() {
        let mut src = SliceSource::new(b"1");
        let mut by_ref: &mut SliceSource = &mut src;
        assert_eq!(by_ref.next_byte(), Some(b'1'));
        assert_eq!(src.position(), 1);
    }
}
