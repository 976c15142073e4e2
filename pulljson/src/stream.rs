// SPDX-License-Identifier: Apache-2.0

//! The pull parser itself.
//!
//! [`JsonStream`] wraps a [`ByteSource`] and hands out one token per call
//! to [`JsonStream::next_event`]. Structural correctness is enforced with
//! an explicit stack of container frames; string and number content is
//! accumulated in a growable scratch buffer that each new token reuses.
//! The parser performs no I/O scheduling of its own — it blocks exactly as
//! much as its source does.

use log::trace;

use crate::error::{ErrorKind, ParseError};
use crate::escape;
use crate::number::{NumberScanner, Step};
use crate::source::ByteSource;

/// Default bound on container nesting.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Container kind on the nesting stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    container: Container,
    /// Completed values in this container (keys are not counted).
    count: usize,
}

/// Kind of a token, without its payload. Returned by [`JsonStream::peek`]
/// and accepted by [`JsonStream::skip_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    ObjectStart,
    ObjectEnd,
    ArrayStart,
    ArrayEnd,
    String,
    Number,
    True,
    False,
    Null,
    EndDocument,
}

/// One parsed token. String payloads borrow the stream's scratch buffer
/// and are valid until the next call that advances the stream.
///
/// Object keys are reported as ordinary [`Event::String`] tokens; the
/// colon discipline is still enforced structurally. Consumers that walk
/// key/value sequences rely on this uniformity.
#[derive(Debug, PartialEq)]
pub enum Event<'a> {
    ObjectStart,
    ObjectEnd,
    ArrayStart,
    ArrayEnd,
    String(&'a str),
    Number(f64),
    Bool(bool),
    Null,
    EndDocument,
}

/// What the grammar allows at the current point between tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    RootValue,
    ObjectKeyOrClose,
    ObjectKey,
    ObjectColon,
    ObjectValue,
    ObjectCommaOrClose,
    ArrayItemOrClose,
    ArrayItem,
    ArrayCommaOrClose,
    RootDone,
}

/// Incremental pull parser over a [`ByteSource`].
///
/// ```
/// use pulljson::{Event, JsonStream, SliceSource};
///
/// let mut stream = JsonStream::new(SliceSource::new(br#"{"temp": 72.5}"#));
/// assert_eq!(stream.next_event().unwrap(), Event::ObjectStart);
/// assert_eq!(stream.next_event().unwrap(), Event::String("temp"));
/// assert_eq!(stream.next_event().unwrap(), Event::Number(72.5));
/// assert_eq!(stream.next_event().unwrap(), Event::ObjectEnd);
/// assert_eq!(stream.next_event().unwrap(), Event::EndDocument);
/// ```
pub struct JsonStream<S> {
    source: S,
    line: usize,
    stack: Vec<Frame>,
    max_depth: usize,
    expect: Expect,
    /// Decoded string bytes or raw number text of the current token.
    scratch: Vec<u8>,
    number: f64,
    /// Token scanned ahead by [`JsonStream::peek`], not yet delivered.
    pending: Option<TokenKind>,
    streaming: bool,
    finished: bool,
    tokens: usize,
    error: Option<ParseError>,
}

impl<S: ByteSource> JsonStream<S> {
    pub fn new(source: S) -> Self {
        Self::with_max_depth(source, DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(source: S, max_depth: usize) -> Self {
        Self {
            source,
            line: 1,
            stack: Vec::new(),
            max_depth,
            expect: Expect::RootValue,
            scratch: Vec::new(),
            number: 0.0,
            pending: None,
            streaming: false,
            finished: false,
            tokens: 0,
            error: None,
        }
    }

    /// In streaming mode a source may carry several top-level values;
    /// `EndDocument` is reported after each one and [`JsonStream::reset`]
    /// re-arms the parser for the next, instead of trailing content being
    /// an error.
    pub fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }

    /// Re-arm after a clean `EndDocument` so the next value in the source
    /// can be parsed. Has no effect on a latched error.
    pub fn reset(&mut self) {
        if self.error.is_some() {
            return;
        }
        self.expect = Expect::RootValue;
        self.finished = false;
        self.pending = None;
        self.tokens = 0;
        self.stack.clear();
        self.scratch.clear();
    }

    /// 1-based line number of the current position.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Current container nesting depth.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Innermost container and how many values it holds so far.
    pub fn context(&self) -> Option<(Container, usize)> {
        self.stack.last().map(|f| (f.container, f.count))
    }

    /// Tokens produced for the current document.
    pub fn tokens_seen(&self) -> usize {
        self.tokens
    }

    /// The latched error, if parsing has failed.
    pub fn error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Next token with payload. After an error this keeps returning the
    /// same error without reading further; after `EndDocument` it keeps
    /// returning `EndDocument` until [`JsonStream::reset`].
    pub fn next_event(&mut self) -> Result<Event<'_>, ParseError> {
        let kind = self.next_kind()?;
        Ok(self.event_for(kind))
    }

    /// Iterator-style variant: `None` once the document has ended.
    pub fn next(&mut self) -> Option<Result<Event<'_>, ParseError>> {
        match self.next_event() {
            Ok(Event::EndDocument) => None,
            other => Some(other),
        }
    }

    /// Kind of the next token without consuming it. The token (and its
    /// payload) is held back and delivered by the following
    /// [`JsonStream::next_event`].
    pub fn peek(&mut self) -> Result<TokenKind, ParseError> {
        if let Some(kind) = self.pending {
            return Ok(kind);
        }
        let kind = self.next_kind()?;
        self.pending = Some(kind);
        Ok(kind)
    }

    /// Consume the next value wholesale. Scalars are skipped as one token;
    /// a container is consumed through its matching close. Returns the
    /// last token consumed.
    pub fn skip(&mut self) -> Result<TokenKind, ParseError> {
        let kind = self.next_kind()?;
        let enclosing = match kind {
            TokenKind::ObjectStart | TokenKind::ArrayStart => self.stack.len() - 1,
            _ => return Ok(kind),
        };
        loop {
            let kind = self.next_kind()?;
            match kind {
                TokenKind::ObjectEnd | TokenKind::ArrayEnd if self.stack.len() == enclosing => {
                    return Ok(kind);
                }
                TokenKind::EndDocument => return Ok(kind),
                _ => {}
            }
        }
    }

    /// Drain tokens until `kind` (or `EndDocument`) is produced; returns
    /// the token that stopped the drain.
    pub fn skip_until(&mut self, kind: TokenKind) -> Result<TokenKind, ParseError> {
        loop {
            let seen = self.next_kind()?;
            if seen == kind || seen == TokenKind::EndDocument {
                return Ok(seen);
            }
        }
    }

    fn next_kind(&mut self) -> Result<TokenKind, ParseError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        if let Some(kind) = self.pending.take() {
            return Ok(kind);
        }
        if self.finished {
            return Ok(TokenKind::EndDocument);
        }
        if self.expect == Expect::RootDone && self.streaming {
            // The next byte belongs to the following document; leave it.
            self.finished = true;
            return Ok(TokenKind::EndDocument);
        }
        match self.advance() {
            Ok(kind) => {
                if kind != TokenKind::EndDocument {
                    self.tokens += 1;
                }
                Ok(kind)
            }
            Err(err) => {
                trace!("latched parse error: {err}");
                self.error = Some(err.clone());
                Err(err)
            }
        }
    }

    fn advance(&mut self) -> Result<TokenKind, ParseError> {
        loop {
            let byte = match self.next_content_byte() {
                Some(b) => b,
                None => return self.at_end_of_input(),
            };
            match self.expect {
                Expect::RootValue => return self.begin_value(byte),
                Expect::RootDone => return self.fail(ErrorKind::TrailingContent, Some(byte)),
                Expect::ObjectKeyOrClose | Expect::ObjectKey => match byte {
                    b'"' => {
                        self.lex_string()?;
                        self.expect = Expect::ObjectColon;
                        return Ok(TokenKind::String);
                    }
                    b'}' if self.expect == Expect::ObjectKeyOrClose => {
                        return self.close_container(TokenKind::ObjectEnd);
                    }
                    b'}' => return self.fail(ErrorKind::TrailingComma, Some(byte)),
                    _ => return self.fail(ErrorKind::ExpectedObjectKey, Some(byte)),
                },
                Expect::ObjectColon => match byte {
                    b':' => self.expect = Expect::ObjectValue,
                    _ => return self.fail(ErrorKind::ExpectedColon, Some(byte)),
                },
                Expect::ObjectValue => return self.begin_value(byte),
                Expect::ObjectCommaOrClose => match byte {
                    b',' => self.expect = Expect::ObjectKey,
                    b'}' => return self.close_container(TokenKind::ObjectEnd),
                    _ => return self.fail(ErrorKind::ExpectedComma, Some(byte)),
                },
                Expect::ArrayItemOrClose => match byte {
                    b']' => return self.close_container(TokenKind::ArrayEnd),
                    _ => return self.begin_value(byte),
                },
                Expect::ArrayItem => match byte {
                    b']' => return self.fail(ErrorKind::TrailingComma, Some(byte)),
                    _ => return self.begin_value(byte),
                },
                Expect::ArrayCommaOrClose => match byte {
                    b',' => self.expect = Expect::ArrayItem,
                    b']' => return self.close_container(TokenKind::ArrayEnd),
                    _ => return self.fail(ErrorKind::ExpectedComma, Some(byte)),
                },
            }
        }
    }

    fn begin_value(&mut self, byte: u8) -> Result<TokenKind, ParseError> {
        match byte {
            b'{' => {
                self.push_frame(Container::Object)?;
                self.expect = Expect::ObjectKeyOrClose;
                Ok(TokenKind::ObjectStart)
            }
            b'[' => {
                self.push_frame(Container::Array)?;
                self.expect = Expect::ArrayItemOrClose;
                Ok(TokenKind::ArrayStart)
            }
            b'"' => {
                self.lex_string()?;
                self.value_done();
                Ok(TokenKind::String)
            }
            b't' => {
                self.lex_literal(b"true")?;
                self.value_done();
                Ok(TokenKind::True)
            }
            b'f' => {
                self.lex_literal(b"false")?;
                self.value_done();
                Ok(TokenKind::False)
            }
            b'n' => {
                self.lex_literal(b"null")?;
                self.value_done();
                Ok(TokenKind::Null)
            }
            b'-' | b'0'..=b'9' => {
                self.lex_number(byte)?;
                self.value_done();
                Ok(TokenKind::Number)
            }
            _ => self.fail(ErrorKind::UnexpectedByte, Some(byte)),
        }
    }

    fn push_frame(&mut self, container: Container) -> Result<(), ParseError> {
        if self.stack.len() >= self.max_depth {
            return self.fail(ErrorKind::MaxDepthExceeded, None);
        }
        self.stack.push(Frame {
            container,
            count: 0,
        });
        Ok(())
    }

    fn close_container(&mut self, kind: TokenKind) -> Result<TokenKind, ParseError> {
        self.stack.pop();
        self.value_done();
        Ok(kind)
    }

    /// A complete value was produced: bump the enclosing frame's count and
    /// decide what the grammar wants next.
    fn value_done(&mut self) {
        match self.stack.last_mut() {
            None => self.expect = Expect::RootDone,
            Some(frame) => {
                frame.count += 1;
                self.expect = match frame.container {
                    Container::Object => Expect::ObjectCommaOrClose,
                    Container::Array => Expect::ArrayCommaOrClose,
                };
            }
        }
    }

    fn at_end_of_input(&mut self) -> Result<TokenKind, ParseError> {
        match self.expect {
            Expect::RootDone => {
                self.finished = true;
                Ok(TokenKind::EndDocument)
            }
            // A streaming source that runs dry between documents is done,
            // not broken.
            Expect::RootValue if self.streaming && self.tokens == 0 => {
                self.finished = true;
                Ok(TokenKind::EndDocument)
            }
            _ => self.fail(ErrorKind::UnexpectedEof, None),
        }
    }

    /// Next byte that is not JSON whitespace, counting lines.
    fn next_content_byte(&mut self) -> Option<u8> {
        loop {
            match self.source.next_byte()? {
                b'\n' => self.line += 1,
                b' ' | b'\t' | b'\r' => {}
                byte => return Some(byte),
            }
        }
    }

    fn lex_string(&mut self) -> Result<(), ParseError> {
        self.scratch.clear();
        let mut pending_high: Option<u16> = None;
        loop {
            let byte = match self.source.next_byte() {
                Some(b) => b,
                None => return self.fail(ErrorKind::UnexpectedEof, None),
            };
            match byte {
                b'"' => {
                    if pending_high.is_some() {
                        return self.fail(ErrorKind::InvalidUnicodeCodepoint, Some(byte));
                    }
                    if std::str::from_utf8(&self.scratch).is_err() {
                        return self.fail(ErrorKind::InvalidUtf8, None);
                    }
                    return Ok(());
                }
                b'\\' => self.lex_escape(&mut pending_high)?,
                0x00..=0x1F => {
                    return self.fail(ErrorKind::UnescapedControlCharacter, Some(byte));
                }
                _ => {
                    if pending_high.is_some() {
                        return self.fail(ErrorKind::InvalidUnicodeCodepoint, Some(byte));
                    }
                    self.scratch.push(byte);
                }
            }
        }
    }

    fn lex_escape(&mut self, pending_high: &mut Option<u16>) -> Result<(), ParseError> {
        let escape = match self.source.next_byte() {
            Some(b) => b,
            None => return self.fail(ErrorKind::UnexpectedEof, None),
        };
        if escape != b'u' {
            // A high surrogate must be followed by a \u escape.
            if pending_high.is_some() {
                return self.fail(ErrorKind::InvalidUnicodeCodepoint, Some(escape));
            }
            return match escape::decode_simple(escape) {
                Some(raw) => {
                    self.scratch.push(raw);
                    Ok(())
                }
                None => self.fail(ErrorKind::InvalidStringEscape, Some(escape)),
            };
        }

        let mut unit: u16 = 0;
        for _ in 0..4 {
            let digit = match self.source.next_byte() {
                Some(b) => b,
                None => return self.fail(ErrorKind::UnexpectedEof, None),
            };
            match escape::hex_value(digit) {
                Some(v) => unit = (unit << 4) | v,
                None => return self.fail(ErrorKind::InvalidUnicodeHex, Some(digit)),
            }
        }

        if let Some(high) = pending_high.take() {
            if !escape::is_low_surrogate(unit) {
                return self.fail(ErrorKind::InvalidUnicodeCodepoint, None);
            }
            let codepoint = escape::combine_surrogates(high, unit);
            match char::from_u32(codepoint) {
                Some(ch) => self.push_char(ch),
                None => return self.fail(ErrorKind::InvalidUnicodeCodepoint, None),
            }
        } else if escape::is_high_surrogate(unit) {
            *pending_high = Some(unit);
        } else if escape::is_low_surrogate(unit) {
            return self.fail(ErrorKind::InvalidUnicodeCodepoint, None);
        } else {
            match char::from_u32(unit as u32) {
                Some(ch) => self.push_char(ch),
                None => return self.fail(ErrorKind::InvalidUnicodeCodepoint, None),
            }
        }
        Ok(())
    }

    fn push_char(&mut self, ch: char) {
        let mut buf = [0u8; 4];
        self.scratch
            .extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
    }

    fn lex_number(&mut self, first: u8) -> Result<(), ParseError> {
        self.scratch.clear();
        self.scratch.push(first);
        let mut scanner = match NumberScanner::begin(first) {
            Some(s) => s,
            None => return self.fail(ErrorKind::InvalidNumber, Some(first)),
        };
        // Consume greedily, leaving the delimiter for the next token.
        while let Some(byte) = self.source.peek_byte() {
            match scanner.accept(byte) {
                Step::Consume => {
                    self.source.next_byte();
                    self.scratch.push(byte);
                }
                Step::Stop => {
                    if !matches!(byte, b' ' | b'\t' | b'\r' | b'\n' | b',' | b']' | b'}') {
                        return self.fail(ErrorKind::InvalidNumber, Some(byte));
                    }
                    break;
                }
            }
        }
        if !scanner.is_complete() {
            return self.fail(ErrorKind::InvalidNumber, None);
        }
        let text = std::str::from_utf8(&self.scratch).unwrap_or_default();
        match text.parse::<f64>() {
            Ok(value) => {
                self.number = value;
                Ok(())
            }
            Err(_) => self.fail(ErrorKind::InvalidNumber, None),
        }
    }

    fn lex_literal(&mut self, text: &'static [u8]) -> Result<(), ParseError> {
        // The first byte was consumed by the dispatcher and already matched.
        for &expected in &text[1..] {
            match self.source.next_byte() {
                Some(b) if b == expected => {}
                Some(b) => return self.fail(ErrorKind::InvalidLiteral, Some(b)),
                None => return self.fail(ErrorKind::UnexpectedEof, None),
            }
        }
        if let Some(byte) = self.source.peek_byte() {
            if byte.is_ascii_alphanumeric() {
                return self.fail(ErrorKind::InvalidLiteral, Some(byte));
            }
        }
        Ok(())
    }

    fn event_for(&self, kind: TokenKind) -> Event<'_> {
        match kind {
            TokenKind::ObjectStart => Event::ObjectStart,
            TokenKind::ObjectEnd => Event::ObjectEnd,
            TokenKind::ArrayStart => Event::ArrayStart,
            TokenKind::ArrayEnd => Event::ArrayEnd,
            TokenKind::String => Event::String(self.scratch_str()),
            TokenKind::Number => Event::Number(self.number),
            TokenKind::True => Event::Bool(true),
            TokenKind::False => Event::Bool(false),
            TokenKind::Null => Event::Null,
            TokenKind::EndDocument => Event::EndDocument,
        }
    }

    fn scratch_str(&self) -> &str {
        // Validated when the string token was lexed.
        std::str::from_utf8(&self.scratch).unwrap_or_default()
    }

    fn fail<T>(&self, kind: ErrorKind, byte: Option<u8>) -> Result<T, ParseError> {
        Err(ParseError::new(kind, byte, self.line))
    }
}
