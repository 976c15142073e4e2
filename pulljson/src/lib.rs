// SPDX-License-Identifier: Apache-2.0

//! An incremental, pull-based JSON tokenizer.
//!
//! The caller drives parsing by repeatedly asking a [`JsonStream`] for the
//! next token; nothing is materialized beyond the token in hand. Input
//! comes from any [`ByteSource`] — an in-memory slice, a buffered reader,
//! or a callback pair wrapping some other transport.
//!
//! ```
//! use pulljson::{Event, JsonStream, SliceSource};
//!
//! let doc = br#"{"main": {"temp": 72.5}}"#;
//! let mut stream = JsonStream::new(SliceSource::new(doc));
//! let mut temp = None;
//! loop {
//!     match stream.next_event().unwrap() {
//!         Event::Number(n) => temp = Some(n),
//!         Event::EndDocument => break,
//!         _ => {}
//!     }
//! }
//! assert_eq!(temp, Some(72.5));
//! ```

mod error;
mod escape;
mod number;
mod source;
mod stream;

pub use error::{ErrorKind, ParseError};
pub use source::{ByteSource, CallbackSource, ReadSource, SliceSource};
pub use stream::{Container, Event, JsonStream, TokenKind, DEFAULT_MAX_DEPTH};
