// SPDX-License-Identifier: Apache-2.0

//! Fetch current weather over a hand-rolled HTTP(S) client and pull the
//! few fields worth showing out of the response stream.
//!
//! The pipeline is deliberately incremental end to end: the response body
//! is never buffered whole. Bytes flow from the socket through
//! [`HttpConnection`]'s fixed chunk buffer into a
//! [`pulljson::JsonStream`], and the extraction state machine keeps only
//! three scalars. See [`client::fetch_weather`] for the assembled loop
//! body.

pub mod client;
pub mod extract;
pub mod http;
pub mod url;

pub use client::{fetch_weather, AppConfig, AppState, FetchError, Units};
pub use extract::{extract_report, icon_for, Icon, WeatherReport, PARSE_FAILED_CONDITIONS};
pub use http::{HttpConnection, HttpError, NetStream, PollRead, ReadStatus, CHUNK_CAPACITY};
pub use url::{percent_encode, Url};
