// SPDX-License-Identifier: Apache-2.0

//! The fetch pipeline: build the request URL, connect, drop the response
//! header, and walk the JSON body for the fields we keep.
//!
//! Policy lives with the periodic caller: a failed fetch is reported and
//! simply tried again on the next tick. Nothing here retries.

use std::time::{Duration, Instant};

use log::debug;
use pulljson::{JsonStream, ParseError};

use crate::extract::{extract_report, WeatherReport};
use crate::http::{HttpConnection, HttpError};
use crate::url::{percent_encode, Url};

pub const API_HOST: &str = "api.openweathermap.org";

/// Temperature unit, as requested from the API and shown in titles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    Fahrenheit,
    Celsius,
}

impl Units {
    pub fn suffix(self) -> char {
        match self {
            Units::Fahrenheit => 'F',
            Units::Celsius => 'C',
        }
    }

    /// Value of the `units` query parameter.
    pub fn query_value(self) -> &'static str {
        match self {
            Units::Fahrenheit => "imperial",
            Units::Celsius => "metric",
        }
    }
}

/// Everything the fetcher needs to know, threaded through explicitly.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub zipcode: String,
    pub units: Units,
    pub interval: Duration,
    /// https toward the API; turn off only for debugging proxies.
    pub secure: bool,
    /// User-Agent header value.
    pub agent: String,
}

impl AppConfig {
    pub fn new(api_key: &str, zipcode: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            zipcode: zipcode.to_string(),
            units: Units::Fahrenheit,
            interval: Duration::from_secs(60 * 30),
            secure: true,
            agent: env!("CARGO_PKG_NAME").to_string(),
        }
    }

    /// The current-weather request URL, query values percent-encoded.
    pub fn request_url(&self) -> String {
        format!(
            "{}://{}/data/2.5/weather?zip={}&appid={}&units={}&mode=json",
            if self.secure { "https" } else { "http" },
            API_HOST,
            percent_encode(self.zipcode.as_bytes()),
            percent_encode(self.api_key.as_bytes()),
            self.units.query_value(),
        )
    }
}

/// Mutable fetch-cycle state, threaded through instead of living in
/// globals.
#[derive(Debug, Default)]
pub struct AppState {
    pub report: Option<WeatherReport>,
    pub last_check: Option<Instant>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long until the next check is due. Zero when never checked.
    pub fn sleep_for(&self, interval: Duration) -> Duration {
        match self.last_check {
            None => Duration::ZERO,
            Some(at) => interval.saturating_sub(at.elapsed()),
        }
    }
}

/// Why a fetch cycle produced nothing.
#[derive(Debug)]
pub enum FetchError {
    /// The constructed request URL did not parse; configuration problem.
    BadUrl(String),
    Http(HttpError),
    Parse(ParseError),
}

impl core::fmt::Display for FetchError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FetchError::BadUrl(url) => write!(f, "unusable request url {url:?}"),
            FetchError::Http(e) => write!(f, "{e}"),
            FetchError::Parse(e) => write!(f, "failed reading API response: {e}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<HttpError> for FetchError {
    fn from(err: HttpError) -> Self {
        FetchError::Http(err)
    }
}

/// Run one fetch cycle and update `state`.
///
/// Transport failures before the body leave any previous report in
/// place. Once the header has been skipped the parse is committed: a
/// malformed body replaces the report with the sentinel conditions.
pub fn fetch_weather(config: &AppConfig, state: &mut AppState) -> Result<(), FetchError> {
    state.last_check = Some(Instant::now());

    let url_text = config.request_url();
    let url = Url::parse(&url_text).ok_or(FetchError::BadUrl(url_text))?;
    debug!("checking weather at {url}");

    let mut conn = HttpConnection::connect(url, &config.agent)?;
    conn.skip_header()?;

    match extract_report(&mut JsonStream::new(&mut conn)) {
        Ok(report) => {
            debug!(
                "current conditions: {:?} temp {} id {}",
                report.conditions, report.temp, report.weather_id
            );
            conn.close();
            state.report = Some(report);
            Ok(())
        }
        Err(parse_err) => {
            // A transport failure mid-body surfaces as a truncated parse;
            // prefer reporting the transport error when one was stashed.
            let err = match conn.take_error() {
                Some(http_err) => FetchError::Http(http_err),
                None => FetchError::Parse(parse_err),
            };
            conn.close();
            state.report = Some(WeatherReport::default());
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::PARSE_FAILED_CONDITIONS;

    #[test]
    fn request_url_matches_the_api_contract() {
        let config = AppConfig::new("deadbeef", "02134");
        assert_eq!(
            config.request_url(),
            "https://api.openweathermap.org/data/2.5/weather?zip=02134&appid=deadbeef&units=imperial&mode=json"
        );
        assert!(Url::parse(&config.request_url()).is_some());
    }

    #[test]
    fn request_url_encodes_query_values() {
        let mut config = AppConfig::new("key&extra=1", "SW1A 1AA");
        config.units = Units::Celsius;
        config.secure = false;
        assert_eq!(
            config.request_url(),
            "http://api.openweathermap.org/data/2.5/weather?zip=SW1A%201AA&appid=key%26extra%3D1&units=metric&mode=json"
        );
    }

    #[test]
    fn units_map_to_api_and_suffix() {
        assert_eq!(Units::Fahrenheit.query_value(), "imperial");
        assert_eq!(Units::Celsius.query_value(), "metric");
        assert_eq!(Units::Fahrenheit.suffix(), 'F');
        assert_eq!(Units::Celsius.suffix(), 'C');
    }

    #[test]
    fn fresh_state_is_due_immediately() {
        let state = AppState::new();
        assert_eq!(state.sleep_for(Duration::from_secs(1800)), Duration::ZERO);
    }

    #[test]
    fn checked_state_sleeps_out_the_interval() {
        let mut state = AppState::new();
        state.last_check = Some(Instant::now());
        let remaining = state.sleep_for(Duration::from_secs(1800));
        assert!(remaining > Duration::from_secs(1790));
        assert!(remaining <= Duration::from_secs(1800));
    }

    #[test]
    fn sentinel_report_reads_as_failure() {
        let report = WeatherReport::default();
        assert_eq!(
            report.title(Units::Fahrenheit),
            format!("{PARSE_FAILED_CONDITIONS}, 0°F")
        );
    }
}
