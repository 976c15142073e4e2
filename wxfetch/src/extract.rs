// SPDX-License-Identifier: Apache-2.0

//! Single-pass extraction of the handful of weather fields we care about.
//!
//! The walker recognizes `weather[].id`, `weather[].description`,
//! `weather[].icon` and `main.temp` by key, and ignores everything else in
//! place — additional API fields never require changes here. Keys and
//! string values arrive uniformly as string tokens, which is exactly what
//! the transition table leans on.

use log::trace;
use pulljson::{ByteSource, Event, JsonStream, ParseError};

use crate::client::Units;

/// Conditions text shown when the response could not be parsed.
pub const PARSE_FAILED_CONDITIONS: &str = "(Failed to parse API response)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Begin,
    InWeather,
    InWeatherId,
    InWeatherDesc,
    InWeatherIcon,
    InMain,
    InMainTemp,
}

/// The scalars pulled out of one API response.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub conditions: String,
    pub temp: f64,
    pub weather_id: i32,
    pub night: bool,
}

impl Default for WeatherReport {
    fn default() -> Self {
        Self {
            conditions: PARSE_FAILED_CONDITIONS.to_string(),
            temp: 0.0,
            weather_id: 0,
            night: false,
        }
    }
}

impl WeatherReport {
    pub fn icon(&self) -> Icon {
        icon_for(self.weather_id, self.night)
    }

    /// Window-title style summary, integer degrees: `Clear sky, 72°F`.
    pub fn title(&self, units: Units) -> String {
        format!("{}, {}°{}", self.conditions, self.temp as i32, units.suffix())
    }
}

/// Walk the token stream to the end of the document, filling a report.
///
/// A parse error fails the whole pass; fields captured before the error
/// are discarded by the caller in favor of the sentinel conditions.
pub fn extract_report<S: ByteSource>(
    stream: &mut JsonStream<S>,
) -> Result<WeatherReport, ParseError> {
    let mut report = WeatherReport::default();
    let mut state = State::Begin;
    loop {
        let event = stream.next_event()?;
        if event == Event::EndDocument {
            return Ok(report);
        }
        trace!("[{state:?}] {event:?}");
        state = step(state, &event, &mut report);
    }
}

fn step(state: State, event: &Event<'_>, report: &mut WeatherReport) -> State {
    match state {
        State::Begin => match event {
            Event::String("weather") => State::InWeather,
            Event::String("main") => State::InMain,
            _ => State::Begin,
        },
        State::InWeather => match event {
            Event::String("id") => State::InWeatherId,
            Event::String("description") => State::InWeatherDesc,
            Event::String("icon") => State::InWeatherIcon,
            Event::ObjectEnd => State::Begin,
            _ => State::InWeather,
        },
        State::InWeatherId => {
            if let Event::Number(n) = event {
                report.weather_id = *n as i32;
            }
            State::InWeather
        }
        State::InWeatherDesc => {
            if let Event::String(s) = event {
                report.conditions = capitalize(s);
            }
            State::InWeather
        }
        State::InWeatherIcon => {
            if let Event::String(s) = event {
                // "13d" or "04n"
                report.night = s.as_bytes().get(2) == Some(&b'n');
            }
            State::InWeather
        }
        State::InMain => match event {
            Event::String("temp") => State::InMainTemp,
            _ => State::InMain,
        },
        State::InMainTemp => {
            if let Event::Number(n) = event {
                report.temp = *n;
            }
            State::InMain
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Icon bucket for a weather condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    Sun,
    Clouds,
    Moon,
    Rain,
    Snow,
}

impl Icon {
    pub fn name(&self) -> &'static str {
        match self {
            Icon::Sun => "sun",
            Icon::Clouds => "clouds",
            Icon::Moon => "moon",
            Icon::Rain => "rain",
            Icon::Snow => "snow",
        }
    }
}

/// Map an openweathermap condition code to an icon.
///
/// <https://openweathermap.org/weather-conditions>: 2xx/3xx
/// (thunder/drizzle) and 5xx (rain) share the rain icon, 6xx is snow,
/// 801–804 is clouds, everything else is clear — sun by day, moon by
/// night.
pub fn icon_for(weather_id: i32, night: bool) -> Icon {
    match weather_id {
        200..=399 | 500..=599 => Icon::Rain,
        600..=699 => Icon::Snow,
        801..=804 => Icon::Clouds,
        _ if night => Icon::Moon,
        _ => Icon::Sun,
    }
}
