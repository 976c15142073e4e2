// SPDX-License-Identifier: Apache-2.0

//! URL parsing and query encoding.
//!
//! Only the two shapes the fetcher produces are accepted:
//! `scheme://host:port/path` and `scheme://host/path`. Anything else is
//! rejected outright and the caller fails the whole fetch.

/// A parsed URL. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    scheme: String,
    host: String,
    port: u16,
    path: String,
}

impl Url {
    /// Parse `scheme://host:port/path` or `scheme://host/path`.
    ///
    /// With the port omitted the scheme must be exactly `http` (80) or
    /// `https` (443); other schemes require an explicit port. The path is
    /// mandatory, always starts with `/`, and is copied byte for byte —
    /// no percent-decoding. Embedded whitespace rejects the whole input.
    pub fn parse(text: &str) -> Option<Url> {
        if text.bytes().any(|b| b.is_ascii_whitespace()) {
            return None;
        }

        let (scheme, rest) = text.split_once("://")?;
        if scheme.is_empty() {
            return None;
        }

        let path_at = rest.find('/')?;
        let (authority, path) = rest.split_at(path_at);

        let (host, port) = match authority.split_once(':') {
            Some((host, port_text)) => {
                if port_text.is_empty() || !port_text.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                (host, port_text.parse::<u16>().ok()?)
            }
            None => {
                let port = match scheme {
                    "http" => 80,
                    "https" => 443,
                    _ => return None,
                };
                (authority, port)
            }
        };
        if host.is_empty() {
            return None;
        }

        Some(Url {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl core::fmt::Display for Url {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~')
}

/// Percent-encode every byte outside `[A-Za-z0-9._~-]` as uppercase `%XX`.
///
/// The output length is measured first so the allocation is exact.
pub fn percent_encode(bytes: &[u8]) -> String {
    let encoded_len = bytes
        .iter()
        .map(|&b| if is_unreserved(b) { 1 } else { 3 })
        .sum();
    let mut out = String::with_capacity(encoded_len);
    for &byte in bytes {
        if is_unreserved(byte) {
            out.push(byte as char);
        } else {
            out.push('%');
            out.push(char::from_digit((byte >> 4) as u32, 16).unwrap_or('0').to_ascii_uppercase());
            out.push(char::from_digit((byte & 0xF) as u32, 16).unwrap_or('0').to_ascii_uppercase());
        }
    }
    out
}
