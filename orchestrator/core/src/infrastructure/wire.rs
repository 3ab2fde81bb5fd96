// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Line-Oriented Wire Protocol
//!
//! A minimal GET-style text protocol over plain TCP, loosely modelled on HTTP/1.0:
//!
//! ```text
//! COMMAND /path?k1=v1&k2=v2 HTTP/1.1
//! Host: localhost:1565
//!
//! ```
//!
//! Requests are read as a blank-line-terminated header block. Responses carry a status line,
//! `Content-Length`, `Content-Type`, `Connection: close`, an optional `Location`, a blank line
//! and exactly `Content-Length` bytes of body.
//!
//! Query strings are split on `&` and `=` first and each name and value is percent-decoded
//! afterwards, so encoded values may themselves contain `&` and `=`. Agent contents travel as a
//! single parameter whose value is an encoded query string ([`encode_pairs`] / [`Params::nested`]).

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::HashMap;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};

use crate::domain::address::Address;
use crate::domain::error::{FleetError, FleetResult};

pub const CRLF: &str = "\r\n";

/// Upper bound on a request or response header block.
pub const MAX_HEAD_BYTES: u64 = 64 * 1024;

/// Characters left unescaped in names and values.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b':');

#[derive(Debug, Error)]
pub enum WireError {
    #[error("connection closed before a request line was received")]
    Empty,

    #[error("header block exceeds {MAX_HEAD_BYTES} bytes")]
    HeadTooLarge,

    #[error("malformed status line: '{0}'")]
    MalformedStatusLine(String),

    #[error("invalid Content-Length: '{0}'")]
    InvalidContentLength(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT).to_string()
}

pub fn decode_component(s: &str) -> String {
    let spaced = s.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Encode `name=value` pairs joined with `&`.
pub fn encode_pairs<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Encode a map with keys sorted, so identical contents always produce identical text.
pub fn encode_map(map: &HashMap<String, String>) -> String {
    let mut entries: Vec<(&str, &str)> = map.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    entries.sort();
    encode_pairs(entries)
}

/// Decoded query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(HashMap<String, String>);

impl Params {
    /// Parse a raw query string. Tokens without `=` or with an empty name are skipped; a
    /// repeated name keeps its last value.
    pub fn parse(query: &str) -> Self {
        let mut map = HashMap::new();
        for token in query.split('&') {
            let Some((name, value)) = token.split_once('=') else {
                continue;
            };
            let name = decode_component(name);
            if name.is_empty() {
                continue;
            }
            map.insert(name, decode_component(value));
        }
        Self(map)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn require(&self, name: &str) -> FleetResult<&str> {
        match self.get(name) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(FleetError::missing(name)),
        }
    }

    pub fn require_address(&self, name: &str) -> FleetResult<Address> {
        self.require(name)?
            .parse()
            .map_err(|e| FleetError::bad_request(format!("parameter '{}': {}", name, e)))
    }

    pub fn require_u64(&self, name: &str) -> FleetResult<u64> {
        let raw = self.require(name)?;
        raw.parse()
            .map_err(|_| FleetError::bad_request(format!("parameter '{}' is not a number: '{}'", name, raw)))
    }

    /// Decode a parameter that itself holds an encoded query string. Absent means empty.
    pub fn nested(&self, name: &str) -> HashMap<String, String> {
        self.get(name).map(|v| Params::parse(v).0).unwrap_or_default()
    }
}

/// A decoded request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: String,
    pub path: String,
    /// Query exactly as received (still encoded); zombies pass it on verbatim.
    pub query: Option<String>,
    pub params: Params,
    /// Value of the `Host:` header, the only header ever consulted.
    pub host: Option<String>,
}

impl Request {
    /// Build an outgoing request. `query` must already be encoded.
    pub fn new(command: impl Into<String>, query: impl Into<String>) -> Self {
        let query = query.into();
        let params = Params::parse(&query);
        Self {
            command: command.into(),
            path: "/".to_string(),
            query: (!query.is_empty()).then_some(query),
            params,
            host: None,
        }
    }

    pub fn with_host(mut self, host: &Address) -> Self {
        self.host = Some(host.to_string());
        self
    }

    /// Decode a request head from its lines (request line first, header lines after).
    pub fn parse_head(lines: &[String]) -> Result<Self, WireError> {
        let first = lines.first().map(|l| l.trim()).unwrap_or_default();
        let mut tokens = first.split_whitespace();
        let Some(command_token) = tokens.next() else {
            return Err(WireError::Empty);
        };

        // The query may be glued to the command token (`RegisterHostServer?server=..`).
        let (command, mut target) = match command_token.split_once('?') {
            Some((cmd, q)) => (cmd.to_string(), format!("/?{}", q)),
            None => (command_token.to_string(), "/".to_string()),
        };
        if let Some(t) = tokens.next() {
            if !t.starts_with("HTTP/") {
                target = t.to_string();
            }
        }

        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (target, None),
        };
        let path = if path.is_empty() { "/".to_string() } else { path };
        let params = query.as_deref().map(Params::parse).unwrap_or_default();

        let host = lines.iter().skip(1).find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("host")
                .then(|| value.trim().to_string())
        });

        Ok(Self {
            command,
            path,
            query: query.filter(|q| !q.is_empty()),
            params,
            host,
        })
    }

    pub fn is_command(&self, command: &str) -> bool {
        self.command.eq_ignore_ascii_case(command)
    }

    pub fn is_favicon(&self) -> bool {
        self.path.contains("favicon.ico")
    }

    /// Host part of the `Host:` header, if one was sent.
    pub fn host_name(&self) -> Option<&str> {
        let host = self.host.as_deref()?;
        let name = host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host);
        (!name.is_empty()).then_some(name)
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.command);
        out.push(' ');
        out.push_str(&self.path);
        if let Some(q) = &self.query {
            out.push('?');
            out.push_str(q);
        }
        out.push_str(" HTTP/1.1");
        out.push_str(CRLF);
        if let Some(host) = &self.host {
            out.push_str("Host: ");
            out.push_str(host);
            out.push_str(CRLF);
        }
        out.push_str(CRLF);
        out
    }
}

/// Read lines up to and including the blank separator line (or EOF).
async fn read_head<R>(reader: &mut R) -> Result<Vec<String>, WireError>
where
    R: AsyncBufRead + Unpin,
{
    let mut limited = reader.take(MAX_HEAD_BYTES);
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        let n = limited.read_line(&mut line).await?;
        if n == 0 {
            if limited.limit() == 0 {
                return Err(WireError::HeadTooLarge);
            }
            break;
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            if lines.is_empty() {
                // Tolerate stray blank lines before the request line.
                continue;
            }
            break;
        }
        lines.push(trimmed.to_string());
    }
    Ok(lines)
}

pub async fn read_request<R>(reader: &mut R) -> Result<Request, WireError>
where
    R: AsyncBufRead + Unpin,
{
    let lines = read_head(reader).await?;
    if lines.is_empty() {
        return Err(WireError::Empty);
    }
    Request::parse_head(&lines)
}

/// An encoded or decoded response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: String,
    pub location: Option<String>,
    pub body: String,
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Response",
        302 => "Found",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

impl Response {
    /// Plain-text body, used for machine-to-machine replies.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "text/plain".to_string(),
            location: None,
            body: body.into(),
        }
    }

    pub fn html(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/html".to_string(),
            location: None,
            body: body.into(),
        }
    }

    pub fn redirect(location: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status: 302,
            content_type: "text/html".to_string(),
            location: Some(location.into()),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        self.status == 302 && self.location.is_some()
    }

    /// Address the `Location` header points at.
    pub fn location_address(&self) -> Option<Address> {
        let location = self.location.as_deref()?;
        let rest = location.strip_prefix("http://").unwrap_or(location);
        let authority = rest.split(['/', '?']).next()?;
        authority.parse().ok()
    }

    pub fn encode(&self) -> String {
        let mut out = format!("HTTP/1.1 {} {}{}", self.status, reason_phrase(self.status), CRLF);
        out.push_str(&format!("Content-Length: {}{}", self.body.len(), CRLF));
        out.push_str(&format!("Content-Type: {}{}", self.content_type, CRLF));
        if let Some(location) = &self.location {
            out.push_str(&format!("Location: {}{}", location, CRLF));
        }
        out.push_str("Connection: close");
        out.push_str(CRLF);
        out.push_str(CRLF);
        out.push_str(&self.body);
        out
    }
}

pub async fn read_response<R>(reader: &mut R) -> Result<Response, WireError>
where
    R: AsyncBufRead + AsyncRead + Unpin,
{
    let lines = read_head(reader).await?;
    let status_line = lines.first().ok_or(WireError::Empty)?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| WireError::MalformedStatusLine(status_line.clone()))?;

    let mut content_length = None;
    let mut content_type = "text/plain".to_string();
    let mut location = None;
    for line in lines.iter().skip(1) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "content-length" => {
                let len = value
                    .parse::<usize>()
                    .map_err(|_| WireError::InvalidContentLength(value.to_string()))?;
                content_length = Some(len);
            }
            "content-type" => content_type = value.to_string(),
            "location" => location = Some(value.to_string()),
            _ => {}
        }
    }

    let body = match content_length {
        Some(len) => {
            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf).await?;
            buf
        }
        None => {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).await?;
            buf
        }
    };

    Ok(Response {
        status,
        content_type,
        location,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_browser_get() {
        let req = Request::parse_head(&lines(&[
            "GET /?input=color&value=dark+blue HTTP/1.1",
            "Host: localhost:3001",
            "User-Agent: test",
        ]))
        .unwrap();
        assert!(req.is_command("get"));
        assert_eq!(req.path, "/");
        assert_eq!(req.params.get("input"), Some("color"));
        assert_eq!(req.params.get("value"), Some("dark blue"));
        assert_eq!(req.host.as_deref(), Some("localhost:3001"));
        assert_eq!(req.host_name(), Some("localhost"));
    }

    #[test]
    fn test_parse_query_glued_to_command() {
        let req = Request::parse_head(&lines(&["RegisterHostServer?server=localhost:1565"])).unwrap();
        assert_eq!(req.command, "RegisterHostServer");
        assert_eq!(req.params.get("server"), Some("localhost:1565"));
    }

    #[test]
    fn test_parse_skips_empty_names_and_bare_tokens() {
        let params = Params::parse("a=1&=2&bare&b=&c=x%3Dy%26z");
        assert_eq!(params.get("a"), Some("1"));
        assert_eq!(params.get("b"), Some(""));
        assert_eq!(params.get("c"), Some("x=y&z"));
        assert_eq!(params.get("bare"), None);
        assert!(params.require("b").is_err());
    }

    #[test]
    fn test_nested_contents_survive_encoding() {
        let mut contents = HashMap::new();
        contents.insert("k&1".to_string(), "v=1".to_string());
        contents.insert("plain".to_string(), "with space".to_string());
        let query = encode_pairs([("contents", encode_map(&contents).as_str())]);
        let req = Request::new("syncData", query);
        assert_eq!(req.params.nested("contents"), contents);
        assert!(req.params.nested("missing").is_empty());
    }

    #[test]
    fn test_require_helpers() {
        let params = Params::parse("server=localhost:1565&count=7&bad=x");
        assert_eq!(params.require_address("server").unwrap(), Address::new("localhost", 1565));
        assert_eq!(params.require_u64("count").unwrap(), 7);
        assert!(matches!(params.require_u64("bad"), Err(FleetError::BadRequest(_))));
        assert!(matches!(params.require_address("bad"), Err(FleetError::BadRequest(_))));
        assert_eq!(params.require("nope"), Err(FleetError::missing("nope")));
    }

    #[tokio::test]
    async fn test_read_request_stops_at_blank_line() {
        let raw = "\r\nmakePeer /?peer=localhost:3002 HTTP/1.1\r\nHost: localhost:3001\r\n\r\ntrailing";
        let mut reader = BufReader::new(raw.as_bytes());
        let req = read_request(&mut reader).await.unwrap();
        assert!(req.is_command("makepeer"));
        assert_eq!(req.params.get("peer"), Some("localhost:3002"));
    }

    #[tokio::test]
    async fn test_read_request_empty_connection() {
        let mut reader = BufReader::new(&b""[..]);
        assert!(matches!(read_request(&mut reader).await, Err(WireError::Empty)));
    }

    #[tokio::test]
    async fn test_response_encode_and_read_back() {
        let resp = Response::redirect("http://localhost:3005/?input=a", "<html></html>");
        let encoded = resp.encode();
        assert!(encoded.starts_with("HTTP/1.1 302 Found\r\n"));

        let mut reader = BufReader::new(encoded.as_bytes());
        let decoded = read_response(&mut reader).await.unwrap();
        assert_eq!(decoded, resp);
        assert_eq!(decoded.location_address(), Some(Address::new("localhost", 3005)));
    }

    #[tokio::test]
    async fn test_read_response_without_length_reads_to_eof() {
        let raw = "HTTP/1.1 200 OK\r\n\r\nname&localhost:3001";
        let mut reader = BufReader::new(raw.as_bytes());
        let decoded = read_response(&mut reader).await.unwrap();
        assert_eq!(decoded.status, 200);
        assert_eq!(decoded.body, "name&localhost:3001");
    }

    #[test]
    fn test_request_encode_parses_back() {
        let req = Request::new("Migrate", encode_pairs([("name", "abc"), ("server", "h:1")]))
            .with_host(&Address::new("h", 9));
        let encoded = req.encode();
        let head: Vec<String> = encoded
            .split(CRLF)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        assert_eq!(Request::parse_head(&head).unwrap(), req);
    }
}
