use crate::error::{ServerError, ServerResult};
use std::collections::HashMap;
use std::fmt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Longest request line or header line accepted, in bytes.
pub const MAX_LINE_LENGTH: usize = 65536;
/// Most header lines accepted in one request head.
pub const MAX_HEADERS: usize = 100;

#[derive(Eq, Hash, PartialEq, Clone, Debug)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    CONNECT,
    OPTIONS,
    TRACE,
    PATCH,
    Other(String),
}

impl Method {
    pub fn from_string(s: &str) -> Method {
        match s {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "HEAD" => Method::HEAD,
            "CONNECT" => Method::CONNECT,
            "OPTIONS" => Method::OPTIONS,
            "TRACE" => Method::TRACE,
            "PATCH" => Method::PATCH,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::CONNECT => "CONNECT",
            Method::OPTIONS => "OPTIONS",
            Method::TRACE => "TRACE",
            Method::PATCH => "PATCH",
            Method::Other(other) => other,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    /// Parses `HTTP/<major>.<minor>`. Any 1.x minor above 0 is served as 1.1.
    pub fn parse(s: &str) -> ServerResult<Version> {
        let bad_version = || ServerError::BadRequest(format!("Bad request version ('{}')", s));
        let (major, minor) = s
            .strip_prefix("HTTP/")
            .and_then(|numbers| numbers.split_once('.'))
            .and_then(|(major, minor)| {
                Some((major.parse::<u32>().ok()?, minor.parse::<u32>().ok()?))
            })
            .ok_or_else(bad_version)?;

        match (major, minor) {
            (1, 0) => Ok(Version::Http10),
            (1, _) => Ok(Version::Http11),
            (0, _) => Err(bad_version()),
            _ => Err(ServerError::VersionNotSupported(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

/// A parsed request head. The body, if any, is drained by the connection
/// and never stored.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// The request target exactly as sent, query string included.
    pub path: String,
    pub version: Version,
    pub headers: HashMap<String, String>,
}

impl Request {
    pub fn new(method: Method, path: &str) -> Request {
        Request {
            method,
            path: path.to_string(),
            version: Version::Http11,
            headers: HashMap::new(),
        }
    }

    /// Header lookup; names are stored lowercased.
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn content_length(&self) -> ServerResult<u64> {
        match self.get_header("content-length") {
            None => Ok(0),
            Some(value) => value.parse::<u64>().map_err(|_| {
                ServerError::BadRequest(format!("Invalid Content-Length ('{}')", value))
            }),
        }
    }

    /// Whether the body is framed by chunked Transfer-Encoding. Any other
    /// final coding leaves the body length unknown and is rejected.
    pub fn is_chunked(&self) -> ServerResult<bool> {
        let Some(codings) = self.get_header("transfer-encoding") else {
            return Ok(false);
        };
        let last = codings.rsplit(',').next().unwrap_or_default().trim();
        if last.eq_ignore_ascii_case("chunked") {
            Ok(true)
        } else {
            let message = format!("Unsupported Transfer-Encoding ('{}')", codings);
            Err(ServerError::BadRequest(message))
        }
    }

    /// HTTP/1.1 defaults to persistent connections, HTTP/1.0 does not.
    pub fn wants_keep_alive(&self) -> bool {
        let connection = self.get_header("connection").map(str::to_ascii_lowercase);
        match (self.version, connection.as_deref()) {
            (_, Some("close")) => false,
            (_, Some("keep-alive")) => true,
            (Version::Http11, _) => true,
            (Version::Http10, _) => false,
        }
    }

    /// Reads one request head from `reader`.
    ///
    /// Returns `Ok(None)` when the peer closed the connection before sending
    /// a request line. Blank lines ahead of the request line are skipped.
    pub async fn read_from<R>(reader: &mut R) -> ServerResult<Option<Request>>
    where
        R: AsyncBufRead + Unpin,
    {
        let line = loop {
            match read_line(reader, || ServerError::UriTooLong).await? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };
        let line = String::from_utf8(line)
            .map_err(|_| ServerError::BadRequest("Request line is not valid UTF-8".to_string()))?;

        let mut parts = line.split_whitespace();
        let words = (parts.next(), parts.next(), parts.next(), parts.next());
        let (method, path, version) = match words {
            (Some(method), Some(path), Some(version), None) => (method, path, version),
            _ => return Err(ServerError::BadRequest(format!("Bad request syntax ('{}')", line))),
        };
        let version = Version::parse(version)?;

        let mut headers: HashMap<String, String> = HashMap::new();
        let mut count = 0;
        loop {
            let line = read_line(reader, || ServerError::HeadersTooLarge)
                .await?
                .ok_or_else(|| {
                    ServerError::BadRequest("Connection closed inside headers".to_string())
                })?;
            if line.is_empty() {
                break;
            }

            count += 1;
            if count > MAX_HEADERS {
                return Err(ServerError::HeadersTooLarge);
            }

            // Field values may carry obs-text, so they are decoded lossily.
            let colon = line.iter().position(|&b| b == b':').ok_or_else(|| {
                let line = String::from_utf8_lossy(&line);
                ServerError::BadRequest(format!("Malformed header ('{}')", line))
            })?;
            let key = String::from_utf8_lossy(&line[..colon]).trim().to_ascii_lowercase();
            let value = String::from_utf8_lossy(&line[colon + 1..]).trim().to_string();

            if key == "content-length" {
                if let Some(previous) = headers.get(&key) {
                    if *previous != value {
                        return Err(ServerError::BadRequest(
                            "Conflicting Content-Length headers".to_string(),
                        ));
                    }
                }
            }
            headers.insert(key, value);
        }

        Ok(Some(Request {
            method: Method::from_string(method),
            path: path.to_string(),
            version,
            headers,
        }))
    }
}

/// Reads one CRLF (or bare LF) terminated line without its terminator.
/// `Ok(None)` means end of stream.
pub(crate) async fn read_line<R, E>(reader: &mut R, too_long: E) -> ServerResult<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
    E: Fn() -> ServerError,
{
    let mut line = Vec::new();
    let read = (&mut *reader)
        .take(MAX_LINE_LENGTH as u64 + 1)
        .read_until(b'\n', &mut line)
        .await?;
    if read == 0 {
        return Ok(None);
    }
    if line.len() > MAX_LINE_LENGTH {
        return Err(too_long());
    }

    if line.ends_with(b"\n") {
        line.pop();
        if line.ends_with(b"\r") {
            line.pop();
        }
    }

    Ok(Some(line))
}
