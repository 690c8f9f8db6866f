use crate::error::ServerError;
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl Response {
    pub fn new(status: u16) -> Response {
        Response {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn body<T: AsRef<str>>(&mut self, body: T) -> &mut Self {
        self.body = body.as_ref().to_string();
        self
    }

    // Replaces any header of the same name, ignoring case.
    pub fn header<K: AsRef<str>, V: AsRef<str>>(&mut self, name: K, value: V) -> &mut Self {
        let name = name.as_ref();
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.as_ref().to_string()));
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn html<T: AsRef<str>>(content: T) -> Response {
        let mut response = Response::new(200);
        response
            .header("Content-Type", "text/html")
            .body(content);
        response
    }

    pub fn error(err: ServerError) -> Response {
        let status = err.status_code();
        let mut response = Response::new(status);
        response
            .header("Content-Type", "application/json")
            .body(
                serde_json::json!({
                    "error": {
                        "message": err.to_string(),
                        "status": status
                    }
                })
                .to_string(),
            );
        response
    }

    /// Adds `Server` and `Date` headers the way every response carries them.
    pub fn stamp(&mut self, server: &str) -> &mut Self {
        self.header("Server", server)
            .header("Date", httpdate::fmt_http_date(SystemTime::now()))
    }

    pub fn keep_alive(&mut self, keep_alive: bool) -> &mut Self {
        self.header("Connection", if keep_alive { "keep-alive" } else { "close" })
    }

    /// Serializes the response as HTTP/1.1. `Content-Length` always reflects
    /// the body, even when `include_body` is false for a HEAD reply.
    pub fn to_bytes(&self, include_body: bool) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status));
        for (name, value) in &self.headers {
            head += &format!("{}: {}\r\n", name, value);
        }
        head += &format!("Content-Length: {}\r\n\r\n", self.body.len());

        let mut bytes = head.into_bytes();
        if include_body {
            bytes.extend_from_slice(self.body.as_bytes());
        }
        bytes
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        414 => "URI Too Long",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}
