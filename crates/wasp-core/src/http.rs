//! Decoding of the HTTP responses embedded in response records.
//!
//! A response record's block is the raw message as it came over the wire:
//! status line, headers, and a body that may be chunked and compressed.
//! Parsing is lax in the places where captures are commonly imperfect
//! (short bodies, missing lengths), but an unknown content encoding is an
//! error, since guessing would index garbage.

use crate::error::{Result, WaspError};
use flate2::read::{DeflateDecoder, MultiGzDecoder, ZlibDecoder};
use regex::Regex;
use std::io::Read;
use std::sync::OnceLock;

/// A parsed HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

fn html_content_type() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*text/html\b").expect("static regex"))
}

fn charset_parameter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)charset\s*=\s*"?([^";\s]+)"#).expect("static regex"))
}

impl HttpResponse {
    /// Parse a raw HTTP response message.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let (head, rest) = split_head(raw)
            .ok_or_else(|| WaspError::invalid_http("no end of header section"))?;
        let head = String::from_utf8_lossy(head);
        let mut lines = head.split('\n').map(|l| l.trim_end_matches('\r'));

        let status_line = lines
            .next()
            .ok_or_else(|| WaspError::invalid_http("empty message"))?;
        let mut parts = status_line.split_whitespace();
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("HTTP/") {
            return Err(WaspError::invalid_http(format!(
                "bad status line {:?}",
                status_line
            )));
        }
        let status = parts
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| WaspError::invalid_http(format!("bad status code in {:?}", status_line)))?;

        let mut headers: Vec<(String, String)> = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = headers.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }
            match line.split_once(':') {
                Some((name, value)) => headers.push((name.trim().to_string(), value.trim().to_string())),
                None => return Err(WaspError::invalid_http(format!("bad header line {:?}", line))),
            }
        }

        let mut response = HttpResponse {
            status,
            headers,
            body: Vec::new(),
        };
        response.body = response.frame_body(rest)?;
        Ok(response)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// First value of a header field
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Last value of a header field
    pub fn last_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The body as transferred (de-chunked, still content-encoded)
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether the last `Content-Type` header names HTML.
    pub fn is_html(&self) -> bool {
        self.last_header("Content-Type")
            .map(|ct| html_content_type().is_match(ct))
            .unwrap_or(false)
    }

    /// The body with all content codings removed.
    pub fn decoded_body(&self) -> Result<Vec<u8>> {
        let Some(encodings) = self.header("Content-Encoding") else {
            return Ok(self.body.clone());
        };
        if self.body.is_empty() {
            return Ok(Vec::new());
        }

        // Codings are listed in the order they were applied
        let mut body = self.body.clone();
        for coding in encodings.split(',').map(|c| c.trim().to_ascii_lowercase()).rev() {
            body = match coding.as_str() {
                "" | "identity" => body,
                "gzip" | "x-gzip" => decode_with(MultiGzDecoder::new(&body[..]))?,
                "deflate" => match decode_with(ZlibDecoder::new(&body[..])) {
                    Ok(decoded) => decoded,
                    Err(_) => decode_with(DeflateDecoder::new(&body[..]))?,
                },
                _ => return Err(WaspError::UnsupportedEncoding { encoding: coding }),
            };
        }
        Ok(body)
    }

    /// The decoded HTML text, or `None` for non-HTML responses.
    pub fn html(&self) -> Result<Option<String>> {
        if !self.is_html() {
            return Ok(None);
        }
        let body = self.decoded_body()?;
        let charset = self
            .last_header("Content-Type")
            .and_then(|ct| charset_parameter().captures(ct))
            .map(|c| c[1].to_ascii_lowercase());

        let text = match charset.as_deref() {
            Some("iso-8859-1") | Some("latin1") | Some("latin-1") => {
                body.iter().map(|&b| b as char).collect()
            }
            Some("windows-1252") | Some("cp1252") => {
                body.iter().map(|&b| windows_1252(b)).collect()
            }
            _ => String::from_utf8_lossy(&body).into_owned(),
        };
        Ok(Some(text))
    }

    fn frame_body(&self, rest: &[u8]) -> Result<Vec<u8>> {
        let chunked = self
            .header("Transfer-Encoding")
            .map(|te| te.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false);
        if chunked {
            return Ok(dechunk(rest));
        }

        match self
            .header("Content-Length")
            .and_then(|len| len.trim().parse::<usize>().ok())
        {
            Some(len) => Ok(rest[..len.min(rest.len())].to_vec()),
            None => Ok(rest.to_vec()),
        }
    }
}

fn split_head(raw: &[u8]) -> Option<(&[u8], &[u8])> {
    if let Some(pos) = find(raw, b"\r\n\r\n") {
        return Some((&raw[..pos], &raw[pos + 4..]));
    }
    find(raw, b"\n\n").map(|pos| (&raw[..pos], &raw[pos + 2..]))
}

/// Characters of windows-1252 bytes 0x80 to 0x9F; unassigned bytes keep their C1 code point.
const WINDOWS_1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{017E}', '\u{0178}',
];

fn windows_1252(byte: u8) -> char {
    match byte {
        0x80..=0x9F => WINDOWS_1252_HIGH[(byte - 0x80) as usize],
        _ => byte as char,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Remove chunked transfer coding; a truncated final chunk is kept as is.
fn dechunk(mut data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len());
    loop {
        let Some(line_end) = find(data, b"\n") else {
            break;
        };
        let size_line = String::from_utf8_lossy(&data[..line_end]);
        let size_text = size_line.trim().split(';').next().unwrap_or_default().trim();
        let Ok(size) = usize::from_str_radix(size_text, 16) else {
            break;
        };
        data = &data[line_end + 1..];
        if size == 0 {
            break;
        }
        let take = size.min(data.len());
        body.extend_from_slice(&data[..take]);
        data = &data[take..];
        // Skip the CRLF that terminates the chunk data
        if data.starts_with(b"\r\n") {
            data = &data[2..];
        } else if data.starts_with(b"\n") {
            data = &data[1..];
        }
    }
    body
}

fn decode_with<R: Read>(mut decoder: R) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| WaspError::invalid_http(format!("content decoding failed: {}", e)))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_parse_plain_html() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: 13\r\n\r\n<p>hello</p>\nTRAILING";
        let response = HttpResponse::parse(raw).unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.is_html());
        assert_eq!(response.body(), b"<p>hello</p>\n");
        assert_eq!(response.html().unwrap().unwrap(), "<p>hello</p>\n");
    }

    #[test]
    fn test_non_html() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\n\r\n\x89PNG";
        let response = HttpResponse::parse(raw).unwrap();
        assert!(!response.is_html());
        assert!(response.html().unwrap().is_none());
    }

    #[test]
    fn test_last_content_type_wins() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Type: TEXT/HTML\r\n\r\n<b>x</b>";
        assert!(HttpResponse::parse(raw).unwrap().is_html());
    }

    #[test]
    fn test_chunked_body() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\n\r\n";
        let response = HttpResponse::parse(raw).unwrap();
        assert_eq!(response.body(), b"hello world");
    }

    #[test]
    fn test_gzip_content_encoding() {
        let mut raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Encoding: gzip\r\n\r\n".to_vec();
        raw.extend(gzip(b"<title>Zipped</title>"));
        let response = HttpResponse::parse(&raw).unwrap();
        assert_eq!(response.html().unwrap().unwrap(), "<title>Zipped</title>");
    }

    #[test]
    fn test_deflate_content_encoding() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"deflated body").unwrap();
        let mut raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Encoding: deflate\r\n\r\n".to_vec();
        raw.extend(encoder.finish().unwrap());
        let response = HttpResponse::parse(&raw).unwrap();
        assert_eq!(response.decoded_body().unwrap(), b"deflated body");
    }

    #[test]
    fn test_unsupported_encoding() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Encoding: br\r\n\r\nxxxx";
        let response = HttpResponse::parse(raw).unwrap();
        assert!(matches!(
            response.html(),
            Err(WaspError::UnsupportedEncoding { .. })
        ));
    }

    #[test]
    fn test_latin1_charset() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=ISO-8859-1\r\n\r\ncaf\xe9";
        let response = HttpResponse::parse(raw).unwrap();
        assert_eq!(response.html().unwrap().unwrap(), "café");
    }

    #[test]
    fn test_windows_1252_charset() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=windows-1252\r\n\r\n\x93caf\xe9\x94 \x96 5 \x80";
        let response = HttpResponse::parse(raw).unwrap();
        assert_eq!(
            response.html().unwrap().unwrap(),
            "\u{201C}café\u{201D} \u{2013} 5 \u{20AC}"
        );
    }

    #[test]
    fn test_invalid_status_line() {
        assert!(HttpResponse::parse(b"GET / HTTP/1.1\r\n\r\n").is_err());
        assert!(HttpResponse::parse(b"no header end").is_err());
    }
}
