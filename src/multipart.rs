//! A small `multipart/form-data` scanner working directly on raw body bytes.
//!
//! The scanner walks the body with an explicit state machine
//! (seeking boundary, reading headers, reading body) and returns the first
//! part that carries a `filename=` parameter. Further file parts are ignored.

use thiserror::Error;

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
pub const DEFAULT_FILENAME: &str = "unknown";

/// Boundary prefix emitted by Chromium and WebKit based browsers, including
/// the leading `--` of the delimiter line.
const WEBKIT_DELIMITER_PREFIX: &[u8] = b"------WebKitFormBoundary";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MultipartError {
    #[error("No multipart boundary found in body")]
    MissingBoundary,
    #[error("Part headers are not terminated by a blank line")]
    MalformedPart,
    #[error("Part body is not followed by a boundary")]
    Truncated,
    #[error("No file part found in multipart body")]
    NoFilePart,
}

/// The file carried by a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartField {
    pub filename: String,
    pub mime_type: String,
    pub raw_bytes: Vec<u8>,
}

#[derive(Debug)]
struct PartHeaders {
    /// `Some` only for file-bearing parts.
    filename: Option<String>,
    mime_type: String,
}

#[derive(Debug)]
enum State {
    SeekingBoundary,
    ReadingHeaders,
    ReadingBody(PartHeaders),
}

/// Read the `boundary` parameter of a `Content-Type` header value.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .find_map(|param| {
            let (key, value) = param.trim().split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("boundary")
                .then(|| value.trim().trim_matches('"').to_string())
        })
        .filter(|boundary| !boundary.is_empty())
}

/// Sniff the boundary from the body itself.
///
/// A browser-default `------WebKitFormBoundary…` delimiter wins; otherwise the
/// token between the first `--` and the end of its line is used.
pub fn extract_boundary(body: &[u8]) -> Option<String> {
    if let Some(start) = find(body, WEBKIT_DELIMITER_PREFIX, 0) {
        let token_start = start + WEBKIT_DELIMITER_PREFIX.len();
        let token_end = body[token_start..]
            .iter()
            .position(|b| !(b.is_ascii_alphanumeric() || *b == b'_'))
            .map_or(body.len(), |n| token_start + n);
        if token_end > token_start {
            // Drop the delimiter's own leading `--`.
            return std::str::from_utf8(&body[start + 2..token_end])
                .ok()
                .map(str::to_string);
        }
    }

    let start = find(body, b"--", 0)? + 2;
    let end = body[start..]
        .iter()
        .position(|b| *b == b'\r' || *b == b'\n')
        .map_or(body.len(), |n| start + n);
    let token = std::str::from_utf8(&body[start..end]).ok()?;
    (!token.is_empty()).then(|| token.to_string())
}

/// Decode the first file-bearing part of `body`, delimited by `--{boundary}`.
pub fn decode(body: &[u8], boundary: &str) -> Result<MultipartField, MultipartError> {
    let delimiter = [b"--".as_slice(), boundary.as_bytes()].concat();
    let mut state = State::SeekingBoundary;
    let mut pos = 0;

    loop {
        state = match state {
            State::SeekingBoundary => {
                let at = find(body, &delimiter, pos).ok_or(MultipartError::MissingBoundary)?;
                let after = at + delimiter.len();
                if body[after..].starts_with(b"--") {
                    return Err(MultipartError::NoFilePart);
                }
                let line_end = body[after..]
                    .iter()
                    .position(|b| *b == b'\n')
                    .ok_or(MultipartError::NoFilePart)?;
                pos = after + line_end + 1;
                State::ReadingHeaders
            }
            State::ReadingHeaders => {
                let (header_end, body_start) =
                    split_headers(body, pos).ok_or(MultipartError::MalformedPart)?;
                if find(body, &delimiter, pos).is_some_and(|next| next < header_end) {
                    return Err(MultipartError::MalformedPart);
                }
                let headers = parse_headers(&body[pos..header_end]);
                pos = body_start;
                State::ReadingBody(headers)
            }
            State::ReadingBody(headers) => {
                let next = find(body, &delimiter, pos).ok_or(MultipartError::Truncated)?;
                if let Some(filename) = headers.filename {
                    return Ok(MultipartField {
                        filename,
                        mime_type: headers.mime_type,
                        raw_bytes: strip_line_end(&body[pos..next]).to_vec(),
                    });
                }
                pos = next;
                State::SeekingBoundary
            }
        };
    }
}

/// Locate the blank line ending a header block that starts at `pos`.
/// Returns `(end of headers, start of body)`.
fn split_headers(body: &[u8], pos: usize) -> Option<(usize, usize)> {
    let rest = &body[pos..];
    if rest.starts_with(b"\r\n") {
        return Some((pos, pos + 2));
    }
    if rest.starts_with(b"\n") {
        return Some((pos, pos + 1));
    }

    let crlf = find(body, b"\r\n\r\n", pos).map(|at| (at, at + 4));
    let lf = find(body, b"\n\n", pos).map(|at| (at, at + 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_headers(block: &[u8]) -> PartHeaders {
    let text = String::from_utf8_lossy(block);
    let mut headers = PartHeaders {
        filename: None,
        mime_type: DEFAULT_MIME_TYPE.to_string(),
    };

    for line in text.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.eq_ignore_ascii_case("content-disposition") && value.contains("filename=") {
            headers.filename = Some(
                quoted_param(value, "filename=")
                    .unwrap_or(DEFAULT_FILENAME)
                    .to_string(),
            );
        } else if name.eq_ignore_ascii_case("content-type") {
            let value = value.trim();
            if !value.is_empty() {
                headers.mime_type = value.to_string();
            }
        }
    }

    headers
}

/// Value of `key"…"` inside a header value; `None` when unquoted or empty.
fn quoted_param<'a>(value: &'a str, key: &str) -> Option<&'a str> {
    let start = value.find(key)? + key.len();
    let rest = value[start..].strip_prefix('"')?;
    let end = rest.find('"')?;
    (end > 0).then(|| &rest[..end])
}

fn strip_line_end(payload: &[u8]) -> &[u8] {
    payload
        .strip_suffix(b"\r\n")
        .or_else(|| payload.strip_suffix(b"\n"))
        .unwrap_or(payload)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|at| at + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEBKIT_BODY: &[u8] = b"------WebKitFormBoundaryXYZ\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
Content-Type: text/plain\r\n\
\r\n\
hello\r\n\
------WebKitFormBoundaryXYZ--";

    #[test]
    fn test_webkit_body_decodes() {
        let boundary = extract_boundary(WEBKIT_BODY).unwrap();
        assert_eq!(boundary, "----WebKitFormBoundaryXYZ");

        let field = decode(WEBKIT_BODY, &boundary).unwrap();
        assert_eq!(field.filename, "a.txt");
        assert_eq!(field.mime_type, "text/plain");
        assert_eq!(field.raw_bytes, b"hello");
    }

    #[test]
    fn test_extract_boundary_falls_back_to_first_delimiter_line() {
        let body = b"--abc123\r\nContent-Disposition: form-data; name=\"x\"\r\n\r\n1\r\n--abc123--";
        assert_eq!(extract_boundary(body).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_extract_boundary_none() {
        assert_eq!(extract_boundary(b"no delimiters here"), None);
        assert_eq!(extract_boundary(b"--\r\n"), None);
    }

    #[test]
    fn test_boundary_from_content_type() {
        assert_eq!(
            boundary_from_content_type("multipart/form-data; boundary=xyz").as_deref(),
            Some("xyz")
        );
        assert_eq!(
            boundary_from_content_type("multipart/form-data; charset=utf-8; Boundary=\"q r\"")
                .as_deref(),
            Some("q r")
        );
        assert_eq!(boundary_from_content_type("multipart/form-data"), None);
        assert_eq!(boundary_from_content_type("multipart/form-data; boundary="), None);
    }

    #[test]
    fn test_skips_non_file_parts() {
        let body = b"--b\r\n\
Content-Disposition: form-data; name=\"note\"\r\n\
\r\n\
just text\r\n\
--b\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"pic.png\"\r\n\
Content-Type: image/png\r\n\
\r\n\
PNG\r\n\
--b--\r\n";
        let field = decode(body, "b").unwrap();
        assert_eq!(field.filename, "pic.png");
        assert_eq!(field.mime_type, "image/png");
        assert_eq!(field.raw_bytes, b"PNG");
    }

    #[test]
    fn test_only_first_file_part_is_returned() {
        let body = b"--b\r\n\
Content-Disposition: form-data; name=\"f\"; filename=\"one.txt\"\r\n\
\r\n\
1\r\n\
--b\r\n\
Content-Disposition: form-data; name=\"f\"; filename=\"two.txt\"\r\n\
\r\n\
2\r\n\
--b--";
        assert_eq!(decode(body, "b").unwrap().filename, "one.txt");
    }

    #[test]
    fn test_defaults_for_missing_filename_and_type() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"f\"; filename=\r\n\r\nxyz\r\n--b--";
        let field = decode(body, "b").unwrap();
        assert_eq!(field.filename, DEFAULT_FILENAME);
        assert_eq!(field.mime_type, DEFAULT_MIME_TYPE);
        assert_eq!(field.raw_bytes, b"xyz");
    }

    #[test]
    fn test_binary_payload_is_preserved() {
        let payload: Vec<u8> = vec![0x00, 0xff, b'\r', b'\n', 0x80, b'\r', b'\n', 0x7f];
        let mut body = b"--b\r\nContent-Disposition: form-data; name=\"f\"; filename=\"x.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n".to_vec();
        body.extend_from_slice(&payload);
        body.extend_from_slice(b"\r\n--b--\r\n");

        let field = decode(&body, "b").unwrap();
        assert_eq!(field.raw_bytes, payload);
    }

    #[test]
    fn test_lf_only_line_endings() {
        let body = b"--b\nContent-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\ncontent-type: text/csv\n\na,b\n--b--";
        let field = decode(body, "b").unwrap();
        assert_eq!(field.mime_type, "text/csv");
        assert_eq!(field.raw_bytes, b"a,b");
    }

    #[test]
    fn test_empty_file_part() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"f\"; filename=\"empty\"\r\n\r\n\r\n--b--";
        assert!(decode(body, "b").unwrap().raw_bytes.is_empty());
    }

    #[test]
    fn test_missing_boundary() {
        assert_eq!(
            decode(b"plain body", "b").unwrap_err(),
            MultipartError::MissingBoundary
        );
    }

    #[test]
    fn test_truncated_body() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"f\"; filename=\"a\"\r\n\r\nhalf of it";
        assert_eq!(decode(body, "b").unwrap_err(), MultipartError::Truncated);
    }

    #[test]
    fn test_unterminated_headers() {
        let body = b"--b\r\nContent-Disposition: form-data; filename=\"a\"\r\n--b--";
        assert_eq!(decode(body, "b").unwrap_err(), MultipartError::MalformedPart);
    }

    #[test]
    fn test_no_file_part() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"x\"\r\n\r\n1\r\n--b--";
        assert_eq!(decode(body, "b").unwrap_err(), MultipartError::NoFilePart);
    }
}
