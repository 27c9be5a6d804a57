use bytes::{Bytes, BytesMut};

const HEADER_END: &[u8] = b"\r\n\r\n";
const CONTENT_LENGTH: &[u8] = b"content-length:";

/// Media type announcing a multipart MJPEG response
pub const MULTIPART_MIXED_REPLACE: &str = "multipart/x-mixed-replace";

/// Parse state for a multipart MJPEG body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Looking for the `--boundary` marker
    SeekingBoundary,
    /// Found a marker, looking for the blank line ending the part headers
    SeekingHeaderEnd,
    /// Collecting image bytes, sized by Content-Length when the part had one
    CollectingImage(Option<usize>),
}

/// Boundary name from a `multipart/x-mixed-replace; boundary=...` content type.
///
/// Returns `None` for any other content type.
pub fn multipart_boundary(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let media_type = params.next()?.trim();
    if !media_type.eq_ignore_ascii_case(MULTIPART_MIXED_REPLACE) {
        return None;
    }

    let boundary = params
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"'))
        // Some cameras already include the leading dashes
        .map(|value| value.trim_start_matches("--").to_string())
        .filter(|value| !value.is_empty());

    Some(boundary.unwrap_or_else(|| "frame".to_string()))
}

/// Incremental splitter for `multipart/x-mixed-replace` bodies.
///
/// Feed network chunks with `push` and drain complete parts with
/// `next_part`. Chunks may split markers, headers or images anywhere.
#[derive(Debug)]
pub struct MjpegParser {
    marker: Vec<u8>,
    buffer: BytesMut,
    state: ParseState,
    scanned: usize,
}

impl MjpegParser {
    pub fn new(boundary: &str) -> Self {
        Self {
            marker: format!("--{}", boundary).into_bytes(),
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            scanned: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete image part, if the buffered bytes hold one
    pub fn next_part(&mut self) -> Option<Bytes> {
        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, &self.marker) {
                        let _ = self.buffer.split_to(pos + self.marker.len());
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep a tail in case the marker spans chunks
                        if self.buffer.len() > self.marker.len() {
                            let _ = self.buffer.split_to(self.buffer.len() - self.marker.len());
                        }
                        return None;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    let pos = find_subsequence(&self.buffer, HEADER_END)?;
                    let headers = self.buffer.split_to(pos + HEADER_END.len());
                    self.scanned = 0;
                    self.state = ParseState::CollectingImage(content_length(&headers));
                }
                ParseState::CollectingImage(Some(length)) => {
                    if self.buffer.len() < length {
                        return None;
                    }
                    let image = self.buffer.split_to(length).freeze();
                    self.state = ParseState::SeekingBoundary;
                    if !image.is_empty() {
                        return Some(image);
                    }
                }
                ParseState::CollectingImage(None) => {
                    let Some(pos) = find_subsequence(&self.buffer[self.scanned..], &self.marker)
                    else {
                        self.scanned = self.buffer.len().saturating_sub(self.marker.len());
                        return None;
                    };

                    let image_end = self.scanned + pos;
                    let mut image = self.buffer.split_to(image_end);
                    if image.ends_with(b"\r\n") {
                        image.truncate(image.len() - 2);
                    }
                    self.state = ParseState::SeekingBoundary;
                    if !image.is_empty() {
                        return Some(image.freeze());
                    }
                }
            }
        }
    }

    /// Bytes held while waiting for the rest of a part
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Value of a Content-Length header in a raw header block
fn content_length(headers: &[u8]) -> Option<usize> {
    headers
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .find(|line| {
            line.len() >= CONTENT_LENGTH.len()
                && line[..CONTENT_LENGTH.len()].eq_ignore_ascii_case(CONTENT_LENGTH)
        })
        .and_then(|line| std::str::from_utf8(&line[CONTENT_LENGTH.len()..]).ok())
        .and_then(|value| value.trim().parse().ok())
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
