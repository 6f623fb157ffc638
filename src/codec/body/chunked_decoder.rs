use std::cmp;

use bytes::{Buf, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use tokio_util::codec::Decoder;

use crate::codec::error::{InvalidChunkSnafu, InvalidTrailerSnafu};
use crate::codec::DecodeError;
use crate::protocol::PayloadItem;

// a size line longer than this (extensions included) is hostile input
const MAX_CHUNK_LINE_BYTES: usize = 1024;
const MAX_TRAILER_BYTES: usize = 8 * 1024;
const MAX_TRAILER_NUM: usize = 32;

/// Decodes a `Transfer-Encoding: chunked` response body.
///
/// Size and trailer lines are consumed whole rather than byte by byte;
/// chunk extensions are dropped but bounded by the size-line cap. A trailer
/// section, if present, is parsed into headers and delivered as one
/// [`PayloadItem::Trailers`] frame right before `Eof`.
pub struct ChunkedDecoder {
    state: State,
    remaining: u64,
    trailer: BytesMut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// expecting a `<hex-size>[;extensions]` line
    Size,
    /// inside chunk data, `remaining` bytes to go
    Data,
    /// expecting the CRLF that closes a chunk
    DataEnd,
    /// after the zero-sized chunk, collecting trailer lines
    Trailer,
    /// message complete
    End,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: State::Size, remaining: 0, trailer: BytesMut::new() }
    }

    pub fn is_finished(&self) -> bool {
        self.state == State::End
    }

    fn parse_trailers(&mut self) -> Result<HeaderMap, DecodeError> {
        // terminate the block so httparse sees a complete header section
        self.trailer.extend_from_slice(b"\r\n");
        let raw = self.trailer.split().freeze();

        let mut parsed = [httparse::EMPTY_HEADER; MAX_TRAILER_NUM];
        let headers = match httparse::parse_headers(&raw, &mut parsed) {
            Ok(httparse::Status::Complete((_, headers))) => headers,
            Ok(httparse::Status::Partial) => {
                return InvalidTrailerSnafu { message: "trailer section is truncated" }.fail()
            }
            Err(e) => return InvalidTrailerSnafu { message: format!("can't parse trailer section: {e}") }.fail(),
        };

        let mut trailers = HeaderMap::with_capacity(headers.len());
        for header in headers {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|_| InvalidTrailerSnafu { message: format!("invalid trailer name {}", header.name) }.build())?;
            let value = HeaderValue::from_bytes(header.value)
                .map_err(|_| InvalidTrailerSnafu { message: format!("invalid value of trailer {}", header.name) }.build())?;
            trailers.append(name, value);
        }
        Ok(trailers)
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::End => return Ok(Some(PayloadItem::Eof)),

                State::Size => {
                    let Some(line) = take_line(src, MAX_CHUNK_LINE_BYTES)? else { return Ok(None) };
                    self.remaining = parse_size_line(&line)?;
                    self.state = if self.remaining == 0 { State::Trailer } else { State::Data };
                }

                State::Data => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let take = cmp::min(self.remaining, src.len() as u64) as usize;
                    let bytes = src.split_to(take).freeze();
                    self.remaining -= bytes.len() as u64;
                    if self.remaining == 0 {
                        self.state = State::DataEnd;
                    }
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }

                State::DataEnd => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    if &src[..2] != b"\r\n" {
                        return InvalidChunkSnafu { message: "chunk data not closed by CRLF" }.fail();
                    }
                    src.advance(2);
                    self.state = State::Size;
                }

                State::Trailer => {
                    let Some(line) = take_line(src, MAX_TRAILER_BYTES)? else { return Ok(None) };
                    if line.is_empty() {
                        self.state = State::End;
                        if !self.trailer.is_empty() {
                            let trailers = self.parse_trailers()?;
                            return Ok(Some(PayloadItem::Trailers(trailers)));
                        }
                    } else {
                        if self.trailer.len() + line.len() + 2 > MAX_TRAILER_BYTES {
                            return InvalidTrailerSnafu { message: "trailer section too large" }.fail();
                        }
                        self.trailer.extend_from_slice(&line);
                        self.trailer.extend_from_slice(b"\r\n");
                    }
                }
            }
        }
    }
}

/// Take one LF-terminated line off the buffer, stripping the line ending.
/// `None` when no complete line is buffered yet.
fn take_line(src: &mut BytesMut, max: usize) -> Result<Option<BytesMut>, DecodeError> {
    match src.iter().position(|&b| b == b'\n') {
        Some(pos) => {
            let mut line = src.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                let len = line.len();
                line.truncate(len - 1);
            }
            if line.len() > max {
                return InvalidChunkSnafu { message: "chunk metadata line too long" }.fail();
            }
            Ok(Some(line))
        }
        None => {
            if src.len() > max {
                return InvalidChunkSnafu { message: "chunk metadata line too long" }.fail();
            }
            Ok(None)
        }
    }
}

fn parse_size_line(line: &[u8]) -> Result<u64, DecodeError> {
    let line = std::str::from_utf8(line)
        .map_err(|_| InvalidChunkSnafu { message: "chunk size line is not ascii" }.build())?;

    // everything after ';' is chunk extensions, which nothing consumes
    let size_part = match line.split_once(';') {
        Some((size_part, _extensions)) => size_part,
        None => line,
    };

    u64::from_str_radix(size_part.trim(), 16)
        .map_err(|_| InvalidChunkSnafu { message: format!("invalid chunk size in {line:?}") }.build())
}
