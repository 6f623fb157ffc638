use snafu::prelude::*;

use std::io::Error as IoError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DecodeError {
    #[snafu(display("header too large, current size: {current_size}, max size: {max_size}"))]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[snafu(display("header too many, max num: {max_num}"))]
    TooManyHeaders { max_num: usize, source: httparse::Error },

    #[snafu(display("parsed invalid header: {source}"))]
    InvalidHeader { source: httparse::Error },

    #[snafu(display("invalid response message: {message}"))]
    InvalidMessage { message: String },

    #[snafu(display("invalid content-length: {message}"))]
    InvalidContentLength { message: String },

    #[snafu(display("invalid chunk: {message}"))]
    InvalidChunk { message: String },

    #[snafu(display("invalid trailer: {message}"))]
    InvalidTrailer { message: String },

    #[snafu(display("parse body error: {message}"))]
    Body { message: String },

    #[snafu(display("connection closed in the middle of a message head"))]
    UnexpectedEof,

    #[snafu(display("io error happens when parsing: {source}"), context(false))]
    Io { source: IoError },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EncodeError {
    #[snafu(display("invalid request message: {message}"))]
    InvalidRequest { message: String },

    #[snafu(display("io error happens when encoding: {source}"), context(false))]
    Io { source: IoError },
}
