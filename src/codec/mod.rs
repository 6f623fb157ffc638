mod body;
mod error;
mod header;
mod request_encoder;
mod response_decoder;

pub use error::{DecodeError, EncodeError};
pub use request_encoder::RequestEncoder;
pub use response_decoder::ResponseDecoder;
