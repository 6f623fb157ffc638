mod chunked_decoder;
mod chunked_encoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;
mod until_close_decoder;

pub use chunked_decoder::ChunkedDecoder;
pub use chunked_encoder::ChunkedEncoder;
pub use length_encoder::LengthEncoder;
pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
pub use until_close_decoder::UntilCloseDecoder;
