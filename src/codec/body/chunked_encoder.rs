use std::io::Write;

use bytes::BytesMut;
use tokio_util::codec::Encoder;

use crate::codec::EncodeError;
use crate::protocol::PayloadItem;

/// Encodes a `Transfer-Encoding: chunked` upload. `Eof` writes the final
/// zero-sized chunk; anything after that is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedEncoder {
    eof: bool,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { eof: false }
    }
}

impl Encoder<PayloadItem> for ChunkedEncoder {
    type Error = EncodeError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(bytes) => {
                // an empty chunk would read as the terminator on the wire
                if bytes.is_empty() {
                    return Ok(());
                }
                write!(helper::Writer(dst), "{:X}\r\n", bytes.len()).map_err(EncodeError::from)?;
                dst.reserve(bytes.len() + 2);
                dst.extend_from_slice(&bytes[..]);
                dst.extend_from_slice(b"\r\n");
                Ok(())
            }
            // uploads never carry a trailer section
            PayloadItem::Trailers(_) => Ok(()),
            PayloadItem::Eof => {
                self.eof = true;
                dst.extend_from_slice(b"0\r\n\r\n");
                Ok(())
            }
        }
    }
}

mod helper {
    use bytes::{BufMut, BytesMut};
    use std::io;

    pub struct Writer<'a>(pub &'a mut BytesMut);

    impl<'a> io::Write for Writer<'a> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.put_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
