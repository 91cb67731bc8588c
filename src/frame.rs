//! Pass-through frame transform between raw socket bytes and strings.
//!
//! No delimiter scanning or length prefix is applied: whatever one read event
//! leaves in the buffer becomes one frame, and one outbound string becomes one
//! write. A response split across several TCP segments may therefore surface
//! as several frames. A multibyte character cut by a segment boundary is
//! held back until the rest of it arrives, so frames are always whole text.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

/// [`Decoder`]/[`Encoder`] that maps each I/O event to a UTF-8 `String` verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let valid = match std::str::from_utf8(src) {
            Ok(_) => src.len(),
            // A multibyte character cut by the read: keep its head for the next event.
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                // Returning an error would end the framed stream; drop the bytes instead.
                warn!(len = src.len(), "dropping frame that is not valid UTF-8: {e}");
                src.clear();
                return Ok(None);
            }
        };
        if valid == 0 {
            return Ok(None);
        }

        let bytes = src.split_to(valid);
        let frame = std::str::from_utf8(&bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Some(frame.to_owned()))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !buf.is_empty() {
                    warn!(len = buf.len(), "dropping truncated UTF-8 sequence at end of stream");
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<String> for FrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_yields_no_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn whole_buffer_becomes_one_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from("line one\nline two\n");
        let frame = codec.decode(&mut buf).unwrap();
        assert_eq!(frame.as_deref(), Some("line one\nline two\n"));
        assert!(buf.is_empty());
    }

    #[test]
    fn invalid_utf8_is_dropped_without_error() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0xff, 0xfe, 0xfd][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());

        // The codec keeps working after a dropped frame.
        buf.extend_from_slice(b"ok");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("ok"));
    }

    #[test]
    fn multibyte_text_is_preserved() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from("héllo wörld ✓");
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("héllo wörld ✓")
        );
    }

    #[test]
    fn character_split_across_reads_is_reassembled() {
        let mut codec = FrameCodec::new();
        let text = "héllo".as_bytes();
        let mut buf = BytesMut::from(&text[..2]);

        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("h"));
        assert_eq!(&buf[..], &text[1..2]);

        buf.extend_from_slice(&text[2..]);
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("éllo"));
        assert!(buf.is_empty());
    }

    #[test]
    fn lone_partial_character_waits_for_more_bytes() {
        let mut codec = FrameCodec::new();
        let check = "✓".as_bytes();
        let mut buf = BytesMut::from(&check[..2]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 2);

        buf.extend_from_slice(&check[2..]);
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("✓"));
    }

    #[test]
    fn truncated_character_at_eof_is_dropped() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&"é".as_bytes()[..1]);
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_writes_bytes_verbatim() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("ping".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"ping");
    }

    #[test]
    fn encode_empty_payload_writes_nothing() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(String::new(), &mut buf).unwrap();
        assert!(buf.is_empty());
    }
}
