#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tcp_client::FrameCodec;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from(data);

    match codec.decode(&mut buf) {
        // A frame is a verbatim prefix; only an incomplete character may remain.
        Ok(Some(frame)) => {
            assert!(data.starts_with(frame.as_bytes()));
            assert_eq!(frame.len() + buf.len(), data.len());
            assert!(buf.len() < 4);
        }
        Ok(None) => assert!(buf.len() < 4),
        Err(_) => {}
    }

    let _ = codec.decode_eof(&mut buf);
    assert!(buf.is_empty());
});
