//! `tokio_util` codec over the IVG wire format.
//!
//! [`IvgCodec`] lets async code consume a stream with
//! `FramedRead<_, IvgCodec>` instead of the poll-based
//! [`StreamReceiver`](crate::StreamReceiver). Decoding shares the
//! framer, so resynchronisation and tail retention are identical.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::IvgError;
use crate::stream::encoder::EncodedFrame;
use crate::stream::framer::next_frame;
use crate::stream::types::DecodedFrame;

#[derive(Debug, Default, Clone, Copy)]
pub struct IvgCodec;

impl Decoder for IvgCodec {
    type Item = DecodedFrame;
    type Error = IvgError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(next_frame(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // A torn frame or marker tail at end of stream is dropped, not an error.
        let frame = next_frame(src);
        if frame.is_none() {
            src.clear();
        }
        Ok(frame)
    }
}

impl Encoder<EncodedFrame> for IvgCodec {
    type Error = IvgError;

    fn encode(&mut self, item: EncodedFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.write_to(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::encoder::FrameEncoder;
    use crate::stream::types::RgbFrame;
    use futures::StreamExt;
    use tokio_util::codec::FramedRead;

    fn frame(w: u32, h: u32, fill: u8) -> RgbFrame {
        RgbFrame::rgb(w, h, vec![fill; (w * h * 3) as usize]).unwrap()
    }

    #[test]
    fn encoder_writes_header_and_payload() {
        let enc = FrameEncoder::new();
        let encoded = enc.encode_frame(&frame(3, 3, 90)).unwrap();
        let expected = encoded.to_bytes();

        let mut dst = BytesMut::new();
        IvgCodec.encode(encoded, &mut dst).unwrap();
        assert_eq!(&dst[..], &expected[..]);
    }

    #[test]
    fn decode_waits_for_complete_frame() {
        let bytes = FrameEncoder::new().encode(&frame(4, 2, 10)).unwrap();
        let mut src = BytesMut::from(&bytes[..bytes.len() - 1]);
        assert!(IvgCodec.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(&bytes[bytes.len() - 1..]);
        let decoded = IvgCodec.decode(&mut src).unwrap().unwrap();
        assert_eq!((decoded.width, decoded.height), (4, 2));
        assert!(src.is_empty());
    }

    #[tokio::test]
    async fn framed_read_yields_every_frame() {
        let enc = FrameEncoder::new();
        let mut wire = vec![0x00, 0xA5, 0x13];
        for fill in [0u8, 128, 255] {
            wire.extend_from_slice(&enc.encode(&frame(6, 6, fill)).unwrap());
        }
        // Truncated tail of a fourth frame.
        let extra = enc.encode(&frame(6, 6, 1)).unwrap();
        wire.extend_from_slice(&extra[..9]);

        let reader = FramedRead::new(wire.as_slice(), IvgCodec);
        let frames: Vec<_> = reader.collect().await;
        assert_eq!(frames.len(), 3);

        let ids: Vec<u32> = frames.into_iter().map(|f| f.unwrap().frame_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
