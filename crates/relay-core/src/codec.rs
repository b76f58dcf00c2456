//! Length-prefixed JSON framing as `tokio_util` codecs.
//!
//! [`FrameCodec`] is the server side (decodes [`Message`], encodes
//! [`JobResult`]); [`ClientCodec`] is the mirror image used by clients and
//! tests.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::errors::{FrameError, Result};
use crate::message::{JobResult, Message};

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Default ceiling on a single frame payload (16 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Split one complete frame payload off the front of `src`.
///
/// Returns `Ok(None)` when more bytes are needed.
fn split_frame(src: &mut BytesMut, max: usize) -> Result<Option<BytesMut>> {
    if src.len() < LENGTH_PREFIX_BYTES {
        src.reserve(LENGTH_PREFIX_BYTES - src.len());
        return Ok(None);
    }

    let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
    prefix.copy_from_slice(&src[..LENGTH_PREFIX_BYTES]);
    #[allow(clippy::cast_possible_truncation)]
    let len = u32::from_be_bytes(prefix) as usize;
    if len > max {
        return Err(FrameError::FrameTooLarge { len, max });
    }

    let total = LENGTH_PREFIX_BYTES + len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(LENGTH_PREFIX_BYTES);
    Ok(Some(src.split_to(len)))
}

/// Like [`split_frame`], but leftover bytes at end of stream are an error.
fn split_frame_eof(src: &mut BytesMut, max: usize) -> Result<Option<BytesMut>> {
    match split_frame(src, max)? {
        Some(frame) => Ok(Some(frame)),
        None if src.is_empty() => Ok(None),
        None => {
            let expected = if src.len() < LENGTH_PREFIX_BYTES {
                LENGTH_PREFIX_BYTES
            } else {
                let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
                prefix.copy_from_slice(&src[..LENGTH_PREFIX_BYTES]);
                #[allow(clippy::cast_possible_truncation)]
                let len = u32::from_be_bytes(prefix) as usize;
                LENGTH_PREFIX_BYTES + len
            };
            Err(FrameError::Truncated {
                expected,
                available: src.len(),
            })
        }
    }
}

/// Write `payload` with its length prefix.
fn put_frame(payload: &[u8], dst: &mut BytesMut, max: usize) -> Result<()> {
    if payload.len() > max || u32::try_from(payload.len()).is_err() {
        return Err(FrameError::FrameTooLarge {
            len: payload.len(),
            max,
        });
    }
    dst.reserve(LENGTH_PREFIX_BYTES + payload.len());
    #[allow(clippy::cast_possible_truncation)]
    dst.put_u32(payload.len() as u32);
    dst.extend_from_slice(payload);
    Ok(())
}

/// Encode a single result as a standalone frame.
pub fn encode_result(result: &JobResult) -> Result<Bytes> {
    let payload = serde_json::to_vec(result).map_err(FrameError::Encode)?;
    let mut buf = BytesMut::new();
    put_frame(&payload, &mut buf, usize::MAX)?;
    Ok(buf.freeze())
}

/// Server-side codec: decodes [`Message`], encodes [`JobResult`].
#[derive(Clone, Debug)]
pub struct FrameCodec {
    max_frame_bytes: usize,
}

impl FrameCodec {
    /// Codec with the default frame limit.
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    /// Codec with a custom frame limit.
    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        split_frame(src, self.max_frame_bytes)?
            .map(|frame| Message::from_json(&frame))
            .transpose()
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        split_frame_eof(src, self.max_frame_bytes)?
            .map(|frame| Message::from_json(&frame))
            .transpose()
    }
}

impl Encoder<JobResult> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: JobResult, dst: &mut BytesMut) -> Result<()> {
        let payload = serde_json::to_vec(&item).map_err(FrameError::Encode)?;
        put_frame(&payload, dst, self.max_frame_bytes)
    }
}

/// Client-side codec: encodes [`Message`], decodes [`JobResult`].
#[derive(Clone, Debug)]
pub struct ClientCodec {
    max_frame_bytes: usize,
}

impl ClientCodec {
    /// Codec with the default frame limit.
    pub fn new() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl Default for ClientCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ClientCodec {
    type Item = JobResult;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<JobResult>> {
        split_frame(src, self.max_frame_bytes)?
            .map(|frame| serde_json::from_slice(&frame).map_err(FrameError::InvalidJson))
            .transpose()
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<JobResult>> {
        split_frame_eof(src, self.max_frame_bytes)?
            .map(|frame| serde_json::from_slice(&frame).map_err(FrameError::InvalidJson))
            .transpose()
    }
}

impl Encoder<Message> for ClientCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let payload = item.to_json()?;
        put_frame(&payload, dst, self.max_frame_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Command;
    use assert_matches::assert_matches;
    use futures::StreamExt;
    use tokio_util::codec::FramedRead;

    fn frame(json: &str) -> BytesMut {
        let mut buf = BytesMut::new();
        put_frame(json.as_bytes(), &mut buf, usize::MAX).unwrap();
        buf
    }

    #[test]
    fn decodes_complete_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = frame(r#"{"kind":"QUERY","data":"foo"}"#);
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            msg,
            Message::Query {
                id: None,
                data: "foo".into()
            }
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_prefix() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0u8, 0][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn waits_for_body() {
        let mut codec = FrameCodec::new();
        let full = frame(r#"{"kind":"COMMAND","command":"heartbeat"}"#);
        let mut buf = BytesMut::from(&full[..full.len() - 3]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&full[full.len() - 3..]);
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg, Message::Command(Command::Heartbeat));
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let mut codec = FrameCodec::new();
        let mut buf = frame(r#"{"kind":"DATA","id":"a","data":"5"}"#);
        buf.extend_from_slice(&frame(r#"{"kind":"DATA","id":"a","data":"hello"}"#));
        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_matches!(first, Message::Data { data, .. } if data == "5");
        assert_matches!(second, Message::Data { data, .. } if data == "hello");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn rejects_oversized_prefix() {
        let mut codec = FrameCodec::with_max_frame_bytes(8);
        let mut buf = frame(r#"{"kind":"QUERY","data":"too long"}"#);
        assert_matches!(
            codec.decode(&mut buf),
            Err(FrameError::FrameTooLarge { max: 8, .. })
        );
    }

    #[test]
    fn eof_mid_body_is_truncated() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(100);
        buf.extend_from_slice(b"{\"kind\"");
        assert_matches!(
            codec.decode_eof(&mut buf),
            Err(FrameError::Truncated {
                expected: 104,
                available: 11
            })
        );
    }

    #[test]
    fn eof_mid_prefix_is_truncated() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0u8, 0, 1][..]);
        assert_matches!(
            codec.decode_eof(&mut buf),
            Err(FrameError::Truncated {
                expected: 4,
                available: 3
            })
        );
    }

    #[test]
    fn clean_eof_is_end_of_stream() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn bad_payload_surfaces_message_error() {
        let mut codec = FrameCodec::new();
        let mut buf = frame(r#"{"kind":"NOPE"}"#);
        assert_matches!(codec.decode(&mut buf), Err(FrameError::UnknownKind(_)));
    }

    #[test]
    fn encodes_result_with_prefix() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(JobResult::document("a", vec![1.0, 2.5]), &mut buf)
            .unwrap();
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(len, buf.len() - LENGTH_PREFIX_BYTES);
        let value: serde_json::Value = serde_json::from_slice(&buf[4..]).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"id": "a", "isQuery": false, "vector": [1.0, 2.5]})
        );
    }

    #[test]
    fn encode_result_standalone_matches_codec() {
        let result = JobResult::query(None, vec![0.25]);
        let standalone = encode_result(&result).unwrap();
        let mut buf = BytesMut::new();
        FrameCodec::new().encode(result, &mut buf).unwrap();
        assert_eq!(&standalone[..], &buf[..]);
    }

    #[test]
    fn client_codec_reads_server_output() {
        let mut server = FrameCodec::new();
        let mut client = ClientCodec::new();
        let mut buf = BytesMut::new();
        let result = JobResult::query(Some("q".into()), vec![0.5, 0.25]);
        server.encode(result.clone(), &mut buf).unwrap();
        assert_eq!(client.decode(&mut buf).unwrap(), Some(result));
    }

    #[test]
    fn client_codec_writes_server_input() {
        let mut server = FrameCodec::new();
        let mut client = ClientCodec::new();
        let mut buf = BytesMut::new();
        let msg = Message::Command(Command::Close);
        client.encode(msg.clone(), &mut buf).unwrap();
        assert_eq!(server.decode(&mut buf).unwrap(), Some(msg));
    }

    #[tokio::test]
    async fn framed_read_over_split_stream() {
        let bytes = frame(r#"{"kind":"QUERY","data":"foo"}"#);
        let (head, tail) = bytes.split_at(5);
        let reader = tokio_test_reader(head.to_vec(), tail.to_vec());
        let mut framed = FramedRead::new(reader, FrameCodec::new());
        let msg = framed.next().await.unwrap().unwrap();
        assert_eq!(msg.kind(), "QUERY");
        assert!(framed.next().await.is_none());
    }

    #[tokio::test]
    async fn framed_read_reports_truncation() {
        let mut bytes = BytesMut::new();
        bytes.put_u32(50);
        bytes.extend_from_slice(b"{}");
        let reader = tokio_test_reader(bytes.to_vec(), Vec::new());
        let mut framed = FramedRead::new(reader, FrameCodec::new());
        assert_matches!(
            framed.next().await,
            Some(Err(FrameError::Truncated { .. }))
        );
    }

    /// A reader that yields `first`, then `second`, then EOF.
    fn tokio_test_reader(first: Vec<u8>, second: Vec<u8>) -> impl tokio::io::AsyncRead + Unpin {
        use tokio::io::AsyncReadExt;
        AsyncReadExt::chain(std::io::Cursor::new(first), std::io::Cursor::new(second))
    }
}
