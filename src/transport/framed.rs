//! Length-prefixed framing over any async byte stream.
//!
//! A frame is a sequence of segments, each prefixed by a 4-byte big-endian
//! length, terminated by a zero-length segment. Segment boundaries within a
//! frame carry no meaning; receivers see the list of non-empty segments.
//!
//! # Example
//!
//! ```no_run
//! # use reflectrpc::transport::{FramedConfig, FramedStream};
//! # async fn example(stream: tokio::net::TcpStream) -> reflectrpc::Result<()> {
//! let mut framed = FramedStream::new(stream, FramedConfig::default());
//! framed.send(&[bytes::Bytes::from_static(b"payload")]).await?;
//! while let Some(segments) = framed.receive().await? {
//!     // one complete frame
//!     let _ = segments;
//! }
//! // peer closed cleanly between frames
//! # Ok(())
//! # }
//! ```

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, RpcError};

/// Map EOF during a segment body to a mid-frame close.
fn close_mid_frame(err: std::io::Error) -> RpcError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        RpcError::ConnectionClosed
    } else {
        RpcError::Io(err)
    }
}

/// Framing limits.
#[derive(Debug, Clone)]
pub struct FramedConfig {
    /// Largest single segment accepted from the peer, in bytes.
    pub max_segment_size: usize,
}

impl Default for FramedConfig {
    fn default() -> Self {
        Self {
            // 1 GiB, matching the widest payload the engine will buffer.
            max_segment_size: 1024 * 1024 * 1024,
        }
    }
}

/// Frame reader/writer over an async byte stream.
pub struct FramedStream<S> {
    stream: S,
    config: FramedConfig,
    frames_sent: u64,
    frames_received: u64,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FramedStream<S> {
    pub fn new(stream: S, config: FramedConfig) -> Self {
        Self {
            stream,
            config,
            frames_sent: 0,
            frames_received: 0,
        }
    }

    /// Frames written so far.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Frames read so far.
    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    /// Write one frame: every non-empty segment, then the terminator.
    ///
    /// The whole frame is buffered and flushed as a single write. Segments
    /// larger than the configured maximum, or than the 4-byte length prefix
    /// can describe, are rejected before any bytes go out.
    pub async fn send(&mut self, segments: &[Bytes]) -> Result<()> {
        let limit = self.config.max_segment_size.min(u32::MAX as usize);
        if let Some(oversized) = segments.iter().find(|s| s.len() > limit) {
            return Err(RpcError::FrameTooLarge {
                size: oversized.len(),
                max: limit,
            });
        }
        let total: usize = segments.iter().map(|s| s.len() + 4).sum();
        let mut buf = BytesMut::with_capacity(total + 4);
        for segment in segments {
            if segment.is_empty() {
                // An empty segment would read as the terminator.
                continue;
            }
            buf.extend_from_slice(&(segment.len() as u32).to_be_bytes());
            buf.extend_from_slice(segment);
        }
        buf.extend_from_slice(&0u32.to_be_bytes());

        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        self.frames_sent += 1;
        tracing::trace!(segments = segments.len(), bytes = buf.len(), "frame sent");
        Ok(())
    }

    /// Read one frame.
    ///
    /// Returns `Ok(None)` when the peer closed cleanly at a frame boundary.
    /// Close in the middle of a frame is [`RpcError::ConnectionClosed`].
    pub async fn receive(&mut self) -> Result<Option<Vec<Bytes>>> {
        let mut segments = Vec::new();
        loop {
            let at_boundary = segments.is_empty();
            let len = match self.read_header(at_boundary).await? {
                Some(len) => len as usize,
                None => return Ok(None),
            };
            if len == 0 {
                break;
            }
            if len > self.config.max_segment_size {
                return Err(RpcError::FrameTooLarge {
                    size: len,
                    max: self.config.max_segment_size,
                });
            }
            let mut payload = vec![0u8; len];
            self.stream
                .read_exact(&mut payload)
                .await
                .map_err(close_mid_frame)?;
            segments.push(Bytes::from(payload));
        }
        self.frames_received += 1;
        tracing::trace!(segments = segments.len(), "frame received");
        Ok(Some(segments))
    }

    /// Read one 4-byte segment header.
    ///
    /// EOF before the first byte of a frame's first header is a clean close
    /// (`Ok(None)`); EOF anywhere else is mid-frame.
    async fn read_header(&mut self, at_boundary: bool) -> Result<Option<u32>> {
        let mut header = [0u8; 4];
        let mut filled = 0;
        while filled < 4 {
            let n = self.stream.read(&mut header[filled..]).await?;
            if n == 0 {
                if at_boundary && filled == 0 {
                    return Ok(None);
                }
                return Err(RpcError::ConnectionClosed);
            }
            filled += n;
        }
        Ok(Some(u32::from_be_bytes(header)))
    }

    /// Consume the framing layer, returning the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed<S: AsyncRead + AsyncWrite + Unpin>(s: S) -> FramedStream<S> {
        FramedStream::new(s, FramedConfig::default())
    }

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let (a, b) = tokio::io::duplex(4096);
        let mut tx = framed(a);
        let mut rx = framed(b);

        tx.send(&[Bytes::from_static(b"hello"), Bytes::from_static(b"world")])
            .await
            .unwrap();

        let segments = rx.receive().await.unwrap().unwrap();
        assert_eq!(segments, vec![Bytes::from_static(b"hello"), Bytes::from_static(b"world")]);
        assert_eq!(tx.frames_sent(), 1);
        assert_eq!(rx.frames_received(), 1);
    }

    #[tokio::test]
    async fn test_empty_segments_skipped() {
        let (a, b) = tokio::io::duplex(4096);
        let mut tx = framed(a);
        let mut rx = framed(b);

        tx.send(&[Bytes::new(), Bytes::from_static(b"x"), Bytes::new()])
            .await
            .unwrap();

        let segments = rx.receive().await.unwrap().unwrap();
        assert_eq!(segments, vec![Bytes::from_static(b"x")]);
    }

    #[tokio::test]
    async fn test_empty_frame_roundtrip() {
        let (a, b) = tokio::io::duplex(4096);
        let mut tx = framed(a);
        let mut rx = framed(b);

        tx.send(&[]).await.unwrap();
        let segments = rx.receive().await.unwrap().unwrap();
        assert!(segments.is_empty());
    }

    #[tokio::test]
    async fn test_clean_close_between_frames() {
        let (a, b) = tokio::io::duplex(4096);
        let mut tx = framed(a);
        let mut rx = framed(b);

        tx.send(&[Bytes::from_static(b"last")]).await.unwrap();
        drop(tx);

        assert!(rx.receive().await.unwrap().is_some());
        assert!(rx.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_mid_frame_is_error() {
        let (a, b) = tokio::io::duplex(4096);
        let mut rx = framed(b);

        // Header promises 100 bytes, then the writer vanishes.
        let mut a = a;
        a.write_all(&100u32.to_be_bytes()).await.unwrap();
        a.write_all(b"partial").await.unwrap();
        drop(a);

        assert!(matches!(
            rx.receive().await,
            Err(RpcError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_oversized_segment_rejected_on_send() {
        let (a, _b) = tokio::io::duplex(4096);
        let mut tx = FramedStream::new(a, FramedConfig {
            max_segment_size: 8,
        });

        let err = tx
            .send(&[Bytes::from(vec![0u8; 64])])
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::FrameTooLarge { size: 64, max: 8 }));
        // Nothing reached the stream.
        assert_eq!(tx.frames_sent(), 0);
    }

    #[tokio::test]
    async fn test_oversized_segment_rejected() {
        let (a, b) = tokio::io::duplex(4096);
        let mut rx = FramedStream::new(b, FramedConfig {
            max_segment_size: 8,
        });

        let mut a = a;
        a.write_all(&64u32.to_be_bytes()).await.unwrap();

        assert!(matches!(
            rx.receive().await,
            Err(RpcError::FrameTooLarge { size: 64, max: 8 })
        ));
    }
}
