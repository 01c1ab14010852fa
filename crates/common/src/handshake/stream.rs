use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::messages::ClaimMessage;

/// Upper bound on one frame's encoded size
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("stream io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_SIZE} byte cap")]
    FrameTooLarge(u64),
}

/// Length-prefixed message framing over any ordered byte stream
///
/// Each frame is a u32 big-endian length followed by one bincode-encoded
/// [`ClaimMessage`], capped at [`MAX_FRAME_SIZE`]. A clean close of the read
/// side between frames surfaces as `Ok(None)` from [`FramedStream::recv`];
/// mid-frame closes are io errors.
#[derive(Debug)]
pub struct FramedStream<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> FramedStream<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub async fn send(&mut self, message: &ClaimMessage) -> Result<(), StreamError> {
        let bytes =
            bincode::serialize(message).map_err(|e| StreamError::Malformed(e.to_string()))?;
        if bytes.len() as u64 > MAX_FRAME_SIZE as u64 {
            return Err(StreamError::FrameTooLarge(bytes.len() as u64));
        }
        self.writer
            .write_all(&(bytes.len() as u32).to_be_bytes())
            .await?;
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> Result<Option<ClaimMessage>, StreamError> {
        let mut len_bytes = [0u8; 4];
        match self.reader.read_exact(&mut len_bytes).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_be_bytes(len_bytes);
        if len > MAX_FRAME_SIZE {
            return Err(StreamError::FrameTooLarge(len as u64));
        }
        let mut buffer = vec![0u8; len as usize];
        self.reader.read_exact(&mut buffer).await?;
        let message =
            bincode::deserialize(&buffer).map_err(|e| StreamError::Malformed(e.to_string()))?;
        Ok(Some(message))
    }

    /// Flush and close the write side, signalling the end of our half of
    /// the conversation
    pub async fn close(&mut self) -> Result<(), StreamError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::claims::{
        sign_payload, ClaimIdGenerator, ClaimPayload, ClaimType, Digest, SignedClaim,
    };
    use crate::crypto::SecretKey;

    use super::*;

    fn framed_pair() -> (
        FramedStream<tokio::io::ReadHalf<tokio::io::DuplexStream>, tokio::io::WriteHalf<tokio::io::DuplexStream>>,
        FramedStream<tokio::io::ReadHalf<tokio::io::DuplexStream>, tokio::io::WriteHalf<tokio::io::DuplexStream>>,
    ) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);
        (
            FramedStream::new(a_read, a_write),
            FramedStream::new(b_read, b_write),
        )
    }

    fn test_message() -> ClaimMessage {
        let secret_key = SecretKey::generate();
        let payload = ClaimPayload {
            issuer: secret_key.public(),
            claim_id: ClaimIdGenerator::new().next().unwrap(),
            sequence_number: 0,
            prev_digest: Digest::GENESIS,
            claim_type: ClaimType::NodeLink {
                linked_node: SecretKey::generate().public(),
            },
            issued_at: Utc::now(),
        };
        let sig = sign_payload(&payload, &secret_key).unwrap();
        ClaimMessage::SinglySigned(SignedClaim {
            payload,
            signatures: vec![sig],
        })
    }

    #[tokio::test]
    async fn test_send_recv_round_trip() {
        let (mut a, mut b) = framed_pair();
        let message = test_message();

        a.send(&message).await.unwrap();
        let received = b.recv().await.unwrap().unwrap();
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn test_clean_close_yields_none() {
        let (mut a, mut b) = framed_pair();
        a.send(&test_message()).await.unwrap();
        a.close().await.unwrap();

        assert!(b.recv().await.unwrap().is_some());
        assert!(b.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        use tokio::io::AsyncWriteExt;

        let (a, b) = tokio::io::duplex(64 * 1024);
        let (_a_read, mut a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);
        let mut framed = FramedStream::new(b_read, b_write);

        a_write
            .write_all(&(MAX_FRAME_SIZE + 1).to_be_bytes())
            .await
            .unwrap();
        assert!(matches!(
            framed.recv().await,
            Err(StreamError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_garbage_frame_is_malformed() {
        use tokio::io::AsyncWriteExt;

        let (a, b) = tokio::io::duplex(64 * 1024);
        let (_a_read, mut a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);
        let mut framed = FramedStream::new(b_read, b_write);

        let garbage = [0xffu8; 16];
        a_write
            .write_all(&(garbage.len() as u32).to_be_bytes())
            .await
            .unwrap();
        a_write.write_all(&garbage).await.unwrap();
        assert!(matches!(
            framed.recv().await,
            Err(StreamError::Malformed(_))
        ));
    }
}
