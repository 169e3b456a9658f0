//! Wire framing: MessageFrame layout, and the Codec that serializes/deserializes
//! frames over the encrypted payload produced by [`crate::crypto_stream`].
//!
//! ```text
//! offset  size  field
//!   0     16    iv
//!  16      1    message_type
//!  17      4    source_id            (big-endian u32)
//!  21      4    filename_length      (big-endian u32)
//!  25      8    payload_size         (big-endian u64)
//!  33      N    ciphertext_payload   (N = payload_size)
//! ```

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::channel::Channel;
use crate::crypto_stream::{self, IV_SIZE};
use crate::error::{DfsError, DfsResult};

/// Header size in bytes, per the wire layout above.
pub const HEADER_SIZE: usize = 33;

/// Reference cap on `payload_size`; frames over this are rejected before the
/// ciphertext is even read.
pub const MAX_PAYLOAD_SIZE: u64 = 1024 * 1024 * 1024;

/// The two message kinds this store's wire protocol carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    StoreFile,
    GetFile,
}

impl MessageType {
    fn to_byte(self) -> u8 {
        match self {
            MessageType::StoreFile => 0,
            MessageType::GetFile => 1,
        }
    }

    fn from_byte(byte: u8) -> DfsResult<Self> {
        match byte {
            0 => Ok(MessageType::StoreFile),
            1 => Ok(MessageType::GetFile),
            other => Err(DfsError::Network(format!("unknown message_type byte {other}"))),
        }
    }
}

/// A fully-decoded frame: header fields plus the decrypted plaintext payload.
#[derive(Debug, Clone)]
pub struct MessageFrame {
    pub iv: [u8; IV_SIZE],
    pub message_type: MessageType,
    pub source_id: u32,
    pub filename_length: u32,
    pub payload: Vec<u8>,
}

impl MessageFrame {
    pub fn filename(&self) -> &[u8] {
        &self.payload[..self.filename_length as usize]
    }

    pub fn contents(&self) -> &[u8] {
        &self.payload[self.filename_length as usize..]
    }
}

/// Serializes frames to, and deserializes frames from, the wire, encrypting and
/// decrypting payloads in-line via [`crate::crypto_stream`].
///
/// Stateless aside from the `key`; safe to share across connections. Deserialized
/// frames are pushed onto the supplied [`Channel`] before `deserialize` returns —
/// that push is serialized by the channel's own lock, so the codec needs no lock
/// of its own.
#[derive(Debug, Clone)]
pub struct Codec {
    key: [u8; crypto_stream::KEY_SIZE],
}

impl Codec {
    pub fn new(key: [u8; crypto_stream::KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Encrypts `plaintext` and writes the full frame (header + ciphertext) to
    /// `writer`. Returns the total number of bytes written.
    pub async fn serialize<W>(
        &self,
        writer: &mut W,
        message_type: MessageType,
        source_id: u32,
        filename_length: u32,
        plaintext: &[u8],
    ) -> DfsResult<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let iv = crypto_stream::generate_iv()?;

        let mut ciphertext = Vec::new();
        crypto_stream::encrypt(plaintext, &mut ciphertext, &self.key, &iv).await?;

        let mut header = [0u8; HEADER_SIZE];
        header[0..16].copy_from_slice(&iv);
        header[16] = message_type.to_byte();
        header[17..21].copy_from_slice(&source_id.to_be_bytes());
        header[21..25].copy_from_slice(&filename_length.to_be_bytes());
        header[25..33].copy_from_slice(&(ciphertext.len() as u64).to_be_bytes());

        writer
            .write_all(&header)
            .await
            .map_err(|e| DfsError::Io(e.to_string()))?;
        writer
            .write_all(&ciphertext)
            .await
            .map_err(|e| DfsError::Io(e.to_string()))?;
        writer.flush().await.map_err(|e| DfsError::Io(e.to_string()))?;

        Ok(HEADER_SIZE as u64 + ciphertext.len() as u64)
    }

    /// Reads and decodes a single frame from `reader`, pushing the decoded frame
    /// onto `channel` before returning it. A decryption failure discards the
    /// frame: nothing is pushed onto the channel in that case.
    pub async fn deserialize<R>(&self, reader: &mut R, channel: &Arc<Channel>) -> DfsResult<MessageFrame>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; HEADER_SIZE];
        reader
            .read_exact(&mut header)
            .await
            .map_err(|e| DfsError::Io(e.to_string()))?;

        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&header[0..16]);
        let message_type = MessageType::from_byte(header[16])?;
        let source_id = u32::from_be_bytes(header[17..21].try_into().unwrap());
        let filename_length = u32::from_be_bytes(header[21..25].try_into().unwrap());
        let payload_size = u64::from_be_bytes(header[25..33].try_into().unwrap());

        if payload_size > MAX_PAYLOAD_SIZE {
            return Err(DfsError::FrameTooLarge {
                size: payload_size,
                limit: MAX_PAYLOAD_SIZE,
            });
        }

        let mut ciphertext = vec![0u8; payload_size as usize];
        reader
            .read_exact(&mut ciphertext)
            .await
            .map_err(|e| DfsError::Io(e.to_string()))?;

        let mut plaintext = Vec::new();
        crypto_stream::decrypt(ciphertext.as_slice(), &mut plaintext, &self.key, &iv).await?;

        if filename_length as usize > plaintext.len() {
            return Err(DfsError::Network(
                "filename_length exceeds decrypted payload length".into(),
            ));
        }

        let frame = MessageFrame {
            iv,
            message_type,
            source_id,
            filename_length,
            payload: plaintext,
        };

        channel.push(frame.clone()).await;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; crypto_stream::KEY_SIZE] {
        [0x11u8; crypto_stream::KEY_SIZE]
    }

    #[tokio::test]
    async fn round_trips_a_frame() {
        let codec = Codec::new(key());
        let channel = Arc::new(Channel::new());

        let filename = b"report.txt";
        let contents = b"hello distributed world";
        let mut plaintext = Vec::new();
        plaintext.extend_from_slice(filename);
        plaintext.extend_from_slice(contents);

        let mut wire = Vec::new();
        codec
            .serialize(&mut wire, MessageType::StoreFile, 7, filename.len() as u32, &plaintext)
            .await
            .unwrap();

        let mut cursor = wire.as_slice();
        let frame = codec.deserialize(&mut cursor, &channel).await.unwrap();

        assert_eq!(frame.message_type, MessageType::StoreFile);
        assert_eq!(frame.source_id, 7);
        assert_eq!(frame.filename(), filename);
        assert_eq!(frame.contents(), contents);
        assert_eq!(channel.len().await, 1);
    }

    #[tokio::test]
    async fn rejects_filename_length_greater_than_payload() {
        let codec = Codec::new(key());
        let channel = Arc::new(Channel::new());

        let plaintext = b"short".to_vec();
        let mut wire = Vec::new();
        codec
            .serialize(&mut wire, MessageType::GetFile, 1, 999, &plaintext)
            .await
            .unwrap();

        let mut cursor = wire.as_slice();
        let err = codec.deserialize(&mut cursor, &channel).await.unwrap_err();
        assert!(matches!(err, DfsError::Network(_)));
        assert_eq!(channel.len().await, 0);
    }

    #[tokio::test]
    async fn rejects_payload_size_over_cap() {
        let codec = Codec::new(key());
        let channel = Arc::new(Channel::new());

        let mut header = [0u8; HEADER_SIZE];
        header[25..33].copy_from_slice(&(MAX_PAYLOAD_SIZE + 1).to_be_bytes());
        let mut cursor = header.as_slice();

        let err = codec.deserialize(&mut cursor, &channel).await.unwrap_err();
        assert!(matches!(err, DfsError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn decryption_failure_discards_the_frame() {
        let codec = Codec::new(key());
        let other_codec = Codec::new([0x22u8; crypto_stream::KEY_SIZE]);
        let channel = Arc::new(Channel::new());

        let mut wire = Vec::new();
        codec
            .serialize(&mut wire, MessageType::StoreFile, 1, 0, b"data")
            .await
            .unwrap();

        let mut cursor = wire.as_slice();
        let err = other_codec.deserialize(&mut cursor, &channel).await.unwrap_err();
        assert!(matches!(err, DfsError::Crypto(_)));
        assert_eq!(channel.len().await, 0);
    }

    #[tokio::test]
    async fn unknown_message_type_is_rejected() {
        let codec = Codec::new(key());
        let channel = Arc::new(Channel::new());

        let mut wire = Vec::new();
        codec
            .serialize(&mut wire, MessageType::GetFile, 1, 0, b"x")
            .await
            .unwrap();
        wire[16] = 0xFF;

        let mut cursor = wire.as_slice();
        let err = codec.deserialize(&mut cursor, &channel).await.unwrap_err();
        assert!(matches!(err, DfsError::Network(_)));
    }
}
