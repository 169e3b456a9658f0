//! Streaming AES-256-CBC encryption and decryption.
//!
//! The cipher itself is a black box — RustCrypto's `aes`/`cbc` crates do the actual
//! block math. What lives here is the streaming discipline: bounded-memory chunked
//! I/O, a CBC decryptor/encryptor kept alive across chunk boundaries, and manual
//! PKCS7 padding applied only once, at the true end of the plaintext.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{DfsError, DfsResult};

pub const KEY_SIZE: usize = 32;
pub const IV_SIZE: usize = 16;
pub const BLOCK_SIZE: usize = 16;

/// Bounded read chunk; always a multiple of `BLOCK_SIZE` so block boundaries line up.
const CHUNK_SIZE: usize = 8 * 1024;

type CbcEncryptor = cbc::Encryptor<Aes256>;
type CbcDecryptor = cbc::Decryptor<Aes256>;

/// Draws 16 cryptographically random bytes for use as a per-frame IV.
pub fn generate_iv() -> DfsResult<[u8; IV_SIZE]> {
    let mut iv = [0u8; IV_SIZE];
    rand::rngs::OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| DfsError::Crypto(format!("failed to generate IV: {e}")))?;
    Ok(iv)
}

fn validate_params(key: &[u8], iv: &[u8]) -> DfsResult<()> {
    if key.len() != KEY_SIZE {
        return Err(DfsError::InvalidParameters(format!(
            "key must be {KEY_SIZE} bytes, got {}",
            key.len()
        )));
    }
    if iv.len() != IV_SIZE {
        return Err(DfsError::InvalidParameters(format!(
            "IV must be {IV_SIZE} bytes, got {}",
            iv.len()
        )));
    }
    Ok(())
}

/// Encrypts `reader` into `writer` under AES-256-CBC, applying PKCS7 padding to the
/// final block. Returns the number of ciphertext bytes written.
pub async fn encrypt<R, W>(mut reader: R, mut writer: W, key: &[u8], iv: &[u8]) -> DfsResult<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    validate_params(key, iv)?;
    let mut cipher = CbcEncryptor::new(GenericArray::from_slice(key), GenericArray::from_slice(iv));

    let mut carry: Vec<u8> = Vec::with_capacity(CHUNK_SIZE + BLOCK_SIZE);
    let mut read_buf = [0u8; CHUNK_SIZE];
    let mut written: u64 = 0;

    loop {
        let n = reader
            .read(&mut read_buf)
            .await
            .map_err(|e| DfsError::Io(e.to_string()))?;
        if n == 0 {
            break;
        }
        carry.extend_from_slice(&read_buf[..n]);

        // Keep at least one full block buffered: we don't yet know whether it's
        // the final block that needs padding.
        while carry.len() > BLOCK_SIZE {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(&carry[..BLOCK_SIZE]);
            cipher.encrypt_block_mut(GenericArray::from_mut_slice(&mut block));
            writer
                .write_all(&block)
                .await
                .map_err(|e| DfsError::Io(e.to_string()))?;
            written += BLOCK_SIZE as u64;
            carry.drain(..BLOCK_SIZE);
        }
    }

    let pad_len = BLOCK_SIZE - (carry.len() % BLOCK_SIZE);
    let pad_len = if pad_len == 0 { BLOCK_SIZE } else { pad_len };
    carry.resize(carry.len() + pad_len, pad_len as u8);

    for block_bytes in carry.chunks(BLOCK_SIZE) {
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(block_bytes);
        cipher.encrypt_block_mut(GenericArray::from_mut_slice(&mut block));
        writer
            .write_all(&block)
            .await
            .map_err(|e| DfsError::Io(e.to_string()))?;
        written += BLOCK_SIZE as u64;
    }

    writer.flush().await.map_err(|e| DfsError::Io(e.to_string()))?;
    Ok(written)
}

/// Decrypts `reader` into `writer`, stripping PKCS7 padding from the final block.
/// Fails with `Crypto` if the ciphertext is not a multiple of the block size or the
/// final block's padding is malformed (wrong key, wrong IV, or truncated data).
pub async fn decrypt<R, W>(mut reader: R, mut writer: W, key: &[u8], iv: &[u8]) -> DfsResult<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    validate_params(key, iv)?;
    let mut cipher = CbcDecryptor::new(GenericArray::from_slice(key), GenericArray::from_slice(iv));

    let mut carry: Vec<u8> = Vec::with_capacity(CHUNK_SIZE + BLOCK_SIZE);
    let mut read_buf = [0u8; CHUNK_SIZE];
    let mut written: u64 = 0;

    loop {
        let n = reader
            .read(&mut read_buf)
            .await
            .map_err(|e| DfsError::Io(e.to_string()))?;
        if n == 0 {
            break;
        }
        carry.extend_from_slice(&read_buf[..n]);

        while carry.len() > BLOCK_SIZE {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(&carry[..BLOCK_SIZE]);
            cipher.decrypt_block_mut(GenericArray::from_mut_slice(&mut block));
            writer
                .write_all(&block)
                .await
                .map_err(|e| DfsError::Io(e.to_string()))?;
            written += BLOCK_SIZE as u64;
            carry.drain(..BLOCK_SIZE);
        }
    }

    if carry.len() != BLOCK_SIZE {
        return Err(DfsError::Crypto(
            "ciphertext length is not a multiple of the block size".into(),
        ));
    }

    let mut final_block = [0u8; BLOCK_SIZE];
    final_block.copy_from_slice(&carry);
    cipher.decrypt_block_mut(GenericArray::from_mut_slice(&mut final_block));

    let pad_len = *final_block.last().unwrap() as usize;
    if pad_len == 0 || pad_len > BLOCK_SIZE || !final_block[BLOCK_SIZE - pad_len..].iter().all(|&b| b as usize == pad_len) {
        return Err(DfsError::Crypto(
            "invalid PKCS7 padding: wrong key, wrong IV, or truncated data".into(),
        ));
    }

    let plaintext_tail = &final_block[..BLOCK_SIZE - pad_len];
    writer
        .write_all(plaintext_tail)
        .await
        .map_err(|e| DfsError::Io(e.to_string()))?;
    written += plaintext_tail.len() as u64;

    writer.flush().await.map_err(|e| DfsError::Io(e.to_string()))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn key() -> [u8; KEY_SIZE] {
        [0x42u8; KEY_SIZE]
    }

    #[tokio::test]
    async fn round_trips_plaintext() {
        let iv = generate_iv().unwrap();
        let plaintext = b"the quick brown fox jumps over the lazy dog".to_vec();

        let mut ciphertext = Vec::new();
        encrypt(Cursor::new(plaintext.clone()), &mut ciphertext, &key(), &iv)
            .await
            .unwrap();

        let mut decrypted = Vec::new();
        decrypt(Cursor::new(ciphertext), &mut decrypted, &key(), &iv)
            .await
            .unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[tokio::test]
    async fn empty_plaintext_yields_one_padding_block() {
        let iv = generate_iv().unwrap();
        let mut ciphertext = Vec::new();
        encrypt(Cursor::new(Vec::new()), &mut ciphertext, &key(), &iv)
            .await
            .unwrap();
        assert_eq!(ciphertext.len(), BLOCK_SIZE);

        let mut decrypted = Vec::new();
        decrypt(Cursor::new(ciphertext), &mut decrypted, &key(), &iv)
            .await
            .unwrap();
        assert!(decrypted.is_empty());
    }

    #[tokio::test]
    async fn ciphertext_length_follows_padding_formula() {
        let iv = generate_iv().unwrap();
        for plaintext_len in [0usize, 1, 15, 16, 17, 8 * 1024, 8 * 1024 + 1] {
            let plaintext = vec![0xABu8; plaintext_len];
            let mut ciphertext = Vec::new();
            encrypt(Cursor::new(plaintext), &mut ciphertext, &key(), &iv)
                .await
                .unwrap();
            let expected = ((plaintext_len + 1).div_ceil(BLOCK_SIZE)) * BLOCK_SIZE;
            assert_eq!(ciphertext.len(), expected, "mismatch for len {plaintext_len}");
        }
    }

    #[tokio::test]
    async fn wrong_key_fails_padding_check() {
        let iv = generate_iv().unwrap();
        let mut ciphertext = Vec::new();
        encrypt(Cursor::new(b"hello".to_vec()), &mut ciphertext, &key(), &iv)
            .await
            .unwrap();

        let wrong_key = [0x24u8; KEY_SIZE];
        let mut decrypted = Vec::new();
        let err = decrypt(Cursor::new(ciphertext), &mut decrypted, &wrong_key, &iv)
            .await
            .unwrap_err();
        assert!(matches!(err, DfsError::Crypto(_)));
    }

    #[tokio::test]
    async fn rejects_key_of_wrong_size() {
        let iv = generate_iv().unwrap();
        let short_key = [0u8; 16];
        let err = encrypt(Cursor::new(Vec::new()), Vec::new(), &short_key, &iv)
            .await
            .unwrap_err();
        assert!(matches!(err, DfsError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn rejects_iv_of_wrong_size() {
        let short_iv = [0u8; 8];
        let err = encrypt(Cursor::new(Vec::new()), Vec::new(), &key(), &short_iv)
            .await
            .unwrap_err();
        assert!(matches!(err, DfsError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn truncated_ciphertext_fails() {
        let iv = generate_iv().unwrap();
        let mut ciphertext = Vec::new();
        encrypt(Cursor::new(b"hello world".to_vec()), &mut ciphertext, &key(), &iv)
            .await
            .unwrap();
        ciphertext.truncate(ciphertext.len() - 1);

        let mut decrypted = Vec::new();
        let err = decrypt(Cursor::new(ciphertext), &mut decrypted, &key(), &iv)
            .await
            .unwrap_err();
        assert!(matches!(err, DfsError::Crypto(_)));
    }
}
