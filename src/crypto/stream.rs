//! Fixed-block encryption of byte streams.
//!
//! Plaintext is cut into [`PLAIN_BLOCK_SIZE`] blocks and every block is sealed
//! independently, so a sealed block is always [`SEALED_BLOCK_SIZE`] bytes
//! (only the last block may be shorter). The decrypt side reads matching
//! sealed blocks without ever buffering the whole file.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::crypto::aes::{self, CryptoError, SecretKey, SEAL_OVERHEAD};

/// Plaintext bytes per block.
pub const PLAIN_BLOCK_SIZE: usize = 256;
/// Size of one sealed block (nonce + ciphertext + tag).
pub const SEALED_BLOCK_SIZE: usize = PLAIN_BLOCK_SIZE + SEAL_OVERHEAD;

/// Errors from the stream variant: either the cipher or the underlying I/O.
#[derive(thiserror::Error, Debug)]
pub enum StreamCryptoError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads until `buf` is full or the reader is exhausted.
async fn read_block<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Encrypts everything from `reader` into `writer`, block by block.
///
/// Returns the number of sealed bytes written.
pub async fn encrypt_stream<R, W>(
    reader: &mut R,
    writer: &mut W,
    key: &SecretKey,
) -> Result<u64, StreamCryptoError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut block = [0u8; PLAIN_BLOCK_SIZE];
    let mut written = 0u64;

    loop {
        let n = read_block(reader, &mut block).await?;
        if n == 0 {
            break;
        }

        let sealed = aes::encrypt(&block[..n], key)?;
        writer.write_all(&sealed).await?;
        written += sealed.len() as u64;

        if n < PLAIN_BLOCK_SIZE {
            break;
        }
    }

    writer.flush().await?;
    Ok(written)
}

/// Reverses [`encrypt_stream`]. Any block failing authentication aborts the
/// whole operation.
///
/// Blocks are sealed independently, so whole sealed blocks dropped from the
/// end of the stream go unnoticed and yield a shorter plaintext.
///
/// Returns the number of plaintext bytes written.
pub async fn decrypt_stream<R, W>(
    reader: &mut R,
    writer: &mut W,
    key: &SecretKey,
) -> Result<u64, StreamCryptoError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut block = vec![0u8; SEALED_BLOCK_SIZE];
    let mut written = 0u64;

    loop {
        let n = read_block(reader, &mut block).await?;
        if n == 0 {
            break;
        }

        let plain = aes::decrypt(&block[..n], key)?;
        writer.write_all(&plain).await?;
        written += plain.len() as u64;

        if n < SEALED_BLOCK_SIZE {
            break;
        }
    }

    writer.flush().await?;
    Ok(written)
}
