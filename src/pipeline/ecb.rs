use crate::error::{BundleError, Result};
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Bytes pulled from the wrapped reader per poll
const READ_CHUNK: usize = 8 * 1024;

/// Direction of a cipher stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    Encrypt,
    Decrypt,
}

/// AES-128 in ECB mode with PKCS#7 padding, no IV
///
/// Identical plaintext blocks under the same key produce identical
/// ciphertext blocks. Kept for compatibility with existing bundles.
#[derive(Clone)]
pub struct EcbCipher {
    cipher: Aes128,
    mode: CipherMode,
}

impl EcbCipher {
    pub fn new(key: &[u8; 16], mode: CipherMode) -> Self {
        Self {
            cipher: Aes128::new(GenericArray::from_slice(key)),
            mode,
        }
    }

    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    /// Run the block cipher over whole blocks in place
    fn apply_blocks(&self, data: &mut [u8]) {
        debug_assert_eq!(data.len() % BLOCK_SIZE, 0);
        for block in data.chunks_exact_mut(BLOCK_SIZE) {
            let block = GenericArray::from_mut_slice(block);
            match self.mode {
                CipherMode::Encrypt => self.cipher.encrypt_block(block),
                CipherMode::Decrypt => self.cipher.decrypt_block(block),
            }
        }
    }

    /// One-shot transform of a complete message
    pub fn process(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.mode {
            CipherMode::Encrypt => {
                let mut out = pad(data);
                self.apply_blocks(&mut out);
                Ok(out)
            }
            CipherMode::Decrypt => {
                if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
                    return Err(BundleError::Cipher(format!(
                        "ciphertext length {} is not a positive multiple of {}",
                        data.len(),
                        BLOCK_SIZE
                    )));
                }
                let mut out = data.to_vec();
                self.apply_blocks(&mut out);
                unpad(&mut out)?;
                Ok(out)
            }
        }
    }
}

fn pad(data: &[u8]) -> Vec<u8> {
    let fill = BLOCK_SIZE - data.len() % BLOCK_SIZE;
    let mut out = Vec::with_capacity(data.len() + fill);
    out.extend_from_slice(data);
    out.resize(data.len() + fill, fill as u8);
    out
}

fn unpad(data: &mut Vec<u8>) -> Result<()> {
    let fill = data.last().copied().unwrap_or(0) as usize;
    if fill == 0 || fill > BLOCK_SIZE || fill > data.len() {
        return Err(BundleError::Cipher("bad decrypt: invalid padding".into()));
    }
    if !data[data.len() - fill..].iter().all(|&b| b as usize == fill) {
        return Err(BundleError::Cipher("bad decrypt: invalid padding".into()));
    }
    data.truncate(data.len() - fill);
    Ok(())
}

/// Streaming ECB stage over an async reader
///
/// Encryption emits whole blocks as soon as they are available and pads at
/// end of input. Decryption holds back the last block until end of input so
/// the padding can be stripped.
pub struct EcbReader<R> {
    inner: R,
    cipher: EcbCipher,
    pending: Vec<u8>,
    output: Vec<u8>,
    out_pos: usize,
    eof: bool,
}

impl<R> EcbReader<R> {
    pub fn new(inner: R, cipher: EcbCipher) -> Self {
        Self {
            inner,
            cipher,
            pending: Vec::with_capacity(READ_CHUNK + BLOCK_SIZE),
            output: Vec::new(),
            out_pos: 0,
            eof: false,
        }
    }

    fn drain_blocks(&mut self) {
        let ready_len = match self.cipher.mode {
            CipherMode::Encrypt => self.pending.len() / BLOCK_SIZE * BLOCK_SIZE,
            CipherMode::Decrypt if self.pending.len() > BLOCK_SIZE => {
                (self.pending.len() - 1) / BLOCK_SIZE * BLOCK_SIZE
            }
            CipherMode::Decrypt => 0,
        };
        if ready_len == 0 {
            return;
        }
        let mut blocks: Vec<u8> = self.pending.drain(..ready_len).collect();
        self.cipher.apply_blocks(&mut blocks);
        self.output.extend_from_slice(&blocks);
    }

    fn finish(&mut self) -> Result<()> {
        let tail = std::mem::take(&mut self.pending);
        let out = self.cipher.process(&tail)?;
        self.output.extend_from_slice(&out);
        self.eof = true;
        Ok(())
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for EcbReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if this.out_pos < this.output.len() {
                let n = buf.remaining().min(this.output.len() - this.out_pos);
                buf.put_slice(&this.output[this.out_pos..this.out_pos + n]);
                this.out_pos += n;
                if this.out_pos == this.output.len() {
                    this.output.clear();
                    this.out_pos = 0;
                }
                return Poll::Ready(Ok(()));
            }
            if this.eof {
                return Poll::Ready(Ok(()));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let mut chunk_buf = ReadBuf::new(&mut chunk);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut chunk_buf))?;
            let filled = chunk_buf.filled();
            if filled.is_empty() {
                this.finish().map_err(BundleError::into_io)?;
            } else {
                this.pending.extend_from_slice(filled);
                this.drain_blocks();
            }
        }
    }
}
