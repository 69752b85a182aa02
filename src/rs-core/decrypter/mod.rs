use std::collections::VecDeque;

use aes::cipher::{
    block_padding::Pkcs7, generic_array::GenericArray, BlockDecryptMut, KeyIvInit,
};
use thiserror::Error;

use crate::environment::{DecryptionId, Decrypter};
use crate::Logger;

/// Maximum amount of bytes decrypted for a job in one `AesDecrypter::run_step` call.
pub const DECRYPTION_CHUNK_SIZE: usize = 32_000;

const BLOCK_SIZE: usize = 16;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum DecryptionError {
    #[error("Invalid AES-128 key length: {0}")]
    InvalidKeyLength(usize),
    #[error("Invalid initialization vector length: {0}")]
    InvalidIvLength(usize),
    #[error("Encrypted data of {0} bytes is not made of whole AES blocks")]
    InvalidInputLength(usize),
    #[error("Invalid PKCS#7 padding")]
    Padding,
}

/// AES-128-CBC decryption of a whole segment performed in successive steps, so a big segment
/// does not block everything else while being decrypted.
pub struct ChunkedDecryption {
    /// `None` once finished.
    decryptor: Option<Aes128CbcDec>,

    /// Data being decrypted in place.
    data: Vec<u8>,

    /// Amount of bytes already decrypted.
    position: usize,
}

impl ChunkedDecryption {
    pub fn new(encrypted: Vec<u8>, key: &[u8], iv: &[u8]) -> Result<Self, DecryptionError> {
        if key.len() != BLOCK_SIZE {
            return Err(DecryptionError::InvalidKeyLength(key.len()));
        }
        if iv.len() != BLOCK_SIZE {
            return Err(DecryptionError::InvalidIvLength(iv.len()));
        }
        if encrypted.is_empty() || encrypted.len() % BLOCK_SIZE != 0 {
            return Err(DecryptionError::InvalidInputLength(encrypted.len()));
        }
        Ok(Self {
            decryptor: Some(Aes128CbcDec::new(key.into(), iv.into())),
            data: encrypted,
            position: 0,
        })
    }

    /// Decrypt up to `max_bytes` more bytes, rounded down to whole AES blocks (at least one).
    ///
    /// Returns the decrypted data, without its padding, once the last block has been
    /// decrypted. `None` is returned while there is still data to decrypt, and after the
    /// result has been returned.
    pub fn step(&mut self, max_bytes: usize) -> Option<Result<Vec<u8>, DecryptionError>> {
        let chunk_size = (max_bytes / BLOCK_SIZE).max(1) * BLOCK_SIZE;
        let remaining = self.data.len() - self.position;
        if remaining > chunk_size {
            let decryptor = self.decryptor.as_mut()?;
            let chunk = &mut self.data[self.position..self.position + chunk_size];
            for block in chunk.chunks_exact_mut(BLOCK_SIZE) {
                decryptor.decrypt_block_mut(GenericArray::from_mut_slice(block));
            }
            self.position += chunk_size;
            return None;
        }

        let decryptor = self.decryptor.take()?;
        let tail = &mut self.data[self.position..];
        let unpadded_len = match decryptor.decrypt_padded_mut::<Pkcs7>(tail) {
            Ok(decrypted) => decrypted.len(),
            Err(_) => return Some(Err(DecryptionError::Padding)),
        };
        let mut decrypted = std::mem::take(&mut self.data);
        decrypted.truncate(self.position + unpadded_len);
        Some(Ok(decrypted))
    }

    pub fn is_finished(&self) -> bool {
        self.decryptor.is_none()
    }
}

/// Native `Decrypter`, decrypting its jobs step by step each time `run_step` is called.
pub struct AesDecrypter {
    jobs: VecDeque<(DecryptionId, ChunkedDecryption)>,

    /// Jobs which failed before their first step.
    rejected: Vec<(DecryptionId, DecryptionError)>,

    chunk_size: usize,
}

impl Default for AesDecrypter {
    fn default() -> Self {
        Self::new(DECRYPTION_CHUNK_SIZE)
    }
}

impl AesDecrypter {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            jobs: VecDeque::new(),
            rejected: vec![],
            chunk_size,
        }
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.jobs.is_empty() || !self.rejected.is_empty()
    }

    /// Advance the next job by one chunk, jobs taking turns.
    ///
    /// Returns the jobs which ended, to communicate to `SegmentLoader::on_decrypted`.
    pub fn run_step(&mut self) -> Vec<(DecryptionId, Result<Vec<u8>, DecryptionError>)> {
        let mut ended: Vec<_> = self
            .rejected
            .drain(..)
            .map(|(id, err)| (id, Err(err)))
            .collect();
        if let Some((id, mut job)) = self.jobs.pop_front() {
            match job.step(self.chunk_size) {
                Some(result) => ended.push((id, result)),
                None => self.jobs.push_back((id, job)),
            }
        }
        ended
    }
}

impl Decrypter for AesDecrypter {
    fn decrypt(&mut self, id: DecryptionId, encrypted: Vec<u8>, key: [u8; 16], iv: [u8; 16]) {
        match ChunkedDecryption::new(encrypted, &key, &iv) {
            Ok(job) => self.jobs.push_back((id, job)),
            Err(err) => {
                Logger::warn(&format!("Decrypter: rejected job {}: {}", id, err));
                self.rejected.push((id, err));
            }
        }
    }
}
