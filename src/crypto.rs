//! Stream decryption for encrypted input units.
//!
//! Encrypted units are AES-CBC with PKCS#7 padding. The decryptor is fed arbitrary
//! chunk sizes as they arrive from the network and always withholds the final block
//! until [`StreamDecryptor::finish`] so the padding can be validated and stripped.

use aes::cipher::{BlockDecryptMut, KeyIvInit, generic_array::GenericArray};
use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::types::DecryptionSpec;
use crate::utils::decode_standard;

const BLOCK_LEN: usize = 16;

enum CbcCipher {
    Aes128(cbc::Decryptor<aes::Aes128>),
    Aes192(cbc::Decryptor<aes::Aes192>),
    Aes256(cbc::Decryptor<aes::Aes256>),
}

impl CbcCipher {
    fn new(key: &[u8], iv: &[u8]) -> Result<Self> {
        if iv.len() != BLOCK_LEN {
            return Err(Error::Decryption(format!(
                "IV must be {} bytes, got {}",
                BLOCK_LEN,
                iv.len()
            )));
        }
        let invalid = |_| Error::Decryption("invalid key or IV length".to_string());
        match key.len() {
            16 => Ok(Self::Aes128(
                cbc::Decryptor::<aes::Aes128>::new_from_slices(key, iv).map_err(invalid)?,
            )),
            24 => Ok(Self::Aes192(
                cbc::Decryptor::<aes::Aes192>::new_from_slices(key, iv).map_err(invalid)?,
            )),
            32 => Ok(Self::Aes256(
                cbc::Decryptor::<aes::Aes256>::new_from_slices(key, iv).map_err(invalid)?,
            )),
            n => Err(Error::Decryption(format!(
                "key must be 16, 24 or 32 bytes, got {}",
                n
            ))),
        }
    }

    /// Decrypt whole blocks in place; `data.len()` must be a multiple of the block size
    fn decrypt_blocks(&mut self, data: &mut [u8]) {
        for chunk in data.chunks_exact_mut(BLOCK_LEN) {
            let block: &mut aes::Block = GenericArray::from_mut_slice(chunk);
            match self {
                Self::Aes128(c) => c.decrypt_block_mut(block),
                Self::Aes192(c) => c.decrypt_block_mut(block),
                Self::Aes256(c) => c.decrypt_block_mut(block),
            }
        }
    }
}

struct CbcState {
    cipher: CbcCipher,
    /// Bytes received but not yet decrypted (1..=16 after a non-empty `update`)
    pending: Vec<u8>,
}

/// Optional decryption layer between a fetched byte stream and its scratch file
pub struct StreamDecryptor {
    /// `None` for unencrypted units: bytes pass through untouched
    state: Option<CbcState>,
}

impl StreamDecryptor {
    /// Build the decryptor for a unit's (optional) encryption parameters
    pub fn for_spec(spec: Option<&DecryptionSpec>) -> Result<Self> {
        let Some(spec) = spec else {
            return Ok(Self { state: None });
        };
        let key = decode_standard(&spec.key)?;
        let iv = decode_standard(&spec.iv)?;
        Ok(Self {
            state: Some(CbcState {
                cipher: CbcCipher::new(&key, &iv)?,
                pending: Vec::with_capacity(BLOCK_LEN * 2),
            }),
        })
    }

    /// Whether this decryptor transforms data
    pub fn is_encrypted(&self) -> bool {
        self.state.is_some()
    }

    /// Feed the next chunk, returning the plaintext that is ready to be written
    pub fn update<'a>(&mut self, chunk: &'a [u8]) -> Cow<'a, [u8]> {
        let Some(CbcState { cipher, pending }) = self.state.as_mut() else {
            return Cow::Borrowed(chunk);
        };
        pending.extend_from_slice(chunk);
        // Keep 1..=16 bytes back: the final block carries the padding
        let ready = (pending.len().saturating_sub(1) / BLOCK_LEN) * BLOCK_LEN;
        if ready == 0 {
            return Cow::Owned(Vec::new());
        }
        let mut out: Vec<u8> = pending.drain(..ready).collect();
        cipher.decrypt_blocks(&mut out);
        Cow::Owned(out)
    }

    /// Flush the withheld final block and strip its padding
    pub fn finish(self) -> Result<Vec<u8>> {
        let Some(CbcState {
            mut cipher,
            mut pending,
        }) = self.state
        else {
            return Ok(Vec::new());
        };
        if pending.len() != BLOCK_LEN {
            return Err(Error::Decryption(format!(
                "ciphertext is not a whole number of blocks ({} trailing bytes)",
                pending.len() % BLOCK_LEN
            )));
        }
        cipher.decrypt_blocks(&mut pending);
        let pad = usize::from(pending[BLOCK_LEN - 1]);
        if pad == 0
            || pad > BLOCK_LEN
            || !pending[BLOCK_LEN - pad..]
                .iter()
                .all(|&b| usize::from(b) == pad)
        {
            return Err(Error::Decryption("invalid PKCS#7 padding".to_string()));
        }
        pending.truncate(BLOCK_LEN - pad);
        Ok(pending)
    }
}
