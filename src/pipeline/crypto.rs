use super::ecb::{CipherMode, EcbCipher, EcbReader};
use super::Transform;
use crate::entry::{ContentReader, Entry, FileEntry, PropsPayload};
use crate::error::{BundleError, Result};
use crate::props::BundleProps;
use sha1::{Digest, Sha1};
use std::fmt;

/// Master key length in bytes (256 bits)
pub const MASTER_KEY_SIZE: usize = 32;

/// Per-path key length in bytes (AES-128)
pub const DERIVED_KEY_SIZE: usize = 16;

/// Salt used for bundle-level properties
pub const PROPS_SALT: &str = "AES";

/// 256-bit master secret shared by all entries of a bundle
#[derive(Clone, PartialEq, Eq)]
pub struct MasterKey([u8; MASTER_KEY_SIZE]);

impl MasterKey {
    pub fn from_slice(key: &[u8]) -> Result<Self> {
        let bytes: [u8; MASTER_KEY_SIZE] = key
            .try_into()
            .map_err(|_| BundleError::InvalidKey(key.len() * 8))?;
        Ok(Self(bytes))
    }

    /// Parse a hex-encoded key as given on the command line
    pub fn from_hex(key: &str) -> Result<Self> {
        let bytes = hex::decode(key.trim())
            .map_err(|e| BundleError::InvalidArgument(format!("key is not hex: {}", e)))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; MASTER_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Derive the AES-128 key for one salt
///
/// `SHA1(master || 0x00000001 || salt)` truncated to 16 bytes: a single
/// PBKDF2-style block with one iteration, kept bit-compatible with
/// bundles already in circulation.
pub fn derive_key(master: &MasterKey, salt: &str) -> [u8; DERIVED_KEY_SIZE] {
    let mut hasher = Sha1::new();
    hasher.update(master.as_bytes());
    hasher.update(1u32.to_be_bytes());
    hasher.update(salt.as_bytes());
    let digest = hasher.finalize();

    let mut key = [0u8; DERIVED_KEY_SIZE];
    key.copy_from_slice(&digest[..DERIVED_KEY_SIZE]);
    key
}

/// Pipeline stage that encrypts or decrypts file content and properties
///
/// Each file is keyed by its own bundle path; bundle properties use
/// [`PROPS_SALT`]. Bundle info always passes through untouched.
pub struct CryptoTransform {
    key: MasterKey,
    mode: CipherMode,
}

impl CryptoTransform {
    pub fn new(key: MasterKey, mode: CipherMode) -> Self {
        Self { key, mode }
    }

    pub fn encrypt(key: MasterKey) -> Self {
        Self::new(key, CipherMode::Encrypt)
    }

    pub fn decrypt(key: MasterKey) -> Self {
        Self::new(key, CipherMode::Decrypt)
    }

    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    fn cipher(&self, salt: &str) -> EcbCipher {
        EcbCipher::new(&derive_key(&self.key, salt), self.mode)
    }

    /// Seal or open a properties payload under `salt`
    pub fn transform_props(&self, salt: &str, payload: PropsPayload) -> Result<PropsPayload> {
        let cipher = self.cipher(salt);
        match (self.mode, payload) {
            (CipherMode::Encrypt, PropsPayload::Plain(props)) => Ok(PropsPayload::Sealed(
                cipher.process(props.to_canonical_text().as_bytes())?,
            )),
            // Already opaque bytes: sealed again as-is
            (CipherMode::Encrypt, PropsPayload::Sealed(data)) => {
                Ok(PropsPayload::Sealed(cipher.process(&data)?))
            }
            (CipherMode::Decrypt, PropsPayload::Sealed(data)) => {
                let plain = cipher.process(&data)?;
                Ok(PropsPayload::Plain(BundleProps::from_canonical_bytes(&plain)?))
            }
            (CipherMode::Decrypt, plain @ PropsPayload::Plain(_)) => Ok(plain),
        }
    }

    fn transform_file(&self, file: FileEntry) -> Result<FileEntry> {
        let props = file
            .props
            .map(|p| self.transform_props(&file.bundle_path, p))
            .transpose()?;
        let cipher = self.cipher(&file.bundle_path);
        let content = file
            .content
            .map_reader(move |inner| Box::pin(EcbReader::new(inner, cipher)) as ContentReader);
        Ok(FileEntry {
            bundle_path: file.bundle_path,
            content,
            props,
        })
    }
}

impl fmt::Debug for CryptoTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoTransform")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Transform for CryptoTransform {
    fn apply(&mut self, entry: Entry) -> Result<Entry> {
        match entry {
            Entry::BundleProps(payload) => Ok(Entry::BundleProps(
                self.transform_props(PROPS_SALT, payload)?,
            )),
            Entry::File(file) => Ok(Entry::File(self.transform_file(file)?)),
            other => Ok(other),
        }
    }
}
