use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("IO error: {0}")]
    Io(std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Can't resolve index file in {}", .0.display())]
    IndexResolution(PathBuf),

    #[error("Type of content is not supported: {0}")]
    UnsupportedContent(String),

    #[error("Invalid key length: {0} bits. Must be exactly 256")]
    InvalidKey(usize),

    #[error("Cipher error: {0}")]
    Cipher(String),

    #[error("Entry order violation: {0}")]
    Protocol(String),

    #[error("Bundle is not initialized yet")]
    NotReady,

    #[error("Bundle initialization failed: {0}")]
    InitFailed(String),

    #[error("Unknown bundle type: {0}")]
    UnknownType(String),

    #[error("Bundle type {bundle_type} does not support {mission}")]
    UnsupportedOperation {
        bundle_type: String,
        mission: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl BundleError {
    /// Wrap this error for transport through an `std::io` byte stream
    pub fn into_io(self) -> std::io::Error {
        match self {
            BundleError::Io(e) => e,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}

// Errors raised inside content readers come back wrapped in io::Error;
// unwrap them so a cipher failure still reports as a cipher failure.
impl From<std::io::Error> for BundleError {
    fn from(e: std::io::Error) -> Self {
        let is_bundle = e
            .get_ref()
            .map(|inner| inner.is::<BundleError>())
            .unwrap_or(false);
        if is_bundle {
            if let Some(inner) = e.into_inner() {
                if let Ok(bundle) = inner.downcast::<BundleError>() {
                    return *bundle;
                }
            }
            return BundleError::Cipher("stream failure".into());
        }
        BundleError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, BundleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_roundtrip_keeps_cipher_variant() {
        let io = BundleError::Cipher("bad padding".into()).into_io();
        match BundleError::from(io) {
            BundleError::Cipher(msg) => assert_eq!(msg, "bad padding"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_plain_io_stays_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(BundleError::from(io), BundleError::Io(_)));
    }
}
