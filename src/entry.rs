//! Entry protocol shared by every source, transform and sink.
//!
//! A bundle always streams as:
//!
//! ```text
//! BundleInfo → BundleProps → File* → End
//! ```

use crate::error::{BundleError, Result};
use crate::props::BundleProps;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::io::Cursor;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Readable byte stream behind a file entry
pub type ContentReader = Pin<Box<dyn AsyncRead + Send>>;

type Opener = Box<dyn FnOnce() -> BoxFuture<'static, Result<ContentReader>> + Send>;

/// Lazily-opened handle to a file's bytes
///
/// Nothing is opened until [`Content::open`] is awaited, so a source can hand
/// out many entries without holding many descriptors.
pub struct Content {
    opener: Opener,
}

impl Content {
    pub fn new<F, Fut>(open: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<ContentReader>> + Send + 'static,
    {
        Self {
            opener: Box::new(move || open().boxed()),
        }
    }

    /// Content held in memory
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self::new(move || async move { Ok(Box::pin(Cursor::new(data)) as ContentReader) })
    }

    /// Content of a file on the local filesystem
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new(move || async move {
            let file = tokio::fs::File::open(&path).await?;
            Ok(Box::pin(file) as ContentReader)
        })
    }

    /// Open the underlying stream
    pub async fn open(self) -> Result<ContentReader> {
        (self.opener)().await
    }

    /// Wrap the stream that will be opened later
    pub fn map_reader<F>(self, wrap: F) -> Self
    where
        F: FnOnce(ContentReader) -> ContentReader + Send + 'static,
    {
        let opener = self.opener;
        Self::new(move || async move { Ok(wrap(opener().await?)) })
    }

    /// Open and drain the whole stream into memory
    pub async fn read_to_end(self) -> Result<Vec<u8>> {
        let mut reader = self.open().await?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        Ok(data)
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Content { .. }")
    }
}

/// Properties that are either structured or still encrypted
#[derive(Debug, Clone, PartialEq)]
pub enum PropsPayload {
    Plain(BundleProps),
    /// Ciphertext of the canonical text
    Sealed(Vec<u8>),
}

impl PropsPayload {
    /// Interpret stored bytes; encrypted bundles keep them opaque
    pub fn from_stored(data: &[u8], encrypted: bool) -> Result<Self> {
        if encrypted {
            Ok(PropsPayload::Sealed(data.to_vec()))
        } else {
            Ok(PropsPayload::Plain(BundleProps::from_canonical_bytes(data)?))
        }
    }

    /// Bytes to persist
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            PropsPayload::Plain(props) => props.to_canonical_text().into_bytes(),
            PropsPayload::Sealed(data) => data.clone(),
        }
    }

    pub fn as_plain(&self) -> Option<&BundleProps> {
        match self {
            PropsPayload::Plain(props) => Some(props),
            PropsPayload::Sealed(_) => None,
        }
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self, PropsPayload::Sealed(_))
    }
}

impl From<BundleProps> for PropsPayload {
    fn from(props: BundleProps) -> Self {
        PropsPayload::Plain(props)
    }
}

/// One file inside a bundle
#[derive(Debug)]
pub struct FileEntry {
    /// Relative, `/`-separated path inside the bundle
    pub bundle_path: String,
    pub content: Content,
    pub props: Option<PropsPayload>,
}

/// Unit of the streaming protocol
#[derive(Debug)]
pub enum Entry {
    BundleInfo(BundleProps),
    BundleProps(PropsPayload),
    File(FileEntry),
    End,
}

impl Entry {
    pub fn kind(&self) -> &'static str {
        match self {
            Entry::BundleInfo(_) => "bundle info",
            Entry::BundleProps(_) => "bundle properties",
            Entry::File(_) => "file",
            Entry::End => "end",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    ExpectInfo,
    ExpectProps,
    Files,
    Ended,
}

/// Enforces `BundleInfo → BundleProps → File* → End`
#[derive(Debug, Clone)]
pub struct EntryOrder {
    stage: Stage,
    files: usize,
}

impl Default for EntryOrder {
    fn default() -> Self {
        Self {
            stage: Stage::ExpectInfo,
            files: 0,
        }
    }
}

impl EntryOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept the next entry or report where the topology broke
    pub fn check(&mut self, entry: &Entry) -> Result<()> {
        let next = match (self.stage, entry) {
            (Stage::ExpectInfo, Entry::BundleInfo(_)) => Stage::ExpectProps,
            (Stage::ExpectProps, Entry::BundleProps(_)) => Stage::Files,
            (Stage::Files, Entry::File(_)) => {
                self.files += 1;
                Stage::Files
            }
            (Stage::Files, Entry::End) => Stage::Ended,
            (Stage::Ended, _) => {
                return Err(BundleError::Protocol(format!(
                    "{} received after end",
                    entry.kind()
                )))
            }
            (stage, _) => {
                return Err(BundleError::Protocol(format!(
                    "unexpected {} while waiting for {}",
                    entry.kind(),
                    match stage {
                        Stage::ExpectInfo => "bundle info",
                        Stage::ExpectProps => "bundle properties",
                        _ => "file or end",
                    }
                )))
            }
        };
        self.stage = next;
        Ok(())
    }

    pub fn is_ended(&self) -> bool {
        self.stage == Stage::Ended
    }

    /// Files accepted so far
    pub fn files(&self) -> usize {
        self.files
    }
}
