//! Source side of the entry protocol.
//!
//! Every format adapter describes its bundle as a [`Manifest`] produced by a
//! deferred initialization future. [`BundleReader`] owns that future and the
//! `Initializing → Ready | Failed` lifecycle, and turns the manifest into the
//! ordered entry sequence.

use crate::entry::{Content, Entry, FileEntry, PropsPayload};
use crate::error::{BundleError, Result};
use crate::props::{BundleProps, PropValue};
use crate::resolver::BundleType;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Options accepted by every source constructor
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    /// Bundle file or directory
    pub path: PathBuf,
    /// Explicit format; sniffed from `path` when absent
    pub bundle_type: Option<BundleType>,
    /// Caller-supplied bundle info for formats that do not store it
    pub info: Option<BundleProps>,
    /// Caller-supplied bundle properties for formats that do not store them
    pub props: Option<BundleProps>,
    /// Keep stored properties as opaque ciphertext instead of parsing them
    pub encrypted: bool,
}

impl SourceOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// Producer of an ordered entry sequence
#[async_trait]
pub trait BundleSource: Send {
    /// Wait for deferred initialization to finish
    async fn ready(&mut self) -> Result<()>;

    /// Next entry, or `None` once `End` has been yielded
    async fn next_entry(&mut self) -> Result<Option<Entry>>;

    /// Bundle info. Requires [`BundleSource::ready`] to have completed.
    fn info(&self) -> Result<&BundleProps>;

    /// Bundle properties. Requires [`BundleSource::ready`] to have completed.
    fn props(&self) -> Result<&PropsPayload>;

    /// Bundle paths of all files, in emission order
    fn files(&self) -> Result<&[String]>;

    fn files_count(&self) -> Result<usize> {
        Ok(self.files()?.len())
    }
}

/// One file as discovered during initialization
#[derive(Debug)]
pub struct ManifestFile {
    pub bundle_path: String,
    pub props: Option<PropsPayload>,
    pub content: Content,
}

/// Everything a source learns from its deferred metadata load
#[derive(Debug)]
pub struct Manifest {
    pub info: BundleProps,
    pub props: PropsPayload,
    pub files: Vec<ManifestFile>,
}

struct Loaded {
    info: BundleProps,
    props: PropsPayload,
    paths: Vec<String>,
    pending: VecDeque<ManifestFile>,
}

enum Lifecycle {
    Initializing(BoxFuture<'static, Result<Manifest>>),
    Ready(Loaded),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Info,
    Props,
    Files,
    Done,
}

/// Lifecycle-managed source shared by all format adapters
pub struct BundleReader {
    format: &'static str,
    state: Lifecycle,
    cursor: Cursor,
}

impl BundleReader {
    /// Wrap a deferred manifest load; nothing runs until the first await
    pub fn new(format: &'static str, init: BoxFuture<'static, Result<Manifest>>) -> Self {
        Self {
            format,
            state: Lifecycle::Initializing(init),
            cursor: Cursor::Info,
        }
    }

    /// Source over a manifest that is already known
    pub fn from_manifest(format: &'static str, manifest: Manifest) -> Self {
        Self::new(format, Box::pin(async move { Ok(manifest) }))
    }

    pub fn format(&self) -> &'static str {
        self.format
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, Lifecycle::Ready(_))
    }

    fn loaded(&self) -> Result<&Loaded> {
        match &self.state {
            Lifecycle::Ready(loaded) => Ok(loaded),
            Lifecycle::Initializing(_) => Err(BundleError::NotReady),
            Lifecycle::Failed(msg) => Err(BundleError::InitFailed(msg.clone())),
        }
    }
}

#[async_trait]
impl BundleSource for BundleReader {
    async fn ready(&mut self) -> Result<()> {
        let init = match std::mem::replace(&mut self.state, Lifecycle::Failed(String::new())) {
            Lifecycle::Initializing(init) => init,
            Lifecycle::Failed(msg) => {
                self.state = Lifecycle::Failed(msg.clone());
                return Err(BundleError::InitFailed(msg));
            }
            ready @ Lifecycle::Ready(_) => {
                self.state = ready;
                return Ok(());
            }
        };

        match init.await {
            Ok(manifest) => {
                let paths = manifest
                    .files
                    .iter()
                    .map(|f| f.bundle_path.clone())
                    .collect::<Vec<_>>();
                debug!(format = self.format, files = paths.len(), "bundle source ready");
                self.state = Lifecycle::Ready(Loaded {
                    info: manifest.info,
                    props: manifest.props,
                    paths,
                    pending: manifest.files.into(),
                });
                Ok(())
            }
            Err(e) => {
                self.state = Lifecycle::Failed(e.to_string());
                Err(e)
            }
        }
    }

    async fn next_entry(&mut self) -> Result<Option<Entry>> {
        self.ready().await?;
        let Lifecycle::Ready(loaded) = &mut self.state else {
            return Err(BundleError::NotReady);
        };

        let entry = match self.cursor {
            Cursor::Info => {
                self.cursor = Cursor::Props;
                Entry::BundleInfo(loaded.info.clone())
            }
            Cursor::Props => {
                self.cursor = Cursor::Files;
                Entry::BundleProps(loaded.props.clone())
            }
            Cursor::Files => match loaded.pending.pop_front() {
                Some(file) => Entry::File(FileEntry {
                    bundle_path: file.bundle_path,
                    content: file.content,
                    props: file.props,
                }),
                None => {
                    self.cursor = Cursor::Done;
                    Entry::End
                }
            },
            Cursor::Done => return Ok(None),
        };
        Ok(Some(entry))
    }

    fn info(&self) -> Result<&BundleProps> {
        Ok(&self.loaded()?.info)
    }

    fn props(&self) -> Result<&PropsPayload> {
        Ok(&self.loaded()?.props)
    }

    fn files(&self) -> Result<&[String]> {
        Ok(&self.loaded()?.paths)
    }
}

/// Fail fast when the backing path is missing
pub fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(BundleError::NotFound(path.to_path_buf()))
    }
}

/// `{size: <bytes>}` per-file properties
pub fn size_props(size: u64) -> Result<PropsPayload> {
    let size = PropValue::try_from(size)?;
    Ok(PropsPayload::Plain(BundleProps::from_mapping([("size", size)])))
}
