//! Sink side of the entry protocol.

use crate::entry::{Entry, EntryOrder, PropsPayload};
use crate::error::Result;
use crate::props::{BundleProps, PropValue};
use crate::resolver::BundleType;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

/// Options accepted by every sink constructor
#[derive(Debug, Clone, Default)]
pub struct SinkOptions {
    /// Destination file or directory
    pub path: PathBuf,
    /// Explicit format; sniffed from `path` when absent
    pub bundle_type: Option<BundleType>,
    /// Extra info merged over the streamed bundle info (binary container only)
    pub info: Option<BundleProps>,
}

impl SinkOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// Consumer of an ordered entry sequence
///
/// A sink finalizes its destination when it receives `End` and only then
/// reports [`BundleSink::is_finished`].
#[async_trait]
pub trait BundleSink: Send {
    async fn write_entry(&mut self, entry: Entry) -> Result<()>;

    fn is_finished(&self) -> bool;
}

/// What an [`InspectSink`] saw for one file
#[derive(Debug, Clone)]
pub struct InspectedFile {
    pub bundle_path: String,
    pub props: Option<PropsPayload>,
    pub size: u64,
}

/// Records every entry it receives; file content is drained, not kept
#[derive(Debug, Default)]
pub struct InspectSink {
    order: EntryOrder,
    pub info: Option<BundleProps>,
    pub props: Option<PropsPayload>,
    pub files: Vec<InspectedFile>,
}

impl InspectSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BundleSink for InspectSink {
    async fn write_entry(&mut self, entry: Entry) -> Result<()> {
        self.order.check(&entry)?;
        match entry {
            Entry::BundleInfo(info) => self.info = Some(info),
            Entry::BundleProps(props) => self.props = Some(props),
            Entry::File(file) => {
                let mut reader = file.content.open().await?;
                let mut buf = vec![0u8; 64 * 1024];
                let mut size = 0u64;
                loop {
                    let n = reader.read(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    size += n as u64;
                }
                self.files.push(InspectedFile {
                    bundle_path: file.bundle_path,
                    props: file.props,
                    size,
                });
            }
            Entry::End => {}
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.order.is_ended()
    }
}

/// Main file declared in bundle properties
pub fn main_file(props: &BundleProps) -> Option<&str> {
    props.get("main_file").and_then(PropValue::as_str)
}
