//! Plain ZIP archives holding the bundle files at their own paths.

use super::zip_io::{entry_content, list_entries, ZipPackWriter};
use crate::entry::{Entry, EntryOrder};
use crate::error::{BundleError, Result};
use crate::props::BundleProps;
use crate::sink::{BundleSink, SinkOptions};
use crate::source::{ensure_exists, size_props, BundleReader, Manifest, ManifestFile, SourceOptions};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

pub const FORMAT: &str = "zip";

/// Index files tried, in order, when no bundle properties are supplied
const INDEX_CANDIDATES: [&str; 2] = ["index.pdf", "index.html"];

pub fn open_source(opts: &SourceOptions) -> Result<BundleReader> {
    ensure_exists(&opts.path)?;
    let path = opts.path.clone();
    let info = opts.info.clone().unwrap_or_default();
    let props = opts.props.clone();
    Ok(BundleReader::new(
        FORMAT,
        Box::pin(load(path, info, props)),
    ))
}

async fn load(path: PathBuf, info: BundleProps, props: Option<BundleProps>) -> Result<Manifest> {
    let listing = list_entries(&path).await?;
    let props = match props {
        Some(props) => props,
        None => {
            let main_file = INDEX_CANDIDATES
                .iter()
                .find(|candidate| listing.iter().any(|e| !e.is_dir && e.name == **candidate))
                .ok_or_else(|| BundleError::IndexResolution(path.clone()))?;
            debug!(main_file, "index file inferred");
            BundleProps::from_mapping([("main_file", *main_file)])
        }
    };

    let files = listing
        .into_iter()
        .filter(|e| !e.is_dir)
        .map(|e| {
            Ok(ManifestFile {
                props: Some(size_props(e.size)?),
                content: entry_content(path.clone(), e.name.clone()),
                bundle_path: e.name,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Manifest {
        info,
        props: props.into(),
        files,
    })
}

/// Writes every file at its bundle path; metadata is not stored
pub struct ZipSink {
    order: EntryOrder,
    writer: ZipPackWriter,
    finished: bool,
}

impl ZipSink {
    pub async fn create(opts: &SinkOptions) -> Result<Self> {
        Ok(Self {
            order: EntryOrder::new(),
            writer: ZipPackWriter::create(&opts.path).await?,
            finished: false,
        })
    }
}

#[async_trait]
impl BundleSink for ZipSink {
    async fn write_entry(&mut self, entry: Entry) -> Result<()> {
        self.order.check(&entry)?;
        match entry {
            Entry::File(file) => {
                let size = self.writer.add_content(&file.bundle_path, file.content).await?;
                debug!(path = %file.bundle_path, size, "zip entry written");
            }
            Entry::End => {
                self.writer.finish().await?;
                self.finished = true;
                debug!(path = %self.writer.path().display(), "zip finalized");
            }
            Entry::BundleInfo(_) | Entry::BundleProps(_) => {}
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}
