//! Bundle archive on ZIP (`.aggregion`).
//!
//! Bundle info and properties live in fixed metadata entries; bundle files
//! live under the `data/` prefix.

use super::zip_io::{entry_content, list_entries, read_entry, ZipPackWriter};
use crate::entry::{Entry, EntryOrder, PropsPayload};
use crate::error::{BundleError, Result};
use crate::props::BundleProps;
use crate::sink::{BundleSink, SinkOptions};
use crate::source::{ensure_exists, size_props, BundleReader, Manifest, ManifestFile, SourceOptions};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const FORMAT: &str = "aggregion";

pub const INFO_ENTRY: &str = "meta/.bundleinfo";
pub const PROPS_ENTRY: &str = "meta/.bundleprops";
pub const DATA_PREFIX: &str = "data/";

pub fn open_source(opts: &SourceOptions) -> Result<BundleReader> {
    ensure_exists(&opts.path)?;
    Ok(BundleReader::new(
        FORMAT,
        Box::pin(load(opts.path.clone(), opts.encrypted)),
    ))
}

async fn required_entry(path: &Path, name: &str) -> Result<Vec<u8>> {
    read_entry(path, name)
        .await?
        .ok_or_else(|| BundleError::Parse(format!("archive has no {} entry", name)))
}

async fn load(path: PathBuf, encrypted: bool) -> Result<Manifest> {
    let info = BundleProps::from_canonical_bytes(&required_entry(&path, INFO_ENTRY).await?)?;
    let props = PropsPayload::from_stored(&required_entry(&path, PROPS_ENTRY).await?, encrypted)?;

    let files = list_entries(&path)
        .await?
        .into_iter()
        .filter(|e| !e.is_dir)
        .filter_map(|e| {
            let bundle_path = e.name.strip_prefix(DATA_PREFIX)?.to_string();
            Some(size_props(e.size).map(|props| ManifestFile {
                bundle_path,
                props: Some(props),
                content: entry_content(path.clone(), e.name),
            }))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Manifest { info, props, files })
}

pub struct ArchiveSink {
    order: EntryOrder,
    writer: ZipPackWriter,
    finished: bool,
}

impl ArchiveSink {
    pub async fn create(opts: &SinkOptions) -> Result<Self> {
        Ok(Self {
            order: EntryOrder::new(),
            writer: ZipPackWriter::create(&opts.path).await?,
            finished: false,
        })
    }
}

#[async_trait]
impl BundleSink for ArchiveSink {
    async fn write_entry(&mut self, entry: Entry) -> Result<()> {
        self.order.check(&entry)?;
        match entry {
            Entry::BundleInfo(info) => {
                self.writer
                    .add_bytes(INFO_ENTRY, info.to_canonical_text().into_bytes())
                    .await
            }
            Entry::BundleProps(props) => self.writer.add_bytes(PROPS_ENTRY, props.to_bytes()).await,
            Entry::File(file) => {
                let name = format!("{}{}", DATA_PREFIX, file.bundle_path);
                self.writer.add_content(&name, file.content).await?;
                Ok(())
            }
            Entry::End => {
                self.writer.finish().await?;
                self.finished = true;
                debug!(path = %self.writer.path().display(), "archive finalized");
                Ok(())
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}
