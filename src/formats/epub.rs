//! EPUB publications (read only).

use super::zip_io::{entry_content, list_entries};
use crate::error::{BundleError, Result};
use crate::props::BundleProps;
use crate::source::{ensure_exists, size_props, BundleReader, Manifest, ManifestFile, SourceOptions};
use std::path::PathBuf;

pub const FORMAT: &str = "epub";

const PACKAGE_SUFFIX: &str = "content.opf";

pub fn open_source(opts: &SourceOptions) -> Result<BundleReader> {
    ensure_exists(&opts.path)?;
    Ok(BundleReader::new(FORMAT, Box::pin(load(opts.path.clone()))))
}

async fn load(path: PathBuf) -> Result<Manifest> {
    let listing = list_entries(&path).await?;
    let mut files = Vec::new();
    let mut package = None;
    for entry in listing.into_iter().filter(|e| !e.is_dir && e.size > 0) {
        if entry.name.to_lowercase().ends_with(PACKAGE_SUFFIX) {
            package = Some(entry.name.clone());
        }
        files.push(ManifestFile {
            props: Some(size_props(entry.size)?),
            content: entry_content(path.clone(), entry.name.clone()),
            bundle_path: entry.name,
        });
    }
    let package = package.ok_or_else(|| BundleError::IndexResolution(path.clone()))?;
    Ok(Manifest {
        info: BundleProps::new(),
        props: BundleProps::from_mapping([("main_file", package)]).into(),
        files,
    })
}
