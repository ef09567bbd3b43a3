//! A lone file presented as a one-file bundle.

use crate::entry::Content;
use crate::error::Result;
use crate::props::BundleProps;
use crate::source::{ensure_exists, size_props, BundleReader, Manifest, ManifestFile, SourceOptions};
use std::path::Path;

pub const FORMAT: &str = "singleFile";

/// `index` plus the lower-cased extension of `path`
pub fn bundle_name(path: &Path) -> String {
    match path.extension() {
        Some(ext) => format!("index.{}", ext.to_string_lossy().to_lowercase()),
        None => "index".to_string(),
    }
}

pub fn open_source(opts: &SourceOptions) -> Result<BundleReader> {
    ensure_exists(&opts.path)?;
    let path = opts.path.clone();
    let name = bundle_name(&path);
    Ok(BundleReader::new(
        FORMAT,
        Box::pin(async move {
            let size = tokio::fs::metadata(&path).await?.len();
            Ok(Manifest {
                info: BundleProps::new(),
                props: BundleProps::from_mapping([("main_file", name.as_str())]).into(),
                files: vec![ManifestFile {
                    bundle_path: name,
                    props: Some(size_props(size)?),
                    content: Content::from_path(path),
                }],
            })
        }),
    ))
}
