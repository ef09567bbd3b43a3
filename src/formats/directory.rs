//! Plain directory tree (read only).

use crate::entry::Content;
use crate::error::{BundleError, Result};
use crate::props::BundleProps;
use crate::sink::main_file;
use crate::source::{ensure_exists, size_props, BundleReader, Manifest, ManifestFile, SourceOptions};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const FORMAT: &str = "directory";

/// MIME type for a main file, by extension
pub fn content_type(main_file: &str) -> String {
    mime_guess::from_path(main_file)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

pub fn open_source(opts: &SourceOptions) -> Result<BundleReader> {
    ensure_exists(&opts.path)?;
    let props = opts.props.clone().unwrap_or_default();
    let mut info = opts.info.clone().unwrap_or_default();
    if let Some(main) = main_file(&props) {
        info = info.merged_with(&BundleProps::from_mapping([(
            "content_type",
            content_type(main),
        )]));
    }

    let root = opts.path.clone();
    Ok(BundleReader::new(
        FORMAT,
        Box::pin(async move {
            let found = tokio::task::spawn_blocking(move || walk(&root))
                .await
                .map_err(|e| BundleError::Io(io::Error::other(e)))??;
            let files = found
                .into_iter()
                .map(|(bundle_path, path, size)| {
                    Ok(ManifestFile {
                        bundle_path,
                        props: Some(size_props(size)?),
                        content: Content::from_path(path),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Manifest {
                info,
                props: props.into(),
                files,
            })
        }),
    ))
}

/// Regular files below `root` as `(bundle path, file path, size)`, sorted
fn walk(root: &Path) -> Result<Vec<(String, PathBuf, u64)>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| BundleError::InvalidArgument(e.to_string()))?;
        let bundle_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let size = entry.metadata().map_err(io::Error::from)?.len();
        found.push((bundle_path, entry.into_path(), size));
    }
    Ok(found)
}
