//! Async plumbing over the synchronous `zip` crate.
//!
//! Archive work always runs on the blocking pool. Entry bodies are streamed
//! back through a single-slot channel, so the blocking reader only decodes
//! the next chunk after the consumer has taken the previous one.

use crate::entry::{Content, ContentReader};
use crate::error::{BundleError, Result};
use bytes::Bytes;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::{StreamReader, SyncIoBridge};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const CHUNK_SIZE: usize = 64 * 1024;

/// One central-directory record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipListing {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

fn join_error(e: tokio::task::JoinError) -> BundleError {
    BundleError::Io(io::Error::other(e))
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(join_error)?
}

/// Entries of the archive at `path`, in central-directory order
pub async fn list_entries(path: &Path) -> Result<Vec<ZipListing>> {
    let path = path.to_path_buf();
    blocking(move || {
        let mut archive = ZipArchive::new(File::open(&path)?)?;
        let mut listing = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            listing.push(ZipListing {
                name: entry.name().to_string(),
                size: entry.size(),
                is_dir: entry.is_dir(),
            });
        }
        Ok(listing)
    })
    .await
}

/// Whole body of one small entry, `None` if the archive has no such entry
pub async fn read_entry(path: &Path, name: &str) -> Result<Option<Vec<u8>>> {
    let path = path.to_path_buf();
    let name = name.to_string();
    blocking(move || {
        let mut archive = ZipArchive::new(File::open(&path)?)?;
        let mut entry = match archive.by_name(&name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        Ok(Some(data))
    })
    .await
}

fn stream_entry(path: &Path, name: &str, tx: &mpsc::Sender<io::Result<Bytes>>) -> Result<()> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut entry = archive.by_name(name)?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = entry.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
            // reader dropped
            return Ok(());
        }
    }
}

/// Lazily streamed body of entry `name`
pub fn entry_content(path: PathBuf, name: String) -> Content {
    Content::new(move || async move {
        let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(1);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = stream_entry(&path, &name, &tx) {
                let _ = tx.blocking_send(Err(e.into_io()));
            }
        });
        Ok(Box::pin(StreamReader::new(ReceiverStream::new(rx))) as ContentReader)
    })
}

fn deflated() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Sequential ZIP writer driven from async code
pub struct ZipPackWriter {
    path: PathBuf,
    inner: Option<ZipWriter<File>>,
}

impl ZipPackWriter {
    pub async fn create(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::create(path).await?.into_std().await;
        Ok(Self {
            path: path.to_path_buf(),
            inner: Some(ZipWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn take(&mut self) -> Result<ZipWriter<File>> {
        self.inner
            .take()
            .ok_or_else(|| BundleError::InvalidArgument("archive is already finished".into()))
    }

    /// Append an in-memory entry
    pub async fn add_bytes(&mut self, name: &str, data: Vec<u8>) -> Result<()> {
        let mut zip = self.take()?;
        let name = name.to_string();
        let (zip, result) = tokio::task::spawn_blocking(move || {
            let result = (|| -> Result<()> {
                zip.start_file(name, deflated())?;
                zip.write_all(&data)?;
                Ok(())
            })();
            (zip, result)
        })
        .await
        .map_err(join_error)?;
        self.inner = Some(zip);
        result
    }

    /// Append an entry by draining `content`; returns the bytes written
    pub async fn add_content(&mut self, name: &str, content: Content) -> Result<u64> {
        let reader = content.open().await?;
        let mut bridge = SyncIoBridge::new(reader);
        let mut zip = self.take()?;
        let name = name.to_string();
        let (zip, result) = tokio::task::spawn_blocking(move || {
            let result = (|| -> Result<u64> {
                zip.start_file(name, deflated())?;
                Ok(io::copy(&mut bridge, &mut zip)?)
            })();
            (zip, result)
        })
        .await
        .map_err(join_error)?;
        self.inner = Some(zip);
        result
    }

    /// Write the central directory and flush the file
    pub async fn finish(&mut self) -> Result<()> {
        let zip = self.take()?;
        blocking(move || {
            let file = zip.finish()?;
            file.sync_all()?;
            Ok(())
        })
        .await
    }
}
