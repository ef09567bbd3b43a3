//! Binary bundle container (`.agb`).
//!
//! File layout:
//!
//! ```text
//! [magic: 4]["file data"...][index JSON][index length: 8 LE][magic: 4]
//! ```
//!
//! File bodies are appended back to back as they are written; the index
//! describing them (bundle info/props blobs, per-file offset, size and
//! properties blob) is written once on [`Container::close`].

use crate::error::{BundleError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::debug;

/// Magic bytes at both ends of a container file
const AGB_MAGIC: &[u8; 4] = b"AGB\x01";

/// Index length + closing magic
const TRAILER_SIZE: u64 = 12;

const INDEX_VERSION: u32 = 1;

/// Opaque handle returned by [`Container::open_file`] / [`Container::create_file`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(usize);

/// Block-level access to a binary bundle
///
/// Every call may suspend on I/O. Implementations serialize calls
/// internally so a container can be shared behind an `Arc`.
#[async_trait]
pub trait Container: Send + Sync {
    async fn open_file(&self, path: &str) -> Result<FileHandle>;

    async fn create_file(&self, path: &str) -> Result<FileHandle>;

    /// Up to `size` bytes from the handle's cursor; empty at end of file
    async fn read_file_block(&self, handle: FileHandle, size: usize) -> Result<Vec<u8>>;

    async fn write_file_block(&self, handle: FileHandle, data: &[u8]) -> Result<()>;

    async fn read_file_properties_data(&self, handle: FileHandle) -> Result<Vec<u8>>;

    async fn write_file_properties_data(&self, handle: FileHandle, data: &[u8]) -> Result<()>;

    async fn get_files(&self) -> Result<Vec<String>>;

    async fn get_bundle_info_data(&self) -> Result<Vec<u8>>;

    async fn set_bundle_info_data(&self, data: &[u8]) -> Result<()>;

    async fn get_bundle_properties_data(&self) -> Result<Vec<u8>>;

    async fn set_bundle_properties_data(&self, data: &[u8]) -> Result<()>;

    /// Flush and release the backing file. Calling it again is a no-op.
    async fn close(&self) -> Result<()>;
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredFile {
    path: String,
    offset: u64,
    size: u64,
    #[serde(with = "hex_bytes")]
    props: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContainerIndex {
    version: u32,
    #[serde(with = "hex_bytes")]
    info: Vec<u8>,
    #[serde(with = "hex_bytes")]
    props: Vec<u8>,
    files: Vec<StoredFile>,
}

impl Default for ContainerIndex {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            info: Vec::new(),
            props: Vec::new(),
            files: Vec::new(),
        }
    }
}

impl ContainerIndex {
    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        let index: Self = serde_json::from_slice(data)
            .map_err(|e| BundleError::Parse(format!("container index: {}", e)))?;
        if index.version != INDEX_VERSION {
            return Err(BundleError::Parse(format!(
                "unsupported container version {}",
                index.version
            )));
        }
        Ok(index)
    }
}

enum Backing {
    Read(File),
    Write(BufWriter<File>),
    Closed,
}

struct Cursor {
    file: usize,
    pos: u64,
}

struct State {
    backing: Backing,
    index: ContainerIndex,
    handles: Vec<Cursor>,
    write_pos: u64,
    /// Only the most recently created file may still grow
    writing: Option<usize>,
}

impl State {
    fn cursor(&self, handle: FileHandle) -> Result<&Cursor> {
        self.handles
            .get(handle.0)
            .ok_or_else(|| BundleError::InvalidArgument(format!("unknown file handle {}", handle.0)))
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.backing {
            Backing::Write(_) => Ok(()),
            Backing::Read(_) => Err(BundleError::InvalidArgument(
                "container is opened read-only".into(),
            )),
            Backing::Closed => Err(BundleError::InvalidArgument("container is closed".into())),
        }
    }
}

/// File-backed [`Container`]
pub struct AgbContainer {
    path: PathBuf,
    state: Mutex<State>,
}

impl AgbContainer {
    /// Open an existing container for reading
    pub async fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path).await?;
        let file_len = file.metadata().await?.len();
        if file_len < AGB_MAGIC.len() as u64 + TRAILER_SIZE {
            return Err(BundleError::Parse(format!(
                "{} is too short to be a bundle container",
                path.display()
            )));
        }

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic).await?;
        if &magic != AGB_MAGIC {
            return Err(BundleError::Parse("invalid container magic bytes".into()));
        }

        file.seek(SeekFrom::Start(file_len - TRAILER_SIZE)).await?;
        let mut trailer = [0u8; TRAILER_SIZE as usize];
        file.read_exact(&mut trailer).await?;
        if &trailer[8..] != AGB_MAGIC {
            return Err(BundleError::Parse("container trailer is missing".into()));
        }
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&trailer[..8]);
        let index_len = u64::from_le_bytes(len_bytes);
        let data_end = index_len
            .checked_add(TRAILER_SIZE)
            .and_then(|tail| file_len.checked_sub(tail))
            .filter(|end| *end >= AGB_MAGIC.len() as u64)
            .ok_or_else(|| BundleError::Parse("container index length is out of range".into()))?;

        file.seek(SeekFrom::Start(data_end)).await?;
        let mut index_bytes = vec![0u8; index_len as usize];
        file.read_exact(&mut index_bytes).await?;
        let index = ContainerIndex::from_bytes(&index_bytes)?;
        let in_bounds = |f: &StoredFile| {
            f.offset >= AGB_MAGIC.len() as u64
                && f.offset.checked_add(f.size).is_some_and(|end| end <= data_end)
        };
        if let Some(bad) = index.files.iter().find(|f| !in_bounds(*f)) {
            return Err(BundleError::Parse(format!(
                "file {} points outside the data section",
                bad.path
            )));
        }

        debug!(path = %path.display(), files = index.files.len(), "container opened");
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(State {
                backing: Backing::Read(file),
                index,
                handles: Vec::new(),
                write_pos: 0,
                writing: None,
            }),
        })
    }

    /// Create (or truncate) a container for writing
    pub async fn create(path: &Path) -> Result<Self> {
        let mut writer = BufWriter::new(File::create(path).await?);
        writer.write_all(AGB_MAGIC).await?;
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(State {
                backing: Backing::Write(writer),
                index: ContainerIndex::default(),
                handles: Vec::new(),
                write_pos: AGB_MAGIC.len() as u64,
                writing: None,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Container for AgbContainer {
    async fn open_file(&self, path: &str) -> Result<FileHandle> {
        let mut state = self.state.lock().await;
        let file = state
            .index
            .files
            .iter()
            .position(|f| f.path == path)
            .ok_or_else(|| BundleError::NotFound(PathBuf::from(path)))?;
        state.handles.push(Cursor { file, pos: 0 });
        Ok(FileHandle(state.handles.len() - 1))
    }

    async fn create_file(&self, path: &str) -> Result<FileHandle> {
        let mut state = self.state.lock().await;
        state.ensure_writable()?;
        if state.index.files.iter().any(|f| f.path == path) {
            return Err(BundleError::InvalidArgument(format!(
                "file {} already exists in container",
                path
            )));
        }
        let offset = state.write_pos;
        state.index.files.push(StoredFile {
            path: path.to_string(),
            offset,
            size: 0,
            props: Vec::new(),
        });
        let file = state.index.files.len() - 1;
        state.writing = Some(file);
        state.handles.push(Cursor { file, pos: 0 });
        Ok(FileHandle(state.handles.len() - 1))
    }

    async fn read_file_block(&self, handle: FileHandle, size: usize) -> Result<Vec<u8>> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let (file, pos) = {
            let cursor = state.cursor(handle)?;
            (cursor.file, cursor.pos)
        };
        let stored = &state.index.files[file];
        let len = (stored.size - pos).min(size as u64);
        if len == 0 {
            return Ok(Vec::new());
        }
        let start = stored.offset + pos;
        let Backing::Read(reader) = &mut state.backing else {
            return Err(BundleError::InvalidArgument(
                "container is not opened for reading".into(),
            ));
        };
        reader.seek(SeekFrom::Start(start)).await?;
        let mut block = vec![0u8; len as usize];
        reader.read_exact(&mut block).await?;
        state.handles[handle.0].pos += len;
        Ok(block)
    }

    async fn write_file_block(&self, handle: FileHandle, data: &[u8]) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.ensure_writable()?;
        let file = state.cursor(handle)?.file;
        if state.writing != Some(file) {
            return Err(BundleError::InvalidArgument(format!(
                "file {} is no longer open for writing",
                state.index.files[file].path
            )));
        }
        if let Backing::Write(writer) = &mut state.backing {
            writer.write_all(data).await?;
        }
        state.write_pos += data.len() as u64;
        state.index.files[file].size += data.len() as u64;
        state.handles[handle.0].pos += data.len() as u64;
        Ok(())
    }

    async fn read_file_properties_data(&self, handle: FileHandle) -> Result<Vec<u8>> {
        let state = self.state.lock().await;
        let file = state.cursor(handle)?.file;
        Ok(state.index.files[file].props.clone())
    }

    async fn write_file_properties_data(&self, handle: FileHandle, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.ensure_writable()?;
        let file = state.cursor(handle)?.file;
        state.index.files[file].props = data.to_vec();
        Ok(())
    }

    async fn get_files(&self) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state.index.files.iter().map(|f| f.path.clone()).collect())
    }

    async fn get_bundle_info_data(&self) -> Result<Vec<u8>> {
        Ok(self.state.lock().await.index.info.clone())
    }

    async fn set_bundle_info_data(&self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.ensure_writable()?;
        state.index.info = data.to_vec();
        Ok(())
    }

    async fn get_bundle_properties_data(&self) -> Result<Vec<u8>> {
        Ok(self.state.lock().await.index.props.clone())
    }

    async fn set_bundle_properties_data(&self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.ensure_writable()?;
        state.index.props = data.to_vec();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        match std::mem::replace(&mut state.backing, Backing::Closed) {
            Backing::Write(mut writer) => {
                let index_bytes = state.index.to_bytes()?;
                writer.write_all(&index_bytes).await?;
                writer
                    .write_all(&(index_bytes.len() as u64).to_le_bytes())
                    .await?;
                writer.write_all(AGB_MAGIC).await?;
                writer.flush().await?;
                writer.into_inner().sync_all().await?;
                state.writing = None;
                debug!(
                    path = %self.path.display(),
                    files = state.index.files.len(),
                    "container written"
                );
            }
            Backing::Read(_) | Backing::Closed => {}
        }
        Ok(())
    }
}
