//! Binary container format (`.agb`).

use crate::container::{AgbContainer, Container};
use crate::entry::{Content, ContentReader, Entry, EntryOrder, FileEntry, PropsPayload};
use crate::error::{BundleError, Result};
use crate::props::BundleProps;
use crate::sink::{BundleSink, SinkOptions};
use crate::source::{ensure_exists, BundleReader, Manifest, ManifestFile, SourceOptions};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, TryStreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use tracing::debug;

pub const FORMAT: &str = "agb";

const BLOCK_SIZE: usize = 64 * 1024;

/// Open a container for reading; metadata loads on first use
pub fn open_source(opts: &SourceOptions) -> Result<BundleReader> {
    ensure_exists(&opts.path)?;
    Ok(BundleReader::new(
        FORMAT,
        Box::pin(load(opts.path.clone(), opts.encrypted)),
    ))
}

fn stored_props(data: &[u8], encrypted: bool) -> Result<PropsPayload> {
    if data.is_empty() {
        return Ok(BundleProps::new().into());
    }
    PropsPayload::from_stored(data, encrypted)
}

async fn load(path: PathBuf, encrypted: bool) -> Result<Manifest> {
    let container: Arc<dyn Container> = Arc::new(AgbContainer::open(&path).await?);

    let info = BundleProps::from_canonical_bytes(&container.get_bundle_info_data().await?)?;
    let props = stored_props(&container.get_bundle_properties_data().await?, encrypted)?;

    let mut files = Vec::new();
    for bundle_path in container.get_files().await? {
        let handle = container.open_file(&bundle_path).await?;
        let data = container.read_file_properties_data(handle).await?;
        let props = if data.is_empty() {
            None
        } else {
            Some(PropsPayload::from_stored(&data, encrypted)?)
        };
        files.push(ManifestFile {
            content: container_content(container.clone(), bundle_path.clone()),
            bundle_path,
            props,
        });
    }
    Ok(Manifest { info, props, files })
}

/// Block-by-block reader over one container file
fn container_content(container: Arc<dyn Container>, bundle_path: String) -> Content {
    Content::new(move || async move {
        let handle = container.open_file(&bundle_path).await?;
        let blocks = stream::try_unfold(container, move |container| async move {
            let block = container.read_file_block(handle, BLOCK_SIZE).await?;
            let next = (!block.is_empty()).then(|| (Bytes::from(block), container));
            Ok::<_, BundleError>(next)
        })
        .map_err(BundleError::into_io);
        Ok(Box::pin(StreamReader::new(blocks)) as ContentReader)
    })
}

/// Writes entries into a new container; `close` happens on `End`
pub struct AgbSink {
    order: EntryOrder,
    container: AgbContainer,
    extra_info: Option<BundleProps>,
    finished: bool,
}

impl AgbSink {
    pub async fn create(opts: &SinkOptions) -> Result<Self> {
        Ok(Self {
            order: EntryOrder::new(),
            container: AgbContainer::create(&opts.path).await?,
            extra_info: opts.info.clone(),
            finished: false,
        })
    }

    async fn write_file(&mut self, file: FileEntry) -> Result<()> {
        let handle = self.container.create_file(&file.bundle_path).await?;
        let mut reader = file.content.open().await?;
        let mut buf = vec![0u8; BLOCK_SIZE];
        let mut size = 0u64;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            self.container.write_file_block(handle, &buf[..n]).await?;
            size += n as u64;
        }
        // Absent props stay absent: plain bytes here would break a sealed stream
        if let Some(props) = &file.props {
            self.container
                .write_file_properties_data(handle, &props.to_bytes())
                .await?;
        }
        debug!(path = %file.bundle_path, size, "file stored");
        Ok(())
    }
}

#[async_trait]
impl BundleSink for AgbSink {
    async fn write_entry(&mut self, entry: Entry) -> Result<()> {
        self.order.check(&entry)?;
        match entry {
            Entry::BundleInfo(info) => {
                let info = match &self.extra_info {
                    Some(extra) => info.merged_with(extra),
                    None => info,
                };
                self.container
                    .set_bundle_info_data(info.to_canonical_text().as_bytes())
                    .await
            }
            Entry::BundleProps(props) => {
                self.container
                    .set_bundle_properties_data(&props.to_bytes())
                    .await
            }
            Entry::File(file) => self.write_file(file).await,
            Entry::End => {
                self.container.close().await?;
                self.finished = true;
                debug!(path = %self.container.path().display(), "container finalized");
                Ok(())
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{make_bundle, MakeOptions};
    use crate::pipeline::{pump, CryptoTransform, MasterKey, Transform};
    use crate::props::PropValue;
    use crate::source::BundleSource;
    use tempfile::tempdir;

    fn sample() -> BundleReader {
        BundleReader::from_manifest(
            "test",
            Manifest {
                info: BundleProps::from_mapping([("foo", "bar")]),
                props: BundleProps::from_mapping([("main_file", "index.html")]).into(),
                files: vec![
                    ManifestFile {
                        bundle_path: "index.html".into(),
                        props: None,
                        content: Content::from_bytes(b"<html/>".to_vec()),
                    },
                    ManifestFile {
                        bundle_path: "img/logo.png".into(),
                        props: Some(BundleProps::from_mapping([("size", 3), ("x", 1)]).into()),
                        content: Content::from_bytes(vec![1u8, 2, 3]),
                    },
                ],
            },
        )
    }

    #[tokio::test]
    async fn test_sink_then_source_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.agb");
        let mut sink = AgbSink::create(&SinkOptions::new(&path)).await.unwrap();
        pump(&mut sample(), &mut [], &mut sink).await.unwrap();

        let mut source = open_source(&SourceOptions::new(&path)).unwrap();
        source.ready().await.unwrap();
        assert_eq!(source.info().unwrap().get_str("foo"), Some("bar"));
        assert_eq!(
            source.files().unwrap(),
            &["index.html".to_string(), "img/logo.png".to_string()]
        );

        let mut bodies = Vec::new();
        while let Some(entry) = source.next_entry().await.unwrap() {
            if let Entry::File(file) = entry {
                let props = file.props.map(|p| p.as_plain().unwrap().clone());
                bodies.push((file.bundle_path, props, file.content.read_to_end().await.unwrap()));
            }
        }
        assert_eq!(bodies[0].2, b"<html/>");
        assert!(bodies[0].1.is_none());
        let logo = bodies[1].1.as_ref().unwrap();
        assert_eq!(logo.get("x").and_then(PropValue::as_i64), Some(1));
        assert_eq!(bodies[1].2, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_sink_merges_extra_info() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.agb");
        let mut opts = SinkOptions::new(&path);
        opts.info = Some(BundleProps::from_mapping([("foo", "baz"), ("extra", "1")]));
        let mut sink = AgbSink::create(&opts).await.unwrap();
        pump(&mut sample(), &mut [], &mut sink).await.unwrap();

        let mut source = open_source(&SourceOptions::new(&path)).unwrap();
        source.ready().await.unwrap();
        let info = source.info().unwrap();
        assert_eq!(info.get_str("foo"), Some("baz"));
        assert_eq!(info.get_str("extra"), Some("1"));
        // bundle props are left alone
        let props = source.props().unwrap().as_plain().unwrap();
        assert_eq!(props.get_str("extra"), None);
    }

    #[tokio::test]
    async fn test_encrypted_flag_keeps_props_opaque() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.agb");
        let mut sink = AgbSink::create(&SinkOptions::new(&path)).await.unwrap();
        pump(&mut sample(), &mut [], &mut sink).await.unwrap();

        let mut opts = SourceOptions::new(&path);
        opts.encrypted = true;
        let mut source = open_source(&opts).unwrap();
        source.ready().await.unwrap();
        assert!(source.props().unwrap().is_sealed());
    }

    #[test]
    fn test_missing_path_fails_synchronously() {
        let result = open_source(&SourceOptions::new("/no/such/bundle.agb"));
        assert!(matches!(result, Err(BundleError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_encrypted_file_without_props_decrypts_back() {
        let dir = tempdir().unwrap();
        let sealed = dir.path().join("sealed.agb");
        let opened = dir.path().join("opened.agb");
        let key = MasterKey::from_slice(&[0x42; 32]).unwrap();

        let mut sink = AgbSink::create(&SinkOptions::new(&sealed)).await.unwrap();
        let mut stages: Vec<Box<dyn Transform>> = vec![Box::new(CryptoTransform::encrypt(key.clone()))];
        pump(&mut sample(), &mut stages, &mut sink).await.unwrap();

        let options = MakeOptions {
            input_key: Some(key),
            ..Default::default()
        };
        make_bundle(&sealed, &opened, &options).await.unwrap();

        let mut source = open_source(&SourceOptions::new(&opened)).unwrap();
        while let Some(entry) = source.next_entry().await.unwrap() {
            if let Entry::File(file) = entry {
                if file.bundle_path == "index.html" {
                    assert!(file.props.is_none());
                    assert_eq!(file.content.read_to_end().await.unwrap(), b"<html/>");
                }
            }
        }
    }

    #[tokio::test]
    async fn test_corrupt_container_fails_in_ready() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.agb");
        let mut raw = b"AGB\x01".to_vec();
        raw.extend_from_slice(&(u64::MAX - 4).to_le_bytes());
        raw.extend_from_slice(b"AGB\x01");
        std::fs::write(&path, raw).unwrap();

        let mut source = crate::resolver::create_source(&SourceOptions::new(&path)).unwrap();
        assert!(matches!(source.ready().await, Err(BundleError::Parse(_))));
    }
}
