//! Entry pipeline: source → transforms → sink.

pub mod crypto;
pub mod ecb;

pub use crypto::*;
pub use ecb::*;

use crate::entry::{Entry, EntryOrder};
use crate::error::{BundleError, Result};
use crate::sink::BundleSink;
use crate::source::BundleSource;
use tracing::{debug, info};

/// Synchronous per-entry stage
///
/// Content is rewritten lazily through [`crate::entry::Content::map_reader`],
/// so a transform never touches file bytes itself.
pub trait Transform: Send {
    fn apply(&mut self, entry: Entry) -> Result<Entry>;
}

/// Outcome of a completed [`pump`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpSummary {
    /// Files that reached the sink
    pub files: usize,
}

/// Drive every entry from `source` through `transforms` into `sink`
///
/// Entries are forwarded strictly one at a time; the next one is not pulled
/// until the sink has finished writing the previous. The first error from
/// any stage aborts the run.
pub async fn pump<S, K>(
    source: &mut S,
    transforms: &mut [Box<dyn Transform>],
    sink: &mut K,
) -> Result<PumpSummary>
where
    S: BundleSource + ?Sized,
    K: BundleSink + ?Sized,
{
    let mut order = EntryOrder::new();
    loop {
        let Some(mut entry) = source.next_entry().await? else {
            break;
        };
        order.check(&entry)?;
        let is_end = matches!(entry, Entry::End);
        if let Entry::File(file) = &entry {
            debug!(path = %file.bundle_path, "forwarding file");
        }
        for stage in transforms.iter_mut() {
            entry = stage.apply(entry)?;
        }
        sink.write_entry(entry).await?;
        if is_end {
            break;
        }
    }

    if !order.is_ended() {
        return Err(BundleError::Protocol(
            "source finished without an end entry".into(),
        ));
    }
    if !sink.is_finished() {
        return Err(BundleError::Protocol(
            "sink did not finish after end entry".into(),
        ));
    }
    info!(files = order.files(), "pipeline finished");
    Ok(PumpSummary {
        files: order.files(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Content, FileEntry, PropsPayload};
    use crate::props::BundleProps;
    use crate::sink::InspectSink;
    use crate::source::{BundleReader, Manifest, ManifestFile};

    fn reader(paths: &[&str]) -> BundleReader {
        BundleReader::from_manifest(
            "test",
            Manifest {
                info: BundleProps::from_mapping([("foo", "bar")]),
                props: BundleProps::from_mapping([("main_file", "a.txt")]).into(),
                files: paths
                    .iter()
                    .map(|p| ManifestFile {
                        bundle_path: p.to_string(),
                        props: None,
                        content: Content::from_bytes(p.as_bytes().to_vec()),
                    })
                    .collect(),
            },
        )
    }

    struct Rename;

    impl Transform for Rename {
        fn apply(&mut self, entry: Entry) -> Result<Entry> {
            Ok(match entry {
                Entry::File(f) => Entry::File(FileEntry {
                    bundle_path: format!("renamed/{}", f.bundle_path),
                    ..f
                }),
                other => other,
            })
        }
    }

    struct FailOnFile;

    impl Transform for FailOnFile {
        fn apply(&mut self, entry: Entry) -> Result<Entry> {
            match entry {
                Entry::File(_) => Err(BundleError::Cipher("boom".into())),
                other => Ok(other),
            }
        }
    }

    #[tokio::test]
    async fn test_pump_forwards_all_entries() {
        let mut source = reader(&["a.txt", "b.txt"]);
        let mut sink = InspectSink::new();
        let summary = pump(&mut source, &mut [], &mut sink).await.unwrap();
        assert_eq!(summary.files, 2);
        assert!(sink.is_finished());
        assert_eq!(sink.info.unwrap().get_str("foo"), Some("bar"));
        assert_eq!(sink.files[1].bundle_path, "b.txt");
        assert_eq!(sink.files[1].size, 5);
    }

    #[tokio::test]
    async fn test_pump_applies_transforms_in_order() {
        let mut source = reader(&["a.txt"]);
        let mut sink = InspectSink::new();
        let mut stages: Vec<Box<dyn Transform>> = vec![Box::new(Rename), Box::new(Rename)];
        pump(&mut source, &mut stages, &mut sink).await.unwrap();
        assert_eq!(sink.files[0].bundle_path, "renamed/renamed/a.txt");
        assert!(matches!(sink.props, Some(PropsPayload::Plain(_))));
    }

    #[tokio::test]
    async fn test_pump_propagates_transform_error() {
        let mut source = reader(&["a.txt"]);
        let mut sink = InspectSink::new();
        let mut stages: Vec<Box<dyn Transform>> = vec![Box::new(FailOnFile)];
        let err = pump(&mut source, &mut stages, &mut sink).await.unwrap_err();
        assert!(matches!(err, BundleError::Cipher(_)));
        assert!(!sink.is_finished());
    }

    #[tokio::test]
    async fn test_pump_on_empty_bundle() {
        let mut source = reader(&[]);
        let mut sink = InspectSink::new();
        let summary = pump(&mut source, &mut [], &mut sink).await.unwrap();
        assert_eq!(summary.files, 0);
        assert!(sink.is_finished());
    }
}
