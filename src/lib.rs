//! Bundlekit - streaming converter for content bundles
//!
//! A bundle is a set of files plus two property sets: public bundle info
//! and (optionally encrypted) bundle properties. Every supported format is
//! read into, and written from, the same ordered entry stream:
//!
//! ```text
//! BundleInfo → BundleProps → File* → End
//! ```
//!
//! Sources produce that stream, sinks consume it, and transforms sit
//! between them. The only transform shipped here is AES-128-ECB with a
//! per-path key derived from a 256-bit master key.
//!
//! ## Formats
//!
//! | tag          | read | write |
//! |--------------|------|-------|
//! | `agb`        | yes  | yes   |
//! | `aggregion`  | yes  | yes   |
//! | `zip`        | yes  | yes   |
//! | `epub`       | yes  |       |
//! | `directory`  | yes  |       |
//! | `singleFile` | yes  |       |
//! | `web`        |      | yes   |
//!
//! ## Example
//!
//! ```no_run
//! use bundlekit::cli::{make_bundle, MakeOptions};
//! use bundlekit::pipeline::MasterKey;
//! use std::path::Path;
//!
//! # async fn run() -> bundlekit::Result<()> {
//! let options = MakeOptions {
//!     index: Some("index.html".into()),
//!     output_key: Some(MasterKey::from_hex(&"ab".repeat(32))?),
//!     ..Default::default()
//! };
//! make_bundle(Path::new("site/"), Path::new("site.agb"), &options).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod container;
pub mod entry;
pub mod error;
pub mod formats;
pub mod pipeline;
pub mod props;
pub mod resolver;
pub mod sink;
pub mod source;

pub use entry::{Content, Entry, FileEntry, PropsPayload};
pub use error::{BundleError, Result};
pub use pipeline::{pump, CryptoTransform, MasterKey, PumpSummary, Transform};
pub use props::{BundleProps, PropValue};
pub use resolver::{create_sink, create_source, BundleType, Mission};
pub use sink::{BundleSink, SinkOptions};
pub use source::{BundleSource, SourceOptions};
