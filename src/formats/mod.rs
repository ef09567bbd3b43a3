//! Format adapters.
//!
//! Each module exposes `open_source` (readable formats) and/or a sink type
//! (writable formats). [`crate::resolver`] picks between them.

pub mod agb;
pub mod archive;
pub mod directory;
pub mod epub;
pub mod single_file;
pub mod web;
pub mod zip_bundle;
pub mod zip_io;

pub use agb::AgbSink;
pub use archive::ArchiveSink;
pub use web::{WebSink, WebTemplate};
pub use zip_bundle::ZipSink;
