//! Format selection by explicit type tag or by path sniffing.

use crate::error::{BundleError, Result};
use crate::formats::{agb, archive, directory, epub, single_file, web, zip_bundle};
use crate::sink::{BundleSink, SinkOptions};
use crate::source::{BundleSource, SourceOptions};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Supported bundle formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleType {
    /// Binary container
    Agb,
    /// Bundle archive on ZIP (`meta/` + `data/`)
    Archive,
    Zip,
    SingleFile,
    Epub,
    Directory,
    /// Static web export
    Web,
}

impl BundleType {
    pub const ALL: [BundleType; 7] = [
        BundleType::Agb,
        BundleType::Archive,
        BundleType::Zip,
        BundleType::SingleFile,
        BundleType::Epub,
        BundleType::Directory,
        BundleType::Web,
    ];

    /// Tag accepted on the command line and in [`SourceOptions::bundle_type`]
    pub fn tag(self) -> &'static str {
        match self {
            BundleType::Agb => agb::FORMAT,
            BundleType::Archive => archive::FORMAT,
            BundleType::Zip => zip_bundle::FORMAT,
            BundleType::SingleFile => single_file::FORMAT,
            BundleType::Epub => epub::FORMAT,
            BundleType::Directory => directory::FORMAT,
            BundleType::Web => web::FORMAT,
        }
    }

    pub fn supports(self, mission: Mission) -> bool {
        match mission {
            Mission::Read => !matches!(self, BundleType::Web),
            Mission::Write => matches!(
                self,
                BundleType::Agb | BundleType::Archive | BundleType::Zip | BundleType::Web
            ),
        }
    }
}

impl std::str::FromStr for BundleType {
    type Err = BundleError;
    fn from_str(s: &str) -> Result<Self> {
        BundleType::ALL
            .into_iter()
            .find(|t| t.tag().eq_ignore_ascii_case(s))
            .ok_or_else(|| BundleError::UnknownType(s.to_string()))
    }
}

impl fmt::Display for BundleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Direction an adapter is requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mission {
    Read,
    Write,
}

impl fmt::Display for Mission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mission::Read => "read",
            Mission::Write => "write",
        })
    }
}

/// Extension checks, in priority order, applied after the directory check
const SNIFF_ORDER: [(&str, BundleType); 4] = [
    ("epub", BundleType::Epub),
    ("aggregion", BundleType::Archive),
    ("agb", BundleType::Agb),
    ("zip", BundleType::Zip),
];

/// Format implied by `path` alone
///
/// Directory first, then extension (case-insensitive), then single file.
pub fn sniff(path: &Path) -> BundleType {
    if std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false) {
        return BundleType::Directory;
    }
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    SNIFF_ORDER
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, bundle_type)| *bundle_type)
        .unwrap_or(BundleType::SingleFile)
}

/// Pick the format for `path`, preferring an explicit type
pub fn resolve(path: &Path, mission: Mission, bundle_type: Option<BundleType>) -> Result<BundleType> {
    let resolved = bundle_type.unwrap_or_else(|| sniff(path));
    if !resolved.supports(mission) {
        return Err(BundleError::UnsupportedOperation {
            bundle_type: resolved.to_string(),
            mission: mission.to_string(),
        });
    }
    debug!(path = %path.display(), %mission, bundle_type = %resolved, "format resolved");
    Ok(resolved)
}

/// Source for `opts.path`; fails right away when the path does not exist
pub fn create_source(opts: &SourceOptions) -> Result<Box<dyn BundleSource>> {
    let reader = match resolve(&opts.path, Mission::Read, opts.bundle_type)? {
        BundleType::Agb => agb::open_source(opts)?,
        BundleType::Archive => archive::open_source(opts)?,
        BundleType::Zip => zip_bundle::open_source(opts)?,
        BundleType::SingleFile => single_file::open_source(opts)?,
        BundleType::Epub => epub::open_source(opts)?,
        BundleType::Directory => directory::open_source(opts)?,
        other => {
            return Err(BundleError::UnsupportedOperation {
                bundle_type: other.to_string(),
                mission: Mission::Read.to_string(),
            })
        }
    };
    Ok(Box::new(reader))
}

/// Sink writing to `opts.path`
pub async fn create_sink(opts: &SinkOptions) -> Result<Box<dyn BundleSink>> {
    let sink: Box<dyn BundleSink> = match resolve(&opts.path, Mission::Write, opts.bundle_type)? {
        BundleType::Agb => Box::new(agb::AgbSink::create(opts).await?),
        BundleType::Archive => Box::new(archive::ArchiveSink::create(opts).await?),
        BundleType::Zip => Box::new(zip_bundle::ZipSink::create(opts).await?),
        BundleType::Web => Box::new(web::WebSink::create(opts).await?),
        other => {
            return Err(BundleError::UnsupportedOperation {
                bundle_type: other.to_string(),
                mission: Mission::Write.to_string(),
            })
        }
    };
    Ok(sink)
}
