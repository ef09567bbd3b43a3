//! Web export: a directory that can be served as a static site (write only).

use crate::entry::{Entry, EntryOrder, FileEntry};
use crate::error::{BundleError, Result};
use crate::sink::{main_file, BundleSink, SinkOptions};
use askama::Template;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

pub const FORMAT: &str = "web";

const DATA_DIR: &str = "_data";
const COMMON_SCRIPT: &str = "common/bundle.js";

const COMMON_JS: &str = include_str!("../../templates/web/common.js");

#[derive(Template)]
#[template(path = "web/epub.html")]
struct EpubPage<'a> {
    main_file: &'a str,
}

#[derive(Template)]
#[template(path = "web/html.html")]
struct HtmlPage<'a> {
    main_file: &'a str,
}

#[derive(Template)]
#[template(path = "web/pdf.html")]
struct PdfPage<'a> {
    main_file: &'a str,
}

/// Viewer page flavour picked from the main file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebTemplate {
    Epub,
    Html,
    Pdf,
}

impl WebTemplate {
    pub fn for_main_file(main_file: &str) -> Result<Self> {
        let ext = Path::new(main_file)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "opf" => Ok(Self::Epub),
            "html" | "htm" | "xhtml" => Ok(Self::Html),
            "pdf" => Ok(Self::Pdf),
            _ => Err(BundleError::UnsupportedContent(main_file.to_string())),
        }
    }

    /// Page text with the main file substituted; the path is HTML-escaped
    pub fn render(self, main_file: &str) -> Result<String> {
        let page = match self {
            Self::Epub => EpubPage { main_file }.render()?,
            Self::Html => HtmlPage { main_file }.render()?,
            Self::Pdf => PdfPage { main_file }.render()?,
        };
        Ok(page)
    }
}

/// Bundle path as a relative filesystem path that cannot escape its root
fn safe_relative(bundle_path: &str) -> Result<PathBuf> {
    let relative = PathBuf::from(bundle_path);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || bundle_path.is_empty() {
        return Err(BundleError::InvalidArgument(format!(
            "bundle path {:?} leaves the export directory",
            bundle_path
        )));
    }
    Ok(relative)
}

pub struct WebSink {
    order: EntryOrder,
    root: PathBuf,
    main_file: Option<String>,
    finished: bool,
}

impl WebSink {
    pub async fn create(opts: &SinkOptions) -> Result<Self> {
        tokio::fs::create_dir_all(opts.path.join(DATA_DIR)).await?;
        Ok(Self {
            order: EntryOrder::new(),
            root: opts.path.clone(),
            main_file: None,
            finished: false,
        })
    }

    async fn write_file(&self, file: FileEntry) -> Result<()> {
        let target = self.root.join(DATA_DIR).join(safe_relative(&file.bundle_path)?);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut reader = file.content.open().await?;
        let mut out = tokio::fs::File::create(&target).await?;
        let size = tokio::io::copy(&mut reader, &mut out).await?;
        out.sync_all().await?;
        debug!(path = %file.bundle_path, size, "web file written");
        Ok(())
    }

    async fn finalize(&self) -> Result<()> {
        let main = self
            .main_file
            .as_deref()
            .ok_or_else(|| BundleError::UnsupportedContent("main file is not set".into()))?;
        let template = WebTemplate::for_main_file(main)?;

        let script = self.root.join(COMMON_SCRIPT);
        if let Some(parent) = script.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&script, COMMON_JS).await?;
        tokio::fs::write(self.root.join("index.html"), template.render(main)?).await?;
        debug!(?template, main_file = main, "web export finalized");
        Ok(())
    }
}

#[async_trait]
impl BundleSink for WebSink {
    async fn write_entry(&mut self, entry: Entry) -> Result<()> {
        self.order.check(&entry)?;
        match entry {
            Entry::BundleInfo(_) => Ok(()),
            Entry::BundleProps(props) => {
                let props = props.as_plain().ok_or_else(|| {
                    BundleError::UnsupportedContent("bundle properties are encrypted".into())
                })?;
                self.main_file = main_file(props).map(str::to_string);
                Ok(())
            }
            Entry::File(file) => self.write_file(file).await,
            Entry::End => {
                self.finalize().await?;
                self.finished = true;
                Ok(())
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}
