use crate::entry::PropsPayload;
use crate::error::Result;
use crate::pipeline::{pump, CryptoTransform, MasterKey, Transform};
use crate::resolver::{create_source, BundleType};
use crate::sink::InspectSink;
use crate::source::SourceOptions;
use std::path::Path;

/// Options for the bundleinfo command
#[derive(Debug, Clone, Default)]
pub struct InfoOptions {
    /// Decrypt with this key before printing
    pub key: Option<MasterKey>,
    /// Print only public data (bundle info and file paths)
    pub public_only: bool,
    /// Input format; sniffed from the path when absent
    pub bundle_type: Option<BundleType>,
}

/// Describe a bundle as printable text
pub async fn show_bundle_info(path: &Path, options: &InfoOptions) -> Result<String> {
    let mut source_opts = SourceOptions::new(path);
    source_opts.bundle_type = options.bundle_type;
    source_opts.encrypted = options.public_only || options.key.is_some();
    let mut source = create_source(&source_opts)?;

    let mut stages: Vec<Box<dyn Transform>> = Vec::new();
    if let Some(key) = &options.key {
        stages.push(Box::new(CryptoTransform::decrypt(key.clone())));
    }
    let mut sink = InspectSink::new();
    pump(source.as_mut(), &mut stages, &mut sink).await?;

    Ok(render(&sink, options.public_only))
}

fn payload_text(payload: &PropsPayload) -> String {
    match payload {
        PropsPayload::Plain(props) => props.to_canonical_text(),
        PropsPayload::Sealed(data) => format!("<encrypted, {} bytes>", data.len()),
    }
}

fn render(sink: &InspectSink, public_only: bool) -> String {
    let mut output = String::new();

    if let Some(info) = &sink.info {
        output.push_str("Bundle info:\n");
        output.push_str(&format!("   {}\n", info.to_canonical_text()));
    }
    if !public_only {
        if let Some(props) = &sink.props {
            output.push_str("Bundle properties:\n");
            output.push_str(&format!("   {}\n", payload_text(props)));
        }
    }
    for file in &sink.files {
        output.push_str("File:\n");
        output.push_str(&format!("  Path: {}\n", file.bundle_path));
        if public_only {
            continue;
        }
        if let Some(props) = &file.props {
            output.push_str(&format!("  Properties: {}\n", payload_text(props)));
        }
    }
    output
}
