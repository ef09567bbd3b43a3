use crate::error::Result;
use crate::pipeline::{pump, CryptoTransform, MasterKey, PumpSummary, Transform};
use crate::props::BundleProps;
use crate::resolver::{create_sink, create_source, BundleType};
use crate::sink::SinkOptions;
use crate::source::SourceOptions;
use std::path::Path;
use tracing::info;

/// Options for the makebundle command
#[derive(Debug, Clone, Default)]
pub struct MakeOptions {
    /// Relative path of the main file inside the bundle
    pub index: Option<String>,
    /// Input format; sniffed from the input path when absent
    pub input_type: Option<BundleType>,
    /// Output format; sniffed from the output path when absent
    pub output_type: Option<BundleType>,
    /// Decrypt the input with this key
    pub input_key: Option<MasterKey>,
    /// Encrypt the output with this key
    pub output_key: Option<MasterKey>,
    /// Extra bundle info merged in by sinks that store it
    pub info: Option<BundleProps>,
}

/// Convert `input` into a new bundle at `output`
pub async fn make_bundle(input: &Path, output: &Path, options: &MakeOptions) -> Result<PumpSummary> {
    let mut source_opts = SourceOptions::new(input);
    source_opts.bundle_type = options.input_type;
    source_opts.encrypted = options.input_key.is_some();
    source_opts.props = options
        .index
        .as_deref()
        .map(|index| BundleProps::from_mapping([("main_file", index)]));
    let mut source = create_source(&source_opts)?;

    let mut stages: Vec<Box<dyn Transform>> = Vec::new();
    if let Some(key) = &options.input_key {
        stages.push(Box::new(CryptoTransform::decrypt(key.clone())));
    }
    if let Some(key) = &options.output_key {
        stages.push(Box::new(CryptoTransform::encrypt(key.clone())));
    }

    let mut sink_opts = SinkOptions::new(output);
    sink_opts.bundle_type = options.output_type;
    sink_opts.info = options.info.clone();
    let mut sink = create_sink(&sink_opts).await?;

    let summary = pump(source.as_mut(), &mut stages, sink.as_mut()).await?;
    info!(
        input = %input.display(),
        output = %output.display(),
        files = summary.files,
        "bundle written"
    );
    Ok(summary)
}
