use bundlekit::cli::{make_bundle, show_bundle_info, InfoOptions, MakeOptions};
use bundlekit::pipeline::MasterKey;
use bundlekit::resolver::BundleType;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Version info from build.rs
const VERSION: &str = env!("BUNDLEKIT_VERSION");
const BUILD: &str = env!("BUNDLEKIT_BUILD");
const PROFILE: &str = env!("BUNDLEKIT_PROFILE");
const GIT_HASH: &str = env!("BUNDLEKIT_GIT_HASH");

fn get_version() -> &'static str {
    use std::sync::OnceLock;
    static VERSION_STRING: OnceLock<String> = OnceLock::new();
    VERSION_STRING.get_or_init(|| format!("{} {} build {} ({})", PROFILE, VERSION, BUILD, GIT_HASH))
}

#[derive(Parser)]
#[command(name = "bundlekit")]
#[command(author, about = "Convert, inspect and encrypt content bundles", long_about = None)]
struct Cli {
    /// Print version
    #[arg(short = 'V', long)]
    version: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print bundle info, properties and file list
    #[command(name = "bundleinfo")]
    BundleInfo {
        /// Bundle to inspect
        path: PathBuf,

        /// Master key (64 hex chars) to decrypt properties and content
        #[arg(short = 'k', long, value_parser = parse_key)]
        key: Option<MasterKey>,

        /// Print public data only
        #[arg(short = 'p', long)]
        public: bool,

        /// Input format (sniffed from the path by default)
        #[arg(short = 't', long = "type", value_parser = parse_type)]
        bundle_type: Option<BundleType>,
    },

    /// Convert a bundle, optionally re-encrypting it
    #[command(name = "makebundle")]
    MakeBundle {
        /// Input bundle, directory or file
        input: PathBuf,

        /// Output path
        #[arg(short = 'o', long, required = true)]
        output: PathBuf,

        /// Relative path of the main file
        #[arg(short = 'i', long)]
        index: Option<String>,

        /// Output format (sniffed from the output path by default)
        #[arg(short = 't', long = "type", value_parser = parse_type)]
        bundle_type: Option<BundleType>,

        /// Input format (sniffed from the input path by default)
        #[arg(long = "input-type", value_parser = parse_type)]
        input_type: Option<BundleType>,

        /// Master key (64 hex chars) the input is encrypted with
        #[arg(short = 'k', long = "key", value_parser = parse_key)]
        in_key: Option<MasterKey>,

        /// Master key (64 hex chars) to encrypt the output with
        #[arg(short = 'K', long = "out-key", value_parser = parse_key)]
        out_key: Option<MasterKey>,
    },
}

fn parse_key(s: &str) -> Result<MasterKey, String> {
    MasterKey::from_hex(s).map_err(|e| format!("{}", e))
}

fn parse_type(s: &str) -> Result<BundleType, String> {
    s.parse().map_err(|e| format!("{}", e))
}

fn init_tracing(level: &str) {
    let log_level: tracing::Level = level.parse().unwrap_or(tracing::Level::WARN);
    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!("bundlekit {}", get_version());
        return ExitCode::SUCCESS;
    }

    let command = match cli.command {
        Some(cmd) => cmd,
        None => {
            use clap::CommandFactory;
            if let Err(e) = Cli::command().print_help() {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
            println!();
            return ExitCode::SUCCESS;
        }
    };

    init_tracing(&cli.log_level);

    let result = match command {
        Commands::BundleInfo {
            path,
            key,
            public,
            bundle_type,
        } => {
            let options = InfoOptions {
                key,
                public_only: public,
                bundle_type,
            };
            show_bundle_info(&path, &options).await.map(|info| {
                print!("{}", info);
            })
        }

        Commands::MakeBundle {
            input,
            output,
            index,
            bundle_type,
            input_type,
            in_key,
            out_key,
        } => {
            let options = MakeOptions {
                index,
                input_type,
                output_type: bundle_type,
                input_key: in_key,
                output_key: out_key,
                info: None,
            };
            make_bundle(&input, &output, &options).await.map(|summary| {
                println!("Wrote {} files to {}", summary.files, output.display());
            })
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
