use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::error;

use dicomjson::batch::{encode_file, EncodeOptions};

/// Rebuild DICOM records from a template JSON artifact, field overrides
/// and an optional grayscale image.
#[derive(Debug, Parser)]
#[command(name = "json2dicom")]
struct Args {
    /// JSON override document (single object or array) to convert
    input_json_file: PathBuf,

    /// Output filename (single object inputs only)
    #[arg(short, long)]
    output_filename: Option<String>,

    /// Directory receiving the DICOM records
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,
}

fn main() {
    tracing_subscriber::fmt().with_target(false).init();
    let args = Args::parse();

    let options = EncodeOptions {
        output_dir: args.output_dir,
        output_filename: args.output_filename,
    };

    match encode_file(&args.input_json_file, &options) {
        Err(failure) => {
            error!("{}: {}", args.input_json_file.display(), failure);
            process::exit(failure.exit_code());
        }
        Ok(outcome) => {
            for (index, failure) in &outcome.failures {
                error!("record #{}: {}", index, failure);
            }
            if let Some((_, failure)) = outcome.failures.first() {
                process::exit(failure.exit_code());
            }
        }
    }
}
