use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{error, warn};

use dicomjson::batch::{decode_batch, DecodeOptions};

/// Convert DICOM records to editable JSON plus a grayscale PNG.
#[derive(Debug, Parser)]
#[command(name = "dicom2json")]
struct Args {
    /// DICOM file(s) to convert to JSON
    #[arg(required = true)]
    input_files: Vec<PathBuf>,

    /// Output filename (single input only)
    #[arg(short, long)]
    output_filename: Option<String>,

    /// Remove DICOM fields after extraction, by keyword or tag
    #[arg(short = 'r', long = "remove-dicom-fields", num_args = 1..)]
    remove_dicom_fields: Vec<String>,

    /// Directory receiving the JSON and PNG artifacts
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Write a manifest of template/image/output triples for a later
    /// encode pass
    #[arg(long)]
    manifest: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt().with_target(false).init();
    let args = Args::parse();

    let mut output_filename = args.output_filename;
    if args.input_files.len() > 1 && output_filename.take().is_some() {
        warn!("--output-filename is ignored when converting multiple files");
    }

    let options = DecodeOptions {
        output_dir: args.output_dir,
        output_filename,
        remove_fields: args.remove_dicom_fields,
    };
    let outcome = decode_batch(&args.input_files, &options);

    for (input, failure) in &outcome.failures {
        error!("{}: {}", input.display(), failure);
    }

    if let Some(manifest_path) = &args.manifest {
        if let Err(failure) = outcome.manifest.write(manifest_path) {
            error!("cannot write manifest: {}", failure);
            process::exit(failure.exit_code());
        }
    }

    if let Some((_, failure)) = outcome.failures.first() {
        process::exit(failure.exit_code());
    }
}
