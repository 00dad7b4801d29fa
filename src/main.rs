use clap::{Parser, Subcommand};
use rawnv::pipeline::{self, UnwrapOptions, WrapOptions};
use rawnv::report::TracingReporter;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rawnv", about = "Extract and repack raw_nv router configuration backups")]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a backup file into a directory tree
    Extract {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        /// Also write the raw header (a.header) and payload (b.tar.gz)
        #[arg(short, long)]
        keep_intermediates: bool,
        /// Do not remove a leading \r\n before decompressing
        #[arg(long)]
        no_strip_crlf: bool,
    },
    /// Pack a directory tree into a backup file
    Pack {
        output: PathBuf,
        #[arg(short, long, default_value = "./etc")]
        source: PathBuf,
        /// Top-level directory name recorded in the archive
        #[arg(long, default_value = "etc")]
        root_name: String,
        /// Also write the generated payload (b.tar.gz) next to the output
        #[arg(short, long)]
        keep_intermediates: bool,
    },
    /// Show the header of a backup file
    Inspect {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let reporter = TracingReporter;

    match cli.command {

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, output_dir, keep_intermediates, no_strip_crlf } => {
            let data = std::fs::read(&input)?;
            let opts = UnwrapOptions {
                diagnostics_dir:    keep_intermediates.then(|| output_dir.clone()),
                dest:               output_dir,
                strip_leading_crlf: !no_strip_crlf,
            };
            let result = pipeline::unwrap(&data, &opts, &reporter)?;
            tracing::info!(
                entries = result.entries.len(),
                warnings = result.warnings.len(),
                "Extraction successful, edit the files under {}",
                opts.dest.display()
            );
        }

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { output, source, root_name, keep_intermediates } => {
            let opts = WrapOptions {
                root_name,
                diagnostics_dir: keep_intermediates.then(|| parent_dir(&output)),
                ..WrapOptions::default()
            };
            let bytes = pipeline::wrap(&source, &opts, &reporter)?;
            write_atomic(&output, &bytes)?;
            tracing::info!(bytes = bytes.len(), "Created: {}", output.display());
        }

        // ── Inspect ──────────────────────────────────────────────────────────
        Commands::Inspect { input, json } => {
            let data = std::fs::read(&input)?;
            let inspection = pipeline::inspect(&data, &reporter)?;
            let summary = inspection.header.summary();
            if json {
                let doc = serde_json::json!({
                    "header": summary,
                    "payload_len": inspection.payload.len(),
                    "stripped_crlf": inspection.stripped_crlf,
                    "warnings": inspection.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                println!("── raw_nv container ─────────────────────────────────────");
                println!("  Path            {}", input.display());
                println!("  Magic           {} ({})", summary.magic, summary.magic_hex);
                println!("  Payload size    {} B", summary.compressed_size);
                println!("  Checksum        0x{:08X}", summary.checksum);
                println!("  Version         0x{:04X}", summary.version);
                println!("  FS id           0x{:04X}", summary.fs_id);
                println!("  Leading CR LF   {}", inspection.stripped_crlf);
                println!("  Warnings        {}", inspection.warnings.len());
                for w in &inspection.warnings {
                    println!("    {w}");
                }
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Write through a temporary file in the destination directory and rename on success.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(parent_dir(path))?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
