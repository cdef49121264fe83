use clap::{Args, Parser, Subcommand};
use flkpak::format::HEADER_SIZE;
use flkpak::reader::{FlkReader, UnpackOptions};
use flkpak::FlkError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;

#[derive(Parser)]
#[command(name = "flkunpak", about = "Inspect and unpack .flk archives")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Log every entry as it is processed
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Args)]
struct ArchiveArgs {
    input: PathBuf,
    /// Blobs were compressed at pack time
    #[arg(long)]
    compressed: bool,
    /// Passphrase for encrypted archives
    #[arg(long, env = "FLK_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

impl ArchiveArgs {
    fn open(&self) -> Result<FlkReader<std::io::BufReader<std::fs::File>>, FlkError> {
        let opts = UnpackOptions {
            compressed: self.compressed,
            password:   self.password.clone(),
        };
        FlkReader::open(&self.input, &opts)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List archive entries
    List {
        input: PathBuf,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show header fields
    Info {
        input: PathBuf,
    },
    /// Extract every entry
    Unpack {
        #[command(flatten)]
        archive: ArchiveArgs,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Check layout and decode every entry
    Verify {
        #[command(flatten)]
        archive: ArchiveArgs,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match (cli.verbose, cli.quiet) {
        (true, _)  => Level::DEBUG,
        (_, true)  => Level::WARN,
        _          => Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.downcast_ref::<FlkError>().is_some_and(FlkError::is_auth_failure) {
                tracing::error!("{e} (check the password)");
            } else {
                tracing::error!("{e}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            // Listing never touches blobs, so no key is needed.
            let ar = FlkReader::open(&input, &UnpackOptions::default())?;
            let entries = ar.list();
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("{:<64} {:>12} {:>12} {:>12}", "Path", "Offset", "Size", "Stored");
                for e in &entries {
                    println!("{:<64} {:>12} {:>12} {:>12}", e.path, e.offset, e.base_size, e.packed_size);
                }
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let ar = FlkReader::open(&input, &UnpackOptions::default())?;
            let h = &ar.header;
            println!("── .flk Archive ─────────────────────────────────────────");
            println!("  Path            {}", input.display());
            println!("  Format version  {}", h.version);
            println!("  Reserved        0x{:04X}", h.reserved);
            println!("  Content version {}", h.content_version);
            println!("  Entries         {}", h.entry_count());
            println!("  Header size     {} B", HEADER_SIZE);
            println!("  Salt length     {} B", h.salt_len);
            if !ar.salt.is_empty() {
                println!("  Salt            {}", hex::encode(&ar.salt));
            }
            println!("  Archive size    {} B", ar.archive_len());
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { archive, output_dir } => {
            let mut ar = archive.open()?;
            let n = ar.extract_all(&output_dir)?;
            println!("Unpacked {} file(s) to {}", n, output_dir.display());
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { archive } => {
            let mut ar = archive.open()?;
            let report = ar.verify()?;
            println!("ok: {} entries, {} bytes", report.entries_checked, report.bytes_decoded);
        }
    }

    Ok(())
}
