use clap::Parser;
use flkpak::codec::DEFAULT_COMPRESSION_LEVEL;
use flkpak::packer::{pack, PackMode, PackOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;

#[derive(Parser)]
#[command(name = "flkpak", about = "Pack a directory into a .flk archive")]
struct Cli {
    /// Input directory to pack
    #[arg(value_parser = existing_dir)]
    input_dir: PathBuf,
    /// Output .flk file
    output: PathBuf,
    /// Compression level (1-22 for Zstd)
    #[arg(short = 'c', long = "compression", default_value_t = DEFAULT_COMPRESSION_LEVEL,
          value_parser = clap::value_parser!(i32).range(1..=22))]
    level: i32,
    /// Enable compression
    #[arg(long)]
    compress: bool,
    /// Enable encryption
    #[arg(long)]
    encrypt: bool,
    /// Custom content version number
    #[arg(long, default_value_t = 0)]
    content_version: u32,
    /// Passphrase for --encrypt
    #[arg(long, env = "FLK_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Log every computed size and offset
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let mode = PackMode::from_flags(cli.compress, cli.encrypt);
    let opts = PackOptions {
        mode,
        level:           cli.level,
        content_version: cli.content_version,
        password:        cli.password,
    };

    if mode.compresses() {
        tracing::info!("mode: {} (level {})", mode.name(), opts.level);
    } else {
        tracing::info!("mode: {}", mode.name());
    }

    match pack(&cli.input_dir, &cli.output, &opts) {
        Ok(summary) => {
            println!(
                "Packed {} file(s): {} -> {} bytes, archive {} bytes",
                summary.entry_count, summary.total_base, summary.total_packed, summary.archive_size
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("packing failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = match (verbose, quiet) {
        (true, _)  => Level::DEBUG,
        (_, true)  => Level::WARN,
        _          => Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();
}

fn existing_dir(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(format!("directory does not exist: {s}"))
    }
}
