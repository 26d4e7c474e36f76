//! Haas CLI - precedence-effect demo
//!
//! Plays one WAV file three times, perceived from the center, the left and
//! the right.

use anyhow::anyhow;
use clap::Parser;
use env_logger::Env;
use log::info;

use haas::cli::{commands, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Haas v{}", env!("CARGO_PKG_VERSION"));

    if cli.list_devices {
        return commands::list_devices(&mut std::io::stdout())
            .map_err(|err| anyhow!(err).context("failed to list output devices"));
    }

    let file = cli
        .file
        .as_deref()
        .ok_or_else(|| anyhow!("no audio file given"))?;

    if let Err(err) = commands::play_file(file, cli.playback_config(), cli.dry_run) {
        for hint in err.recovery_suggestions() {
            eprintln!("hint: {}", hint);
        }
        return Err(anyhow!(err).context(format!("failed to play '{}'", file.display())));
    }

    Ok(())
}
