//! `keymote-mute-worker`: sets the system output mute flag for the Keymote
//! host.  Restores audio on exit if it was left muted.

use anyhow::Context;
use clap::Parser;

use keymote_workers::application::backend::MuteBackend;
use keymote_workers::application::worker::MuteWorker;
use keymote_workers::infrastructure::{self, dry_run::DryRunBackend};

#[derive(Debug, Parser)]
#[command(
    name = "keymote-mute-worker",
    version,
    about = "Reads MUTE / UNMUTE on stdin and applies them to the default output"
)]
struct Cli {
    /// Log commands instead of applying them.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    keymote_workers::init_logging();

    let backend: Box<dyn MuteBackend> = if cli.dry_run {
        Box::new(DryRunBackend)
    } else {
        infrastructure::mute_backend().context("mute backend unavailable")?
    };
    let mut worker = MuteWorker::new(backend);
    keymote_workers::run_stdio(&mut worker).context("stdio failed")?;
    Ok(())
}
