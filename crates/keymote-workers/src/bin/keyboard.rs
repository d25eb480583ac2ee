//! `keymote-keyboard-worker`: types text and taps keys for the Keymote host.

use anyhow::Context;
use clap::Parser;

use keymote_workers::application::backend::KeyboardBackend;
use keymote_workers::application::worker::KeyboardWorker;
use keymote_workers::infrastructure::{self, dry_run::DryRunBackend};

#[derive(Debug, Parser)]
#[command(
    name = "keymote-keyboard-worker",
    version,
    about = "Reads keyboard commands on stdin and injects them"
)]
struct Cli {
    /// Log commands instead of injecting them.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    keymote_workers::init_logging();

    let backend: Box<dyn KeyboardBackend> = if cli.dry_run {
        Box::new(DryRunBackend)
    } else {
        infrastructure::keyboard_backend().context("keyboard backend unavailable")?
    };
    let mut worker = KeyboardWorker::new(backend);
    keymote_workers::run_stdio(&mut worker).context("stdio failed")?;
    Ok(())
}
