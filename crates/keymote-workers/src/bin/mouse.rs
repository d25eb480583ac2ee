//! `keymote-mouse-worker`: moves the pointer, clicks and scrolls for the
//! Keymote host.

use anyhow::Context;
use clap::Parser;

use keymote_workers::application::backend::MouseBackend;
use keymote_workers::application::worker::MouseWorker;
use keymote_workers::infrastructure::{self, dry_run::DryRunBackend};

#[derive(Debug, Parser)]
#[command(
    name = "keymote-mouse-worker",
    version,
    about = "Reads pointer commands on stdin and injects them"
)]
struct Cli {
    /// Log commands instead of injecting them.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    keymote_workers::init_logging();

    let backend: Box<dyn MouseBackend> = if cli.dry_run {
        Box::new(DryRunBackend)
    } else {
        infrastructure::mouse_backend().context("pointer backend unavailable")?
    };
    let mut worker = MouseWorker::new(backend);
    keymote_workers::run_stdio(&mut worker).context("stdio failed")?;
    Ok(())
}
