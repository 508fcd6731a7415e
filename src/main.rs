//! querygate - natural-language SQL behind a safety and confirmation gate.

use anyhow::Context;
use querygate::cli::{self, Cli};
use tracing::error;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    if let Err(e) = runtime.block_on(cli::run(cli)) {
        error!("{}: {}", e.category(), e);
        eprintln!("{}: {}", e.category(), e);
        std::process::exit(1);
    }

    Ok(())
}
