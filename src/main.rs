//! devproxy: local development proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Browser / curl                 ┌──────────────────────────────────────────────┐
//!     ─────────────────────────────▶ │ http listener ─┐                             │
//!     (PAC points *.tld here)        │                ├─▶ dispatcher ─┬─▶ proxy ────┼──▶ dev server
//!     ─────────────────────────────▶ │ tls listener ──┘   (route      ├─▶ files ────┼──▶ local folder
//!                                    │  (minted leaf)      table)     └─▶ tunnel ───┼──▶ CONNECT target
//!                                    └──────────────────────────────────────────────┘
//! ```

use std::process::ExitCode;

use clap::Parser;

use devproxy::cli::{self, Cli};
use devproxy::observability::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(logging::DEFAULT_FILTER);

    match cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
