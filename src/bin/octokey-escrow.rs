// Copyright (c) 2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Standalone escrow server: holds uploaded key shares in memory and
//! applies them to sign requests.

use clap::Parser;
use octokey::escrow::EscrowServer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to listen on.
    #[arg(short, long, default_value = "0.0.0.0:5005")]
    listen: String,
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let server = EscrowServer::bind(&cli.listen)?;
    if let Some(addr) = server.local_addr() {
        info!("listening on {addr}");
    }
    server.run();
    Ok(())
}
