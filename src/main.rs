mod cancel;
mod checksums;
mod cli;
mod commands;
mod delta;
mod hash;
mod io_json;
mod logging;
mod model;
mod path;
mod pipeline;
mod prune;
mod publish;
mod scan;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.global.logformat, cli.global.loglevel);

    match &cli.command {
        Command::Build(args) => commands::build(args, cli.global.timeout),
        Command::Prune(args) => commands::prune(args, cli.global.timeout),
    }
}
