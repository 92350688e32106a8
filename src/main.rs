use std::process::exit;

use clap::Parser;

use hostnic::core::{Commands, CLI};

fn main() {
    let cli = CLI::parse();

    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let request = match cli.command {
        Commands::Daemon(args) => return hostnic::daemon(args, cli.socket),
        Commands::Network(cmd) => cmd.into_request(),
        Commands::Endpoint(cmd) => cmd.into_request(),
    };

    if !hostnic::client(cli.socket, request) {
        exit(1);
    }
}
