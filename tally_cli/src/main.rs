use clap::Parser;
use log::*;
use std::time::Duration;
use tally_cli::commands::{execute, open_manager, watch};
use tally_cli::config::{CliCommand, Config, GlobalOptions};

#[tokio::main]
async fn main() {
    env_logger::init();
    let config: Config = Config::parse();
    let (global_options, command) = config.to_parts();

    match run(command, global_options).await {
        Ok(()) => {}
        Err(err) => {
            eprintln!("** Error ** \n {err}");
            std::process::exit(1);
        }
    }
}

async fn run(command: CliCommand, options: GlobalOptions) -> Result<(), anyhow::Error> {
    let config = options.channel_config()?;
    if let Some(dir) = &config.data_dir {
        debug!("Using data directory {}", dir.display());
    }
    let manager = open_manager(config)?;
    match command {
        CliCommand::Watch { interval_secs } => watch(&manager, Duration::from_secs(interval_secs.max(1))).await,
        command => {
            let output = execute(command, &manager).await?;
            println!("{output}");
            Ok(())
        }
    }
}
