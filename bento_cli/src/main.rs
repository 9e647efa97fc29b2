use anyhow::anyhow;
use bento_cli::commands::exec_command;
use bento_cli::config::{CliCommand, Config, GlobalOptions};
use bento_cli::interactive::InteractiveApp;
use bento_cli::settings::Settings;
use bento_link::CoapTransport;
use clap::Parser;
use log::*;

#[tokio::main]
async fn main() {
    env_logger::init();
    let config: Config = Config::parse();
    let (global_options, command) = config.to_parts();

    let result = match command {
        CliCommand::Interactive => run_interactive(global_options).await,
        command => run_once(command, global_options).await,
    };

    if let Err(err) = result {
        eprintln!("** Error ** \n {err}");
        std::process::exit(1);
    }
}

async fn run_once(command: CliCommand, options: GlobalOptions) -> Result<(), anyhow::Error> {
    let settings = Settings::load_or_default(options.config_file.as_ref())?.with_overrides(&options);
    let transport = CoapTransport::new(&settings.exchange_config());
    let output = exec_command(command, &settings, transport).await?;
    println!("{output}");
    Ok(())
}

async fn run_interactive(options: GlobalOptions) -> Result<(), anyhow::Error> {
    info!("Starting interactive session");
    // The menu blocks on terminal input, so it gets a thread of its own
    tokio::task::spawn_blocking(move || InteractiveApp::new(options)?.run())
        .await
        .map_err(|e| anyhow!("The interactive session ended abnormally. {e}"))??;
    println!("Bye :)");
    Ok(())
}
