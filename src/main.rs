use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use leadsheet::cli::{Cli, Command};
use leadsheet::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    leadsheet::logging::init(cli.verbose).context("init logging")?;
    tracing::debug!(command = ?cli.command, "parsed cli");

    let config = Config::load(&cli.global).context("load config")?;

    match cli.command {
        Command::Run(args) => {
            leadsheet::pipeline::run(args, &config).await.context("run")?;
        }
        Command::Rewrite(args) => {
            leadsheet::rewrite::run(args, &config)
                .await
                .context("rewrite")?;
        }
        Command::Search(args) => {
            leadsheet::search::run(args, &config).await.context("search")?;
        }
        Command::Extract(args) => {
            leadsheet::extract::run(args, &config)
                .await
                .context("extract")?;
        }
        Command::Flatten(args) => {
            leadsheet::flatten::run(args).context("flatten")?;
        }
        Command::Sheet(args) => {
            leadsheet::sheet::run(args, &config).await.context("sheet")?;
        }
    }

    Ok(())
}
