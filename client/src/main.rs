use {
    anyhow::Result,
    clap::Parser,
    shroud::{
        cli::{Cli, Command, default_config_path},
        config::Config,
        run, setup_logger,
    },
    shroud_protocol::SharedSecret,
    std::io::{self, Write},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.command == Command::GenerateSecret {
        let secret = SharedSecret::generate();
        writeln!(io::stdout().lock(), "{}", secret.display_unmasked())?;
        return Ok(());
    }

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)?;
    setup_logger(config.log_file.clone(), &config.log_filter)?;
    run(cli.command, &config).await
}
