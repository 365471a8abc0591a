pub mod cli;
pub mod config;

use {
    crate::{cli::Command, config::Config},
    anyhow::{Result, bail},
    serde_json::Value,
    shroud_sdk::{client::Client, session::Session},
    std::{
        io::{self, Write},
        path::PathBuf,
        sync::{Arc, Mutex},
    },
    tracing::info,
    tracing_subscriber::{EnvFilter, prelude::*},
};

/// Installs the global subscriber. Logs go to `log_file` if set, and to stderr otherwise.
#[inline]
pub fn setup_logger(log_file: Option<PathBuf>, log_filter: &str) -> Result<()> {
    let writer: Box<dyn Write + Send> = match log_file {
        Some(path) => Box::new(
            fs_err::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?,
        ),
        None => Box::new(io::stderr()),
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(Mutex::new(writer)))
        .with(EnvFilter::try_new(log_filter)?)
        .try_init()?;
    Ok(())
}

/// Builds the client described by `config`, bound to its session if it has a secret.
#[inline]
pub fn client(config: &Config) -> Result<Client> {
    let client = Client::new(config.server_url.clone(), config.client_options())?;
    Ok(match &config.shared_secret {
        Some(secret) => client.with_session(Arc::new(Session::new(secret.clone()))),
        None => {
            info!("no shared secret configured, requests will not be encrypted");
            client
        }
    })
}

#[inline]
pub async fn run(command: Command, config: &Config) -> Result<()> {
    let client = client(config)?;
    match command {
        Command::Get { path } => {
            let response: Option<Value> = client.get(&path).await?;
            print_json(response.as_ref())?;
        }
        Command::Post { path, body } => {
            let body: Value = serde_json::from_str(&body)?;
            let response: Option<Value> = client.post(&path, &body).await?;
            print_json(response.as_ref())?;
        }
        Command::Range {
            path,
            start,
            end,
            output,
        } => {
            let reader = client.payload_reader(client.url(&path)?);
            let chunk = reader.read_range(start, end).await?;
            info!(
                len = chunk.bytes.len(),
                content_type = ?chunk.content_type,
                total_size = ?chunk.total_size,
                "payload window decrypted"
            );
            match output {
                Some(output) => fs_err::write(output, &chunk.bytes)?,
                None => io::stdout().lock().write_all(&chunk.bytes)?,
            }
        }
        Command::PayloadHeader { path } => {
            let info = client
                .payload_header(&client.url(&path)?, config.shared_secret.is_some())
                .await?;
            let mut out = io::stdout().lock();
            writeln!(out, "encrypted: {}", info.header.encrypted)?;
            writeln!(
                out,
                "content type: {}",
                info.header.content_type.as_deref().unwrap_or("unknown")
            )?;
            if let Some(length) = info.header.content_length {
                writeln!(out, "stored size: {length}")?;
            }
            writeln!(out, "key header unwrapped: {}", info.key_header.is_some())?;
        }
        Command::EncryptUrl { path } => {
            writeln!(io::stdout().lock(), "{}", client.encrypt_url(&client.url(&path)?)?)?;
        }
        Command::GenerateSecret => bail!("generate-secret does not need a config"),
    }
    Ok(())
}

fn print_json(value: Option<&Value>) -> Result<()> {
    let mut out = io::stdout().lock();
    match value {
        Some(value) => writeln!(out, "{}", serde_json::to_string_pretty(value)?)?,
        None => writeln!(out, "(no content)")?,
    }
    Ok(())
}
