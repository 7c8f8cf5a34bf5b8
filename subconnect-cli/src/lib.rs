pub mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, DecodeAddressCmd, ValidateCmd};
use subconnect_connector::address;
use subconnect_core::{load_settings, SessionStore};

/// Parses the command line and runs the selected command.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate(cmd) => validate(cmd),
        Commands::DecodeAddress(cmd) => decode_address(cmd),
    }
}

fn validate(cmd: ValidateCmd) -> Result<()> {
    // Logging is configured by the file being validated.
    println!("Loading settings from '{}'", &cmd.config);
    let settings = load_settings(&cmd.config)?;
    subconnect_logger::init(&settings.log)?;

    let config = settings
        .into_builder()
        .context("Failed to open session storage")?
        .build()
        .context("Invalid session configuration")?;
    tracing::info!(chains = config.chains.len(), "Configuration is valid");

    println!("app: {} (auto-connect: {})", config.app_name, config.auto_connect);
    for chain in &config.chains {
        let endpoint = config
            .transport(&chain.genesis_hash)
            .and_then(|t| t.preferred_endpoint())
            .unwrap_or("-");
        println!(
            "{:<20} {:<68} {:<44} ss58={} {}",
            chain.name,
            chain.genesis_hash,
            chain.caip_id(),
            chain.ss58_format,
            endpoint
        );
    }

    let store = SessionStore::with_config(config);
    if let Some(chain) = store.current_chain() {
        println!("active chain: {} ({})", chain.name, chain.genesis_hash);
    }
    Ok(())
}

fn decode_address(cmd: DecodeAddressCmd) -> Result<()> {
    let id = address::decode(&cmd.address)
        .with_context(|| format!("'{}' is not a valid SS58 or hex address", cmd.address))?;
    let public_key = address::public_key_hex(&cmd.address).unwrap_or_default();
    println!("public key: {}", public_key);
    if let Some(prefix) = cmd.prefix {
        println!("ss58 ({}): {}", prefix, address::encode(prefix, &id));
    }
    Ok(())
}
