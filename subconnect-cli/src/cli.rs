use clap::{Parser, Subcommand};

/// Operator tooling for subconnect session configurations.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a settings file, validate it and print the chain table.
    Validate(ValidateCmd),
    /// Decode an SS58 or hex address into its public key.
    DecodeAddress(DecodeAddressCmd),
}

/// Arguments for the `validate` subcommand.
#[derive(Parser, Debug)]
pub struct ValidateCmd {
    /// Path to the settings TOML file.
    #[arg(short, long)]
    pub config: String,
}

/// Arguments for the `decode-address` subcommand.
#[derive(Parser, Debug)]
pub struct DecodeAddressCmd {
    /// The address to decode.
    pub address: String,

    /// Also print the address re-encoded with this SS58 prefix.
    #[arg(short, long)]
    pub prefix: Option<u16>,
}
