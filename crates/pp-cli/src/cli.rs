use std::net::SocketAddr;
use std::path::PathBuf;

use alloy_primitives::{Address, B256};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "permapass",
    about = "PermaPass: ledger-anchored product passports",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Configuration file (permapass.toml).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the upload API, DID resolver and gateway over the configured
    /// networks, or over a development chain when none has an RPC endpoint
    Serve(ServeArgs),
    /// Encode or decode data-carrier deep links
    Link(LinkArgs),
    /// Compute the digest a chip signs for a caller and anchor block
    Digest(DigestArgs),
    /// Upload a JSON payload to the configured content store
    Upload(UploadArgs),
    /// Fetch a payload from the configured gateway
    Fetch(FetchArgs),
    /// Create, update and read a passport end to end on a development chain
    Demo(DemoArgs),
    /// Read a passport from a deep link over the configured networks
    Read(ReadArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Server configuration file.
    #[arg(long)]
    pub server_config: Option<PathBuf>,
}

#[derive(Args)]
pub struct LinkArgs {
    #[command(subcommand)]
    pub action: LinkAction,
}

#[derive(Subcommand)]
pub enum LinkAction {
    /// Build the deep link for a metadata locator (ar://<txid>)
    Encode {
        locator: String,
        #[arg(long)]
        scheme: Option<String>,
    },
    /// Extract the metadata locator from a deep link
    Decode { link: String },
}

#[derive(Args)]
pub struct DigestArgs {
    pub caller: Address,
    pub block_hash: B256,
}

#[derive(Args)]
pub struct UploadArgs {
    /// JSON file; reads stdin when omitted.
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct FetchArgs {
    pub locator: String,
}

#[derive(Args)]
pub struct ReadArgs {
    /// Deep link scanned from a QR code or NFC tag.
    pub link: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum KindArg {
    Nft,
    Did,
    Pbt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum CarrierArg {
    Qr,
    Nfc,
}

#[derive(Args)]
pub struct DemoArgs {
    #[arg(long, value_enum, default_value = "nft")]
    pub kind: KindArg,
    #[arg(long, value_enum, default_value = "qr")]
    pub carrier: CarrierArg,
    /// Number of updates applied after creation.
    #[arg(long, default_value = "2")]
    pub updates: usize,
}
