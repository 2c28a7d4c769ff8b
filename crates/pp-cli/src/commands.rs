use std::io::Read;
use std::sync::Arc;

use alloy_primitives::Address;
use anyhow::{bail, Context};
use colored::Colorize;
use pp_chip::SoftwareChip;
use pp_crypto::{chip_digest, SigningKey};
use pp_ledger::{InMemoryLedger, Ledger};
use pp_sdk::{
    AutoApprove, CreationPlan, CreationState, DataCarrier, IdentityKind, PassportConfig,
    PassportHistory, PassportPayload, PermaPass,
};
use pp_server::{AppState, PassportServer, ServerConfig};
use pp_store::{ContentStore, HttpContentStore, InMemoryContentStore};
use pp_types::{ContentLocator, DataCarrierLink, Network, NetworkDeployment};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Command::Serve(args) => cmd_serve(config, args).await,
        Command::Link(args) => cmd_link(&config, args, cli.format),
        Command::Digest(args) => cmd_digest(args),
        Command::Upload(args) => cmd_upload(&config, args).await,
        Command::Fetch(args) => cmd_fetch(&config, args).await,
        Command::Demo(args) => cmd_demo(config, args, cli.format).await,
        Command::Read(args) => cmd_read(config, args, cli.format).await,
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<PassportConfig> {
    let Some(path) = &cli.config else {
        return Ok(PassportConfig::default());
    };
    let config =
        PassportConfig::load(path).with_context(|| format!("loading {}", path.display()))?;
    tracing::debug!(networks = config.networks.len(), "configuration loaded");
    Ok(config)
}

async fn cmd_serve(config: PassportConfig, args: ServeArgs) -> anyhow::Result<()> {
    let mut server_config = match &args.server_config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        server_config.bind_addr = bind;
    }

    let store = Arc::new(InMemoryContentStore::new());
    let mut state = AppState::new(store);
    let remote: Vec<_> = config
        .networks
        .iter()
        .filter(|network| network.rpc_url.is_some())
        .collect();

    println!(
        "{} PermaPass server on {}",
        "✓".green().bold(),
        server_config.bind_addr.to_string().bold()
    );
    println!("  App scheme: {}", config.app_scheme.cyan());
    if remote.is_empty() {
        let (ledger, deployment) = InMemoryLedger::with_registries(Network::Hardhat);
        state = state.with_network(deployment, Arc::new(ledger));
        println!("  Development chain: {} ({})", "hardhat".yellow(), deployment.chain_id());
        print_registries(&deployment);
    }
    for network in remote {
        let deployment = network.deployment()?;
        let ledger = network.rpc_ledger()?;
        println!(
            "  Network: {} ({}) via {}",
            network.name.yellow(),
            deployment.chain_id(),
            ledger.url()
        );
        print_registries(&deployment);
        state = state.with_network(deployment, Arc::new(ledger));
    }

    PassportServer::new(server_config, state).serve().await?;
    Ok(())
}

fn print_registries(deployment: &NetworkDeployment) {
    println!("  Token registry:    {}", deployment.registries.token);
    println!("  DID registry:      {}", deployment.registries.did);
    println!("  PBT registry:      {}", deployment.registries.physical_token);
    println!("  Chip metadata:     {}", deployment.registries.chip_metadata);
}

fn cmd_link(config: &PassportConfig, args: LinkArgs, format: OutputFormat) -> anyhow::Result<()> {
    match args.action {
        LinkAction::Encode { locator, scheme } => {
            let locator = parse_locator(&locator)?;
            let scheme = scheme.unwrap_or_else(|| config.app_scheme.clone());
            println!("{}", DataCarrierLink::new(scheme, locator).encode());
        }
        LinkAction::Decode { link } => {
            let link = DataCarrierLink::parse(&link)?;
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({
                        "scheme": link.scheme(),
                        "metadataURI": link.metadata_locator().to_uri(),
                    })
                ),
                OutputFormat::Text => {
                    println!("Scheme:   {}", link.scheme().cyan());
                    println!("Metadata: {}", link.metadata_locator().to_uri().yellow());
                }
            }
        }
    }
    Ok(())
}

fn cmd_digest(args: DigestArgs) -> anyhow::Result<()> {
    println!("{}", chip_digest(args.caller, args.block_hash));
    Ok(())
}

async fn cmd_upload(config: &PassportConfig, args: UploadArgs) -> anyhow::Result<()> {
    let text = match &args.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let payload: serde_json::Value = serde_json::from_str(&text).context("payload is not JSON")?;
    let store = HttpContentStore::new(config.store.clone())?;
    let locator = store.upload(&payload).await?;
    println!("{locator}");
    Ok(())
}

async fn cmd_fetch(config: &PassportConfig, args: FetchArgs) -> anyhow::Result<()> {
    let locator = parse_locator(&args.locator)?;
    let store = HttpContentStore::new(config.store.clone())?;
    let payload = store.fetch(&locator).await?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

async fn cmd_demo(config: PassportConfig, args: DemoArgs, format: OutputFormat) -> anyhow::Result<()> {
    let (ledger, deployment) = InMemoryLedger::with_registries(Network::Hardhat);
    let ledger = Arc::new(ledger);
    // Chip attestations anchor to the block below the head.
    ledger.mine_empty(1);

    let account = SigningKey::generate().address();
    let chip = Arc::new(SoftwareChip::new(SigningKey::generate()));
    let chain = ledger.clone();
    let client = PermaPass::from_config(
        config.with_deployment(deployment),
        account,
        Arc::new(InMemoryContentStore::new()),
        move |_| chain.clone() as Arc<dyn Ledger>,
    )?
    .with_chip_driver(chip);

    let plan = CreationPlan {
        payload: demo_payload("new"),
        kind: match args.kind {
            KindArg::Nft => IdentityKind::Token,
            KindArg::Did => IdentityKind::SelfSovereign,
            KindArg::Pbt => IdentityKind::PhysicalToken,
        },
        chain_id: deployment.chain_id(),
        carrier: match args.carrier {
            CarrierArg::Qr => DataCarrier::Qr,
            CarrierArg::Nfc => DataCarrier::Nfc,
        },
    };
    let outcome = client.orchestrator(Arc::new(AutoApprove)).run(plan).await;
    if format == OutputFormat::Text {
        println!("Attempt {}: {}", outcome.attempt, outcome.trail.join(" → "));
    }
    let passport = match outcome.state {
        CreationState::Done { passport } => passport,
        CreationState::Failed { reason } => bail!("passport creation failed: {reason}"),
        other => bail!("creation stopped in state {}", other.name()),
    };

    for n in 1..=args.updates {
        client
            .update_passport(&passport.identity, &demo_payload(&format!("service {n}")))
            .await?;
    }

    let history = client.reader().read_link(&passport.link).await?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "passport": passport,
                "history": history,
            }))?
        ),
        OutputFormat::Text => {
            println!("{} Passport created", "✓".green().bold());
            println!("  Link: {}", passport.link.cyan());
            print_history(&history);
        }
    }
    Ok(())
}

async fn cmd_read(config: PassportConfig, args: ReadArgs, format: OutputFormat) -> anyhow::Result<()> {
    if config.networks.is_empty() {
        bail!("no networks configured; pass --config with [[networks]] entries");
    }
    let store = Arc::new(HttpContentStore::new(config.store.clone())?);
    // Reading submits nothing, so no account is needed.
    let client = PermaPass::connect(config, Address::ZERO, store)?;
    let history = client.reader().read_link(&args.link).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&history)?),
        OutputFormat::Text => print_history(&history),
    }
    Ok(())
}

fn print_history(history: &PassportHistory) {
    println!(
        "  Identity: {} ({} on chain {})",
        history.metadata.identity_key().to_string().yellow(),
        history.metadata.kind(),
        history.metadata.ledger_id()
    );
    println!("  Owner: {}", history.owner);
    if history.deleted {
        println!("  {}", "revoked".red().bold());
    }
    for version in &history.versions {
        let when = version
            .entry
            .timestamp_utc()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| version.entry.ledger_timestamp.to_string());
        println!(
            "  {} block {} {} {}",
            "•".blue(),
            version.entry.block_number,
            when.dimmed(),
            version.entry.content_locator
        );
        println!(
            "      {}",
            serde_json::Value::Object(version.payload.attributes().clone())
        );
    }
}

fn demo_payload(condition: &str) -> PassportPayload {
    PassportPayload::new()
        .with("name", "Beam A")
        .with("condition", condition)
}

/// Accept both `ar://<txid>` and a bare transaction id.
fn parse_locator(s: &str) -> anyhow::Result<ContentLocator> {
    let locator = if s.starts_with("ar://") {
        ContentLocator::parse(s)?
    } else {
        ContentLocator::from_txid(s)?
    };
    Ok(locator)
}
