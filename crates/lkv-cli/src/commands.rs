use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;

use lkv_fabric::{SimulatedCa, SimulatedNetwork};
use lkv_gateway::{EnrollmentCredentials, GatewayConfig, LedgerClient, TopologyLoader};
use lkv_server::{LkvServer, ServerConfig};
use lkv_store::FileSystemKeyStore;
use lkv_types::TopologyDescriptor;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let out = Output(cli.format);

    if let Command::Profile(ProfileArgs {
        action: ProfileAction::Check { path },
    }) = &cli.command
    {
        return cmd_profile_check(&config, path.as_deref(), out);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(async move {
        let backend = Backend::open(config)?;
        match cli.command {
            Command::Serve(args) => cmd_serve(backend, args).await,
            Command::Enroll(args) => cmd_enroll(&backend, args, out).await,
            Command::Get(args) => cmd_get(&backend, &args.key, out).await,
            Command::Put(args) => cmd_put(&backend, &args.key, &args.value, out).await,
            Command::Private(args) => cmd_private(&backend, args.action, out).await,
            Command::Profile(_) => Ok(()),
        }
    })
}

fn load_config(path: Option<&Path>) -> anyhow::Result<GatewayConfig> {
    let config = match path {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::from_env()?,
    };
    Ok(config)
}

#[derive(Clone, Copy)]
struct Output(OutputFormat);

impl Output {
    fn json(self) -> bool {
        self.0 == OutputFormat::Json
    }
}

/// Gateway core wired to the in-process simulated CA and peer network.
///
/// Identities persist in the wallet directory; ledger state lives only as
/// long as the process.
struct Backend {
    config: GatewayConfig,
    ca: Arc<SimulatedCa>,
    client: LedgerClient,
}

impl Backend {
    fn open(config: GatewayConfig) -> anyhow::Result<Self> {
        let topology = TopologyLoader::load(&config)?;
        let store = FileSystemKeyStore::open(&config.wallet_path).with_context(|| {
            format!("cannot open wallet at {}", config.wallet_path.display())
        })?;
        let ca = Arc::new(
            SimulatedCa::new(config.ca_name.clone())
                .with_user(config.admin_user.clone(), config.admin_password.clone()),
        );
        // Wallet certificates may come from an earlier process's CA key, so
        // the simulated peers do not check issuers.
        let network = SimulatedNetwork::new().seed_from_topology(&topology, &config.contract_name);
        let client = LedgerClient::new(
            config.clone(),
            topology,
            Arc::new(store),
            ca.clone(),
            Arc::new(network),
        );
        tracing::debug!(wallet = %config.wallet_path.display(), "simulated backend ready");
        Ok(Self { config, ca, client })
    }
}

async fn cmd_serve(backend: Backend, args: ServeArgs) -> anyhow::Result<()> {
    let mut server_config = ServerConfig::from_env()?;
    if let Some(port) = args.port {
        server_config.bind_addr.set_port(port);
    }
    println!(
        "{} Serving channel {} / contract {} on {}",
        "✓".green().bold(),
        backend.config.channel_name.yellow(),
        backend.config.contract_name.yellow(),
        server_config.bind_addr.to_string().bold()
    );
    LkvServer::new(server_config, Arc::new(backend.client)).serve().await?;
    Ok(())
}

async fn cmd_enroll(backend: &Backend, args: EnrollArgs, out: Output) -> anyhow::Result<()> {
    let identities = backend.client.sessions().identities();
    let identity = match (args.name, args.secret) {
        (Some(name), Some(secret)) => {
            backend.ca.register(name.clone(), secret.clone());
            identities
                .ensure_identity(&name, &EnrollmentCredentials::new(name.clone(), secret))
                .await?
        }
        (Some(name), None) => identities.ensure_known(&name).await?,
        (None, _) => backend.client.enroll_admin().await?,
    };

    if out.json() {
        println!(
            "{}",
            json!({ "name": identity.name(), "mspId": identity.msp_id(), "type": identity.kind().to_string() })
        );
    } else {
        println!("{} Identity {} ready", "✓".green().bold(), identity.name().bold());
        println!("  MSP: {}", identity.msp_id().cyan());
        println!("  Wallet: {}", backend.config.wallet_path.display());
    }
    Ok(())
}

async fn cmd_get(backend: &Backend, key: &str, out: Output) -> anyhow::Result<()> {
    let Some(value) = backend.client.get_value(key).await? else {
        bail!("key not found: {key}");
    };
    if out.json() {
        println!("{}", json!({ "key": key, "value": value }));
    } else {
        println!("{} = {}", key.bold(), value);
    }
    Ok(())
}

async fn cmd_put(backend: &Backend, key: &str, value: &str, out: Output) -> anyhow::Result<()> {
    let response = backend.client.put_value(key, value).await?;
    if out.json() {
        println!("{}", json!({ "key": key, "value": value, "response": response }));
    } else {
        println!("{} Stored {} ({})", "✓".green().bold(), key.bold(), response.dimmed());
    }
    Ok(())
}

async fn cmd_private(backend: &Backend, action: PrivateAction, out: Output) -> anyhow::Result<()> {
    match action {
        PrivateAction::Put { collection, message } => {
            let response = backend.client.put_private_message(&collection, &message).await?;
            if out.json() {
                println!("{}", json!({ "collection": collection, "response": response }));
            } else {
                println!("{} Stored private message in {}", "✓".green().bold(), collection.bold());
            }
        }
        PrivateAction::Get { collection } => {
            let Some(message) = backend.client.get_private_message(&collection).await? else {
                bail!("no private message in collection {collection}");
            };
            if out.json() {
                println!("{}", json!({ "collection": collection, "message": message }));
            } else {
                println!("{}: {}", collection.bold(), message);
            }
        }
        PrivateAction::Verify { collection, message } => {
            let verified = backend.client.verify_private_message(&collection, &message).await?;
            if out.json() {
                println!("{}", json!({ "verified": verified, "collection": collection }));
            } else if verified {
                println!("{} Message verified in {}", "✓".green().bold(), collection.bold());
            } else {
                println!("{} Message verification failed", "✗".red().bold());
            }
        }
    }
    Ok(())
}

fn cmd_profile_check(config: &GatewayConfig, path: Option<&Path>, out: Output) -> anyhow::Result<()> {
    let path = path.unwrap_or(&config.connection_profile);
    let topology = TopologyLoader::load_path(path)?;
    TopologyLoader::validate(&topology, config)?;

    if out.json() {
        println!("{}", profile_summary(&topology));
        return Ok(());
    }
    println!("{} Profile {} is valid", "✓".green().bold(), path.display().to_string().bold());
    println!("  CA: {}", config.ca_name.cyan());
    let channels: Vec<&str> = topology.channel_names().collect();
    println!("  Channels: {}", channels.join(", ").yellow());
    for (name, endpoint) in topology.endpoints() {
        println!("  {} {}", name, endpoint.url.dimmed());
    }
    Ok(())
}

fn profile_summary(topology: &TopologyDescriptor) -> serde_json::Value {
    json!({
        "name": topology.name,
        "channels": topology.channel_names().collect::<Vec<_>>(),
        "certificateAuthorities": topology.certificate_authorities.keys().collect::<Vec<_>>(),
        "endpoints": topology
            .endpoints()
            .into_iter()
            .map(|(name, e)| json!({ "name": name, "url": e.url }))
            .collect::<Vec<_>>(),
    })
}
