//! Credential service command line: settings check and key generation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use credential_service::keys::{
    EcCurve, generate_aes_key, generate_ecdsa_key, generate_guid_key, generate_rsa_key,
    rsa::DEFAULT_RSA_BITS,
};
use credential_service::telemetry::{LogConfig, init_logging};
use credential_service::{CredentialContext, LocalSettings, SecretStore, SnapshotSource};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "credential-service", version, about = "Credential trust layer tools")]
struct Cli {
    /// Settings file (KEY=VALUE lines) layered over the process environment
    #[arg(short, long, env = "CREDENTIAL_SETTINGS", global = true)]
    settings: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, env = "CREDENTIAL_JSON_LOGS", global = true)]
    json_logs: bool,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve settings and report which credential features are usable
    Check {
        /// Exit with an error when any feature is not ready
        #[arg(long)]
        strict: bool,
    },
    /// Generate key material for configuration
    #[command(subcommand)]
    Generate(Generate),
}

#[derive(Subcommand)]
enum Generate {
    /// RSA key pair in XML and PKCS#1 forms
    Rsa {
        #[arg(long, default_value_t = DEFAULT_RSA_BITS)]
        bits: usize,
    },
    /// ECDSA private key in SEC1 form
    Ecdsa {
        #[arg(long, default_value = "P-384")]
        curve: EcCurve,
    },
    /// AES key and IV
    Aes {
        #[arg(long, default_value_t = 256)]
        bits: u32,
    },
    /// Random GUID obfuscation key
    GuidKey,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::default()
        .with_level(cli.log_level.clone())
        .with_json(cli.json_logs);
    init_logging(&log_config).context("failed to initialize logging")?;

    match cli.command {
        Commands::Check { strict } => check(cli.settings, strict).await,
        Commands::Generate(kind) => generate(kind),
    }
}

async fn check(settings: Option<PathBuf>, strict: bool) -> Result<()> {
    let mut local = LocalSettings::from_env();
    if let Some(path) = settings {
        let file = LocalSettings::from_file(&path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        local = local.merged_with(file);
    }
    info!(settings = local.len(), "Resolving configuration");

    let store = SecretStore::new(local);
    let context = CredentialContext::from_store(&store).await;

    match context.settings().source() {
        SnapshotSource::LocalOnly => println!("settings: local only"),
        SnapshotSource::Merged { vault_secrets } => {
            println!("settings: local merged with {vault_secrets} vault secrets");
        }
    }

    let features = context.features();
    for feature in &features {
        println!("{feature}");
    }

    let not_ready = features.iter().filter(|f| !f.is_ready()).count();
    if strict && not_ready > 0 {
        anyhow::bail!("{not_ready} credential features are not ready");
    }
    Ok(())
}

fn generate(kind: Generate) -> Result<()> {
    match kind {
        Generate::Rsa { bits } => {
            let key = generate_rsa_key(bits).map_err(anyhow::Error::msg)?;
            println!("public_xml: {}", key.public_xml);
            println!("private_xml: {}", key.private_xml);
            println!("public_pkcs1: {}", key.public_pkcs1);
            println!("private_pkcs1: {}", key.private_pkcs1);
        }
        Generate::Ecdsa { curve } => {
            let (key, algorithm) = generate_ecdsa_key(curve).map_err(anyhow::Error::msg)?;
            println!("algorithm: {algorithm}");
            println!("private_sec1: {key}");
        }
        Generate::Aes { bits } => {
            let (key, iv) = generate_aes_key(bits).map_err(anyhow::Error::msg)?;
            println!("key: {key}");
            println!("iv: {iv}");
        }
        Generate::GuidKey => println!("{}", generate_guid_key()),
    }
    Ok(())
}
