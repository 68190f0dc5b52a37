//! Keywarden agent - main binary
//!
//! Rotates asymmetric keys on schedule:
//! - publishes public keys (filesystem, HTTP)
//! - stores private material as secrets (split-pem, single-pem, JKS)
//! - wipes key material once persisted

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keywarden_core::KeySpec;
use keywarden_crypto::{KeyGenerator, StandardKeyGenerator};
use keywarden_publish::{PublishManager, PublisherConfig};
use keywarden_rotation::{apply_defaults, AdmissionValidator};
use keywarden_vault::{FormatRenderer, OutputFormat, RenderOptions, StandardRenderer};
use std::path::{Path, PathBuf};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use keywarden_agent::{Agent, AgentConfig};
use keywarden_agent::state::load_profiles;

/// Keywarden key lifecycle agent
#[derive(Parser)]
#[command(name = "keywarden")]
#[command(about = "Keywarden - scheduled key generation, publication and rotation")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the reconcile loop
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/keywarden/agent.toml", env = "KEYWARDEN_CONFIG")]
        config: PathBuf,

        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },

    /// Check a profiles file the way admission would
    Validate {
        /// JSON file with a list of key profiles
        profiles: PathBuf,
    },

    /// Generate one key and write its rendered files
    Keygen {
        /// EC or RSA
        #[arg(short, long, default_value = "EC")]
        algorithm: String,

        /// Curve for EC keys
        #[arg(long, default_value = "P-256")]
        curve: String,

        /// Modulus size for RSA keys
        #[arg(long, default_value_t = 3072)]
        key_size: u32,

        /// Permit RSA key sizes below 3072
        #[arg(long)]
        allow_legacy_key_size: bool,

        /// split-pem, single-pem or jks
        #[arg(short, long, default_value = "split-pem")]
        format: String,

        /// Keystore password (jks)
        #[arg(long, env = "KEYWARDEN_KEYSTORE_PASSWORD")]
        password: Option<String>,

        /// Keystore alias (jks)
        #[arg(long)]
        alias: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = "./keys")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, once } => {
            let config = AgentConfig::load(&config)?;
            config.validate()?;
            init_logging(if cli.verbose { "debug" } else { config.agent.log_level.as_str() });
            run(config, once).await
        }
        Command::Validate { profiles } => {
            init_logging(if cli.verbose { "debug" } else { "warn" });
            validate(&profiles).await
        }
        Command::Keygen {
            algorithm,
            curve,
            key_size,
            allow_legacy_key_size,
            format,
            password,
            alias,
            output,
        } => {
            init_logging(if cli.verbose { "debug" } else { "info" });
            let spec = match algorithm.as_str() {
                "RSA" => KeySpec::rsa(key_size, allow_legacy_key_size),
                "EC" => KeySpec::ec(&curve),
                other => anyhow::bail!("unsupported algorithm {:?}, must be one of: EC, RSA", other),
            };
            let mut opts = RenderOptions::new(format.parse::<OutputFormat>()?);
            if let Some(password) = password {
                opts = opts.with_password(password);
            }
            if let Some(alias) = alias {
                opts = opts.with_alias(alias);
            }
            keygen(&spec, &opts, &output).await
        }
    }
}

fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},keywarden=debug", level).into()),
        )
        .with_target(true)
        .with_line_number(true)
        .init();
}

async fn run(config: AgentConfig, once: bool) -> Result<()> {
    info!("Starting keywarden agent v{}", env!("CARGO_PKG_VERSION"));

    let mut agent = Agent::new(config).await?;
    let cancel = CancellationToken::new();

    if once {
        let summary = agent.reconcile_once(&cancel).await?;
        info!(?summary, "single pass finished");
        return Ok(());
    }

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = signal::ctrl_c() => info!("Received shutdown signal (Ctrl+C)"),
            _ = shutdown_signal() => info!("Received shutdown signal (SIGTERM)"),
        }
        trigger.cancel();
    });

    if let Err(e) = agent.run(cancel).await {
        error!("Agent error: {:#}", e);
        return Err(e);
    }

    info!("Agent stopped gracefully");
    Ok(())
}

async fn validate(path: &Path) -> Result<()> {
    let validator = AdmissionValidator::for_manager(&PublishManager::with_defaults(&PublisherConfig::default())?);
    let mut rejected = 0usize;

    for mut profile in load_profiles(path).await? {
        apply_defaults(&mut profile);
        match validator.validate(&profile) {
            Ok(warnings) => {
                println!("{}: ok", profile.qualified_name());
                for warning in warnings {
                    println!("  warning: {}", warning);
                }
            }
            Err(e) => {
                println!("{}: {}", profile.qualified_name(), e);
                rejected += 1;
            }
        }
    }

    if rejected > 0 {
        anyhow::bail!("{} profile(s) rejected", rejected);
    }
    Ok(())
}

async fn keygen(spec: &KeySpec, opts: &RenderOptions, output_dir: &Path) -> Result<()> {
    let kp = StandardKeyGenerator::new().generate(spec)?;
    let fingerprint = kp.fingerprint()?;
    let bundle = StandardRenderer::new().render(&kp, opts)?;

    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    for (name, content) in bundle.iter() {
        let path = output_dir.join(name);
        write_private_file(&path, content).await?;
        info!("  {}: {}", name, path.display());
    }

    info!("Key generated:");
    info!("  Key ID:      {}", kp.key_id());
    info!("  Fingerprint: {}", fingerprint);
    Ok(())
}

async fn write_private_file(path: &Path, content: &[u8]) -> Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    tokio::io::AsyncWriteExt::write_all(&mut file, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Cross-platform shutdown signal handling
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    // On non-Unix systems, only Ctrl+C is supported
    std::future::pending::<()>().await
}
