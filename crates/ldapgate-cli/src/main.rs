//! Ldapgate - HTTP Basic-Auth validated against an LDAP directory
//!
//! Runs the authentication service, or exercises the directory from the
//! command line when troubleshooting connectivity.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use ldapgate_api::GateServer;
use ldapgate_auth::{
    AuthenticationResult, Credentials, HealthProber, LdapAuthenticator, LdapConfig, LdapPool,
    MemoryCache, UserResolver,
};
use ldapgate_core::config::GateConfig;
use std::io::BufRead;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ldapgate")]
#[command(author = "Ldapgate Team")]
#[command(version = ldapgate_core::VERSION)]
#[command(about = "HTTP Basic-Auth validated against an LDAP directory", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true, env = "LDAPGATE_CONFIG")]
    config: Option<String>,

    /// Bind address
    #[arg(long, global = true, env = "LDAPGATE_BIND_ADDRESS")]
    bind: Option<String>,

    /// Port number
    #[arg(short, long, global = true, env = "LDAPGATE_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LDAPGATE_LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Server,

    /// Check once that the directory answers, exiting non-zero if not
    Probe,

    /// Verify one user's credentials, bypassing the cache.
    /// The password is read from standard input.
    Verify {
        /// Username as sent in the Basic-Auth header
        #[arg(short, long)]
        username: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if matches!(cli.command, Some(Commands::Version)) {
        println!("ldapgate {}", ldapgate_core::VERSION);
        return Ok(());
    }

    let config = load_config(&cli)?;
    init_logging(&config);

    match cli.command {
        Some(Commands::Server) | None => run_server(config).await,
        Some(Commands::Probe) => run_probe(&config).await,
        Some(Commands::Verify { username }) => run_verify(&config, username).await,
        Some(Commands::Version) => Ok(()),
    }
}

/// Config file or environment, then command-line overrides
fn load_config(cli: &Cli) -> anyhow::Result<GateConfig> {
    let mut config = match &cli.config {
        Some(path) => GateConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => GateConfig::from_env()
            .context("Failed to load configuration from the environment")?,
    };

    apply_overrides(&mut config, cli);
    Ok(config)
}

fn apply_overrides(config: &mut GateConfig, cli: &Cli) {
    if let Some(bind) = &cli.bind {
        config.server.bind_address = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
}

fn init_logging(config: &GateConfig) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

async fn run_server(config: GateConfig) -> anyhow::Result<()> {
    info!("Starting Ldapgate {}...", ldapgate_core::VERSION);
    info!("Directory: {}", config.ldap.endpoint);

    GateServer::new(config).run().await?;

    Ok(())
}

async fn run_probe(config: &GateConfig) -> anyhow::Result<()> {
    let ldap = LdapConfig::from_section(&config.ldap)?;
    let resolver = Arc::new(UserResolver::new(&ldap, Arc::new(LdapPool::new(&ldap))));

    if !HealthProber::new(resolver).probe().await {
        bail!("LDAP directory {} is unreachable", ldap.endpoint);
    }

    println!("LDAP directory {} is reachable", ldap.endpoint);
    Ok(())
}

async fn run_verify(config: &GateConfig, username: String) -> anyhow::Result<()> {
    let ldap = LdapConfig::from_section(&config.ldap)?;
    let password = read_password()?;

    let authenticator = LdapAuthenticator::new(
        &ldap,
        config.auth.userid_hmac_secret.clone(),
        Arc::new(LdapPool::new(&ldap)),
        Arc::new(MemoryCache::new()),
    );

    match authenticator
        .verify_uncached(&Credentials::new(username, password))
        .await
    {
        AuthenticationResult::Authenticated(username) => {
            println!("{}: authenticated", username);
            Ok(())
        }
        AuthenticationResult::Denied(reason) => bail!("Denied: {}", reason),
        AuthenticationResult::Indeterminate(reason) => {
            bail!("Could not reach the directory: {}", reason)
        }
    }
}

/// First line of standard input, without its line ending
fn read_password() -> anyhow::Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from standard input")?;

    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
