//! ERP Link operator CLI
//!
//! Pairs devices with the ERP, checks credentials and runs reconciliation
//! against the local store.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use erplink_core::{
    DeviceRegistrar, ErpClient, ErpLinkConfig, Reconciler, ServiceSession, StaticToken, Store,
    SyncScheduler, SyncScope, TokenProvider,
};
use rpassword::prompt_password;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "erplink", about = "ERP device pairing and reconciliation")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "erplink.toml")]
    config: PathBuf,

    /// ERP base URL override
    #[arg(long)]
    erp_url: Option<String>,

    /// Database path override
    #[arg(short, long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pair a device serial with the ERP
    Register {
        #[arg(long)]
        tenant: String,

        #[arg(long)]
        serial: String,

        /// Use this integration id instead of the serial prefix
        #[arg(long)]
        integration_id: Option<u32>,
    },

    /// Refresh the generation version and lock number of a device
    Generation {
        #[arg(long)]
        tenant: String,

        #[arg(long)]
        integration_id: u32,
    },

    /// Log in to the ERP and print the token
    Login {
        #[arg(long)]
        tenant: String,

        #[arg(long)]
        integration_id: u32,

        #[arg(long)]
        username: String,

        /// Password (will prompt if not provided)
        #[arg(long)]
        password: Option<String>,
    },

    /// Check whether a token is still accepted
    Authorized {
        #[arg(long)]
        tenant: String,

        #[arg(long)]
        integration_id: u32,

        #[arg(long)]
        token: String,
    },

    /// Reconcile one or more scopes now
    Sync {
        #[arg(long)]
        tenant: String,

        #[arg(long)]
        integration_id: u32,

        /// Scope to pull; repeatable. Defaults to the scheduled scopes
        #[arg(long = "scope")]
        scopes: Vec<SyncScope>,

        /// Bearer token; the service account is used when omitted
        #[arg(long)]
        token: Option<String>,
    },

    /// Show recent sync runs
    Runs {
        #[arg(long)]
        tenant: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Run the periodic sync for all configured targets until interrupted
    Schedule,
}

struct AppContext {
    config: ErpLinkConfig,
    store: Store,
    client: Arc<ErpClient>,
}

fn build_context(cli: &Cli) -> Result<AppContext> {
    let mut config = ErpLinkConfig::load_or_default(&cli.config)?;
    if let Some(erp_url) = &cli.erp_url {
        config.erp_url = erp_url.clone();
        config.normalize();
    }
    if let Some(database) = &cli.database {
        config.database_path = database.clone();
    }
    config.validate()?;

    let store = Store::open(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path.display()))?;
    let client = Arc::new(ErpClient::from_config(&config, store.clone())?);

    Ok(AppContext {
        config,
        store,
        client,
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();
    let ctx = build_context(&cli)?;

    match cli.command {
        Commands::Register {
            tenant,
            serial,
            integration_id,
        } => {
            let registrar = DeviceRegistrar::new(
                ctx.client.clone(),
                ctx.store.clone(),
                &ctx.config.default_generation_version,
            );
            let mut device = registrar
                .register_device(&tenant, &serial, integration_id)
                .await?;

            match registrar
                .refresh_generation_info(&tenant, device.integration_id)
                .await
            {
                Ok(refreshed) => device = refreshed,
                Err(e) => warn!("Could not fetch generation info: {}", e),
            }
            print_json(&device)?;
        }

        Commands::Generation {
            tenant,
            integration_id,
        } => {
            let registrar = DeviceRegistrar::new(
                ctx.client.clone(),
                ctx.store.clone(),
                &ctx.config.default_generation_version,
            );
            let device = registrar
                .refresh_generation_info(&tenant, integration_id)
                .await?;
            print_json(&device)?;
        }

        Commands::Login {
            tenant,
            integration_id,
            username,
            password,
        } => {
            let password = match password {
                Some(password) => password,
                None => prompt_password("ERP password: ")?,
            };
            let login = ctx
                .client
                .login(&tenant, integration_id, &username, &password)
                .await?;
            print_json(&login)?;
        }

        Commands::Authorized {
            tenant,
            integration_id,
            token,
        } => {
            let authorized = ctx
                .client
                .is_authorized(&tenant, integration_id, &token)
                .await?;
            println!("{}", authorized);
        }

        Commands::Sync {
            tenant,
            integration_id,
            scopes,
            token,
        } => {
            let scopes = if scopes.is_empty() {
                ctx.config.scheduled_scopes.clone()
            } else {
                scopes
            };

            let tokens: Box<dyn TokenProvider> = match token {
                Some(token) => Box::new(StaticToken::new(&token)),
                None => Box::new(ServiceSession::from_config(
                    &ctx.config,
                    ctx.client.clone(),
                    ctx.store.clone(),
                )),
            };
            let token = tokens.token(&tenant, integration_id, None).await?;

            let reconciler = Reconciler::new(ctx.client.clone(), ctx.store.clone());
            let report = reconciler
                .sync_many(&scopes, &tenant, integration_id, &token)
                .await;

            for scope_report in &report.succeeded {
                println!("{:<12} ok     {}", scope_report.scope, scope_report.count);
            }
            for (scope, e) in &report.failed {
                println!("{:<12} error  {}", scope, e);
            }
            if !report.is_complete() {
                bail!("{} scope(s) failed", report.failed.len());
            }
        }

        Commands::Runs { tenant, limit } => {
            let runs = ctx.store.list_sync_runs(&tenant, limit)?;
            print_json(&runs)?;
        }

        Commands::Schedule => {
            if ctx.config.targets.is_empty() {
                bail!("No sync targets configured in {}", cli.config.display());
            }

            let reconciler = Arc::new(Reconciler::new(ctx.client.clone(), ctx.store.clone()));
            let tokens = Arc::new(ServiceSession::from_config(
                &ctx.config,
                ctx.client.clone(),
                ctx.store.clone(),
            ));

            info!(
                "Scheduling {} target(s) every {}s",
                ctx.config.targets.len(),
                ctx.config.sync_interval_secs
            );
            let handle = SyncScheduler::from_config(&ctx.config, reconciler, tokens).spawn();

            tokio::signal::ctrl_c().await?;
            info!("Shutting down scheduler");
            handle.abort();
        }
    }

    Ok(())
}
