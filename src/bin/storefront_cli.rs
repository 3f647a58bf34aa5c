use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use storefront_api::{
    auth::{AuthService, ADMIN_ROLE, CUSTOMER_ROLE},
    config::{self, AppConfig},
    db::{self, DbConfig, DbPool},
    services::{
        audit::AuditService, carts::CartService, inventory::InventoryService,
        pricing::PricingPolicy,
    },
};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "storefront", about = "Storefront maintenance and operator tasks", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Mark carts past their expiry as expired
    ExpireCarts,
    /// Mint a bearer token for local testing
    IssueToken {
        #[arg(long)]
        user_id: Option<Uuid>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, action = ArgAction::SetTrue)]
        admin: bool,
    },
    /// List inventory at or below its reorder point
    LowStock,
    /// Run the suspicious-activity detectors for one admin
    ScanAdmin {
        #[arg(long)]
        admin_id: Uuid,
    },
}

struct CliContext {
    config: AppConfig,
    db: Arc<DbPool>,
}

impl CliContext {
    async fn initialize(config: AppConfig) -> Result<Self> {
        let pool = db::establish_connection_with_config(&DbConfig {
            sqlx_logging: false,
            ..DbConfig::from(&config)
        })
        .await
        .context("failed to connect to database")?;
        Ok(Self {
            config,
            db: Arc::new(pool),
        })
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(&cfg.log_level, cfg.log_json);

    match cli.command {
        Commands::IssueToken {
            user_id,
            email,
            name,
            admin,
        } => {
            let auth = AuthService::from_config(&cfg);
            let user_id = user_id.unwrap_or_else(Uuid::new_v4);
            let mut roles = vec![CUSTOMER_ROLE.to_string()];
            if admin {
                roles.push(ADMIN_ROLE.to_string());
            }
            let token = auth
                .issue_token(user_id, email, name, roles)
                .context("failed to issue token")?;
            if cli.json {
                print_json(&serde_json::json!({ "userId": user_id, "token": token }))?;
            } else {
                println!("User: {}", user_id);
                println!("{}", token);
            }
        }
        Commands::Migrate => {
            let ctx = CliContext::initialize(cfg).await?;
            db::run_migrations(&ctx.db)
                .await
                .context("migration failed")?;
            println!("Migrations applied");
        }
        Commands::ExpireCarts => {
            let ctx = CliContext::initialize(cfg).await?;
            let carts = CartService::new(
                ctx.db.clone(),
                PricingPolicy::from(&ctx.config.pricing),
                ctx.config.carts.clone(),
            );
            let count = carts.expire_stale().await.context("cart sweep failed")?;
            if cli.json {
                print_json(&serde_json::json!({ "expired": count }))?;
            } else {
                println!("Expired {} cart(s)", count);
            }
        }
        Commands::LowStock => {
            let ctx = CliContext::initialize(cfg).await?;
            let inventory = InventoryService::new(ctx.db.clone());
            let items = inventory.low_stock().await.context("query failed")?;
            if cli.json {
                print_json(&items)?;
            } else if items.is_empty() {
                println!("No low-stock items");
            } else {
                for item in items {
                    println!(
                        "{}  available {:>5}  reorder at {:>5}",
                        item.product_id,
                        item.available(),
                        item.reorder_point
                    );
                }
            }
        }
        Commands::ScanAdmin { admin_id } => {
            let ctx = CliContext::initialize(cfg).await?;
            let audit = AuditService::new(ctx.db.clone(), ctx.config.audit.clone());
            let found = audit
                .detect_suspicious_activity(admin_id)
                .await
                .context("scan failed")?;
            if cli.json {
                print_json(&found)?;
            } else if found.is_empty() {
                println!("Nothing suspicious for {}", admin_id);
            } else {
                for pattern in found {
                    println!(
                        "{} ({}): {} occurrence(s)",
                        pattern.pattern, pattern.severity, pattern.occurrences
                    );
                }
            }
        }
    }

    Ok(())
}
