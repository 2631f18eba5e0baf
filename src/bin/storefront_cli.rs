use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use storefront_api::{
    config::{self, AppConfig},
    db::{self, DbPool},
    services::{accounts::AccountService, expiry::ExpiryService, maintenance},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Orders(command) => handle_orders_command(&context, command, cli.json).await?,
        Commands::Db(command) => handle_db_command(&context, command, cli.json).await?,
        Commands::Users(command) => handle_users_command(&context, command, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "storefront-cli",
    about = "Operator tasks for the storefront: reservations, data and accounts",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(subcommand)]
    Orders(OrdersCommands),
    #[command(subcommand)]
    Db(DbCommands),
    #[command(subcommand)]
    Users(UsersCommands),
}

#[derive(Subcommand)]
enum OrdersCommands {
    /// Cancel pending orders whose reservation window has passed and restock them
    CancelExpired,
    /// Delete every order, payment and history row
    Reset(ResetArgs),
}

#[derive(Args)]
struct ResetArgs {
    #[arg(long, action = ArgAction::SetTrue, help = "Required; the reset cannot be undone")]
    confirm: bool,
}

#[derive(Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
    /// Load demo users, categories and products
    Seed,
}

#[derive(Subcommand)]
enum UsersCommands {
    /// Create a staff account
    CreateAdmin(CreateAdminArgs),
}

#[derive(Args)]
struct CreateAdminArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
}

struct CliContext {
    config: AppConfig,
    db: Arc<DbPool>,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(&config.log_level, config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;

        Ok(Self {
            config,
            db: Arc::new(db_pool),
        })
    }
}

#[derive(Serialize)]
struct CancelExpiredOutput {
    cancelled: u64,
    reservation_minutes: i64,
}

async fn handle_orders_command(
    context: &CliContext,
    command: OrdersCommands,
    json: bool,
) -> Result<()> {
    match command {
        OrdersCommands::CancelExpired => {
            let service = ExpiryService::new(context.db.clone(), None);
            let cancelled = service
                .cancel_expired_orders()
                .await
                .context("failed to cancel expired orders")?;
            let output = CancelExpiredOutput {
                cancelled,
                reservation_minutes: context.config.reservation_minutes,
            };
            if json {
                print_json(&output)?;
            } else if cancelled == 0 {
                println!("No expired reservations");
            } else {
                println!("Cancelled {} expired order(s) and returned their stock", cancelled);
            }
        }
        OrdersCommands::Reset(args) => {
            if !args.confirm {
                bail!("refusing to delete orders without --confirm");
            }
            let summary = maintenance::reset_orders(&context.db)
                .await
                .context("failed to reset orders")?;
            if json {
                print_json(&summary)?;
            } else {
                println!(
                    "Deleted {} order(s), {} payment(s), {} history row(s); restocked {} unit(s)",
                    summary.orders_deleted,
                    summary.payments_deleted,
                    summary.history_deleted,
                    summary.units_restocked
                );
            }
        }
    }
    Ok(())
}

async fn handle_db_command(context: &CliContext, command: DbCommands, json: bool) -> Result<()> {
    match command {
        DbCommands::Migrate => {
            db::run_migrations(&context.db)
                .await
                .context("failed to run migrations")?;
            if json {
                print_json(&serde_json::json!({ "migrated": true }))?;
            } else {
                println!("Migrations applied");
            }
        }
        DbCommands::Seed => {
            let summary = maintenance::seed(context.db.clone())
                .await
                .context("failed to seed database")?;
            if json {
                print_json(&summary)?;
            } else {
                println!(
                    "Seeded {} user(s), {} category(ies), {} product(s)",
                    summary.users_created.len(),
                    summary.categories_created.len(),
                    summary.products_created.len()
                );
                for name in &summary.products_created {
                    println!("- {}", name);
                }
            }
        }
    }
    Ok(())
}

async fn handle_users_command(
    context: &CliContext,
    command: UsersCommands,
    json: bool,
) -> Result<()> {
    match command {
        UsersCommands::CreateAdmin(args) => {
            let accounts = AccountService::new(context.db.clone());
            let user = accounts
                .create_admin(&args.username, &args.email, &args.password)
                .await
                .context("failed to create admin")?;
            if json {
                print_json(&user)?;
            } else {
                println!("Admin {} created (id {})", user.username, user.id);
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn reset_parses_confirm_flag() {
        let cli = Cli::try_parse_from(["storefront-cli", "--json", "orders", "reset", "--confirm"])
            .expect("parses");
        assert!(cli.json);
        match cli.command {
            Commands::Orders(OrdersCommands::Reset(args)) => assert!(args.confirm),
            _ => panic!("expected orders reset"),
        }
    }
}
