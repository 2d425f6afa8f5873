//! Tab ledger administrative CLI

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tab_ledger::{parse_amount, CompactionKind, Config, Ledger, OperationKind};

#[derive(Parser)]
#[command(name = "tab-ledger")]
#[command(about = "Debts and payments per client, with running balances", long_about = None)]
struct Cli {
    /// TOML config file (defaults to environment variables)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a debt
    Debt { name: String, amount: String },
    /// Record a payment
    Payment { name: String, amount: String },
    /// List every nonzero balance
    Balances {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one client's balance
    Balance { name: String },
    /// List every known client
    Clients,
    /// Show one client's history, newest first
    History { name: String },
    /// Rewrite history (destructive)
    Compact {
        /// partial | total
        kind: CompactionKind,

        /// Required: compaction discards history irreversibly
        #[arg(long)]
        confirm: bool,
    },
    /// Check the balance table against the operation log
    Verify,
    /// Check the administrative credential
    Login { username: String, password: String },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    let ledger = Ledger::open(config).await?;
    let result = run(&ledger, cli.command).await;
    ledger.shutdown().await?;
    result
}

async fn run(ledger: &Ledger, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Debt { name, amount } => {
            ledger
                .append_operation(&name, parse_amount(&amount)?, OperationKind::Debt)
                .await?;
            println!("{}", ledger.get_individual_balance(&name).await?);
        }

        Commands::Payment { name, amount } => {
            ledger
                .append_operation(&name, parse_amount(&amount)?, OperationKind::Payment)
                .await?;
            println!("{}", ledger.get_individual_balance(&name).await?);
        }

        Commands::Balances { json } => {
            let balances = ledger.get_balances().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&balances)?);
            } else if balances.is_empty() {
                println!("No outstanding balances");
            } else {
                for balance in balances {
                    println!("{:<24} ${:.2}", balance.client, balance.amount);
                }
            }
        }

        Commands::Balance { name } => {
            println!("{}", ledger.get_individual_balance(&name).await?);
        }

        Commands::Clients => {
            for client in ledger.list_clients().await? {
                println!("{}", client);
            }
        }

        Commands::History { name } => {
            let history = ledger.get_history(&name).await?;
            if !history.is_known() {
                println!("No operations found for {}", history.client);
                return Ok(());
            }
            for entry in &history.entries {
                println!("  {}", entry);
            }
            println!("Balance: {}", history.balance);
        }

        Commands::Compact { kind, confirm } => {
            if !confirm {
                anyhow::bail!("{} compaction discards history; rerun with --confirm", kind);
            }
            let token = ledger.authorize_compaction(kind).await?;
            let changed = match kind {
                CompactionKind::Partial => ledger.partial_compaction(token).await?,
                CompactionKind::Total => ledger.total_compaction(token).await?,
            };
            println!("{}", if changed { "Compacted" } else { "No client qualified" });
        }

        Commands::Verify => {
            if !ledger.verify_balances().await? {
                anyhow::bail!("Balance table does not match the operation log");
            }
            println!("Balances consistent");
        }

        Commands::Login { username, password } => {
            if !ledger.check_credentials(&username, &password).await? {
                anyhow::bail!("Invalid credentials");
            }
            println!("Credentials accepted");
        }
    }

    Ok(())
}
