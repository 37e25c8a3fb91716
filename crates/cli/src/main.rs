use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kontoauszug_core::{InvoiceStatus, Money};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "kontoauszug", about = "Import bank statements into the books.")]
struct Cli {
    /// SQLite database (default: the platform data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// TOML config with profiles and extraction settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a statement and show what would be imported.
    Preview {
        /// CSV, MT940, CAMT.053 or PDF statement
        file: PathBuf,
        /// Bank format profile for CSV files
        #[arg(long)]
        profile: Option<String>,
    },
    /// Parse a statement and commit the selected rows.
    Import {
        file: PathBuf,
        /// Bank account id to book into
        #[arg(long)]
        account: i64,
        #[arg(long)]
        profile: Option<String>,
        /// Flip the selection of a row (1-based, repeatable)
        #[arg(long = "toggle")]
        toggle: Vec<usize>,
        /// Link a row to an open invoice: ROW=INVOICE_ID
        #[arg(long = "link", value_parser = parse_link)]
        link: Vec<(usize, i64)>,
        /// Drop the suggested invoice of a row
        #[arg(long = "unlink")]
        unlink: Vec<usize>,
    },
    /// List known bank format profiles.
    Profiles,
    /// Manage bank accounts.
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },
    /// Manage invoices.
    Invoice {
        #[command(subcommand)]
        command: InvoiceCommands,
    },
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Add a bank account.
    Add {
        name: String,
        #[arg(long)]
        iban: Option<String>,
    },
    /// List bank accounts with their balances.
    List,
}

#[derive(Subcommand)]
enum InvoiceCommands {
    /// Record an invoice so payments can be matched against it.
    Add {
        /// Invoice number, e.g. RE-2024-042
        number: String,
        /// Gross amount, e.g. 1190.00
        amount: Money,
        /// draft, sent or paid
        #[arg(long, default_value = "sent")]
        status: InvoiceStatus,
    },
    /// List open invoices.
    List,
}

fn parse_link(raw: &str) -> Result<(usize, i64), String> {
    let (row, invoice) = raw.split_once('=').ok_or_else(|| format!("expected ROW=INVOICE_ID, got '{raw}'"))?;
    let row = row.trim().parse().map_err(|e| format!("invalid row '{row}': {e}"))?;
    let invoice = invoice.trim().parse().map_err(|e| format!("invalid invoice id '{invoice}': {e}"))?;
    Ok((row, invoice))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let state = commands::AppState::load(cli.db, cli.config).await?;

    match cli.command {
        Commands::Preview { file, profile } => commands::preview(&state, &file, profile.as_deref()).await,
        Commands::Import { file, account, profile, toggle, link, unlink } => {
            let review = commands::ReviewChoices { toggle, link, unlink };
            commands::import(&state, &file, account, profile.as_deref(), &review).await
        }
        Commands::Profiles => {
            commands::profiles(&state);
            Ok(())
        }
        Commands::Account { command } => match command {
            AccountCommands::Add { name, iban } => commands::add_account(&state, &name, iban.as_deref()).await,
            AccountCommands::List => commands::list_accounts(&state).await,
        },
        Commands::Invoice { command } => match command {
            InvoiceCommands::Add { number, amount, status } => {
                commands::add_invoice(&state, &number, amount, status).await
            }
            InvoiceCommands::List => commands::list_invoices(&state).await,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_argument() {
        assert_eq!(parse_link("3=42").unwrap(), (3, 42));
        assert_eq!(parse_link(" 1 = 7 ").unwrap(), (1, 7));
        assert!(parse_link("3").is_err());
        assert!(parse_link("x=1").is_err());
    }

    #[test]
    fn cli_parses_import() {
        let cli = Cli::try_parse_from([
            "kontoauszug", "--db", "/tmp/x.db", "import", "auszug.sta", "--account", "1", "--toggle", "2",
            "--link", "3=42",
        ])
        .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        match cli.command {
            Commands::Import { account, toggle, link, .. } => {
                assert_eq!(account, 1);
                assert_eq!(toggle, vec![2]);
                assert_eq!(link, vec![(3, 42)]);
            }
            _ => panic!("expected import"),
        }
    }

    #[test]
    fn cli_parses_invoice_amount() {
        let cli = Cli::try_parse_from(["kontoauszug", "invoice", "add", "RE-1", "1190.00"]).unwrap();
        match cli.command {
            Commands::Invoice { command: InvoiceCommands::Add { amount, status, .. } } => {
                assert_eq!(amount, Money::from_cents(119_000));
                assert_eq!(status, InvoiceStatus::Sent);
            }
            _ => panic!("expected invoice add"),
        }
    }
}
