mod client;
mod commands;
mod output;

use clap::{Parser, Subcommand};
use client::FortysevenClient;
use fortyseven::config;
use output::{OutputConfig, OutputFormat};
use std::process;

/// Back office CLI for the 47 Industries server
#[derive(Parser, Debug)]
#[clap(name = "fortyseven-cli", about = "Back office CLI for 47 Industries")]
struct Cli {
    /// Server URL to connect to
    #[clap(long, env = "FORTYSEVEN_URL", global = true)]
    server_url: Option<String>,

    /// Admin bearer token
    #[clap(long, env = "ADMIN_API_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Cron bearer secret, needed for `cron` commands
    #[clap(long, env = "CRON_SECRET", hide_env_values = true, global = true)]
    cron_secret: Option<String>,

    /// Output format
    #[clap(long, value_enum, default_value_t = OutputFormat::Human, global = true)]
    format: OutputFormat,

    /// Quiet mode: minimal output (just IDs or counts)
    #[clap(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Storefront orders
    #[command(subcommand)]
    Orders(commands::orders::OrderCommands),
    /// Client invoices
    #[command(subcommand)]
    Invoices(commands::invoices::InvoiceCommands),
    /// Recurring bills and mailbox proposals
    #[command(subcommand)]
    Bills(commands::bills::BillCommands),
    /// Bank feeds
    #[command(subcommand)]
    Bank(commands::bank::BankCommands),
    /// Scheduled jobs
    #[command(subcommand)]
    Cron(commands::cron::CronCommands),
    /// Monthly numbers
    Dashboard {
        /// Month as YYYY-MM, defaults to the current month
        #[clap(long)]
        month: Option<String>,
    },
}

/// Resolves the server URL from CLI args, config file, or defaults
///
/// Precedence: CLI flag / env var > `site_url` in the config file > localhost
fn resolve_server_url(cli_url: Option<String>) -> String {
    if let Some(url) = cli_url {
        return url;
    }

    if let Some(dir) = config::get_config_dir_path() {
        if let Ok(update) = config::config_from_file(Some(dir.join("config.toml"))) {
            if let Some(url) = update.site_url {
                return url;
            }
        }
    }

    "http://localhost:3000".to_string()
}

/// Formats an error for human-readable stderr output
fn format_error(err: &dyn std::error::Error) -> String {
    let err_string = err.to_string();

    if err_string.contains("error sending request")
        || err_string.contains("connection refused")
        || err_string.contains("Connection refused")
        || err_string.contains("tcp connect error")
    {
        return format!("Could not connect to server. Is fortyseven running?\n  {}", err_string);
    }

    err_string
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let server_url = resolve_server_url(cli.server_url);
    let client = FortysevenClient::new(server_url, cli.token, cli.cron_secret);
    let output_config = OutputConfig {
        format: cli.format,
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Commands::Orders(cmd) => commands::orders::execute(&client, cmd, &output_config).await,
        Commands::Invoices(cmd) => commands::invoices::execute(&client, cmd, &output_config).await,
        Commands::Bills(cmd) => commands::bills::execute(&client, cmd, &output_config).await,
        Commands::Bank(cmd) => commands::bank::execute(&client, cmd, &output_config).await,
        Commands::Cron(cmd) => commands::cron::execute(&client, cmd, &output_config).await,
        Commands::Dashboard { month } => match client.dashboard(month.as_deref()).await {
            Ok(stats) => {
                output::print_dashboard(&stats, &output_config);
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", format_error(e.as_ref()));
        process::exit(1);
    }
}
