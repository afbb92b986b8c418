use clap::Subcommand;

use crate::client::FortysevenClient;
use crate::output::{self, OutputConfig};

/// Bank feed commands
#[derive(Subcommand, Debug)]
pub enum BankCommands {
    /// Pull new transactions and match them against pending bills
    Sync,
}

pub async fn execute(
    client: &FortysevenClient,
    cmd: BankCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        BankCommands::Sync => {
            let summary = client.bank_sync().await?;
            output::print_summary(&summary, config);
        }
    }
    Ok(())
}
