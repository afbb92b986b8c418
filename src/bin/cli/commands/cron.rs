use clap::Subcommand;

use crate::client::FortysevenClient;
use crate::output::{self, OutputConfig};

/// Scheduled jobs, normally run by the platform scheduler
#[derive(Subcommand, Debug)]
pub enum CronCommands {
    /// Create this month's recurring invoices
    Invoices,
    /// Generate upcoming bill instances
    Bills,
}

pub async fn execute(
    client: &FortysevenClient,
    cmd: CronCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        CronCommands::Invoices => {
            let summary = client.run_recurring_invoices().await?;
            output::print_summary(&summary, config);
        }
        CronCommands::Bills => {
            let instances = client.generate_bills().await?;
            output::print_bill_instances(&instances, config);
        }
    }
    Ok(())
}
