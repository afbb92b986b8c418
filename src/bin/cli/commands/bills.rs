use chrono::NaiveDate;
use clap::Subcommand;
use fortyseven::models::{BillInstanceStatus, ProposalStatus};

use crate::client::FortysevenClient;
use crate::output::{self, OutputConfig};

/// Recurring bill commands
#[derive(Subcommand, Debug)]
pub enum BillCommands {
    /// List bill instances
    List {
        #[clap(long)]
        status: Option<BillInstanceStatus>,
    },
    /// Mark a bill instance paid
    Pay {
        /// The bill instance ID
        id: String,
        /// Payment date, defaults to today on the server
        #[clap(long)]
        paid_on: Option<NaiveDate>,
    },
    /// Skip a bill instance
    Skip {
        /// The bill instance ID
        id: String,
    },
    /// Scan the mailbox for new bills
    Scan,
    /// List bills proposed by mailbox scans
    Proposals {
        #[clap(long)]
        status: Option<ProposalStatus>,
    },
    /// Turn a proposed bill into a recurring bill
    Approve {
        /// The proposed bill ID
        id: String,
    },
    /// Dismiss a proposed bill
    Reject {
        /// The proposed bill ID
        id: String,
    },
}

pub async fn execute(
    client: &FortysevenClient,
    cmd: BillCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        BillCommands::List { status } => {
            let instances = client.list_bill_instances(status.map(|s| s.as_str())).await?;
            output::print_bill_instances(&instances, config);
        }
        BillCommands::Pay { id, paid_on } => {
            client.pay_bill_instance(&id, paid_on).await?;
            output::print_success(&format!("Paid bill {}", id), config);
        }
        BillCommands::Skip { id } => {
            client.skip_bill_instance(&id).await?;
            output::print_success(&format!("Skipped bill {}", id), config);
        }
        BillCommands::Scan => {
            let summary = client.scan_bills().await?;
            output::print_summary(&summary, config);
        }
        BillCommands::Proposals { status } => {
            let proposals = client.list_proposed_bills(status.map(|s| s.as_str())).await?;
            output::print_proposed_bills(&proposals, config);
        }
        BillCommands::Approve { id } => {
            client.approve_proposed_bill(&id).await?;
            output::print_success(&format!("Approved proposed bill {}", id), config);
        }
        BillCommands::Reject { id } => {
            client.reject_proposed_bill(&id).await?;
            output::print_success(&format!("Rejected proposed bill {}", id), config);
        }
    }
    Ok(())
}
