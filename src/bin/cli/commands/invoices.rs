use clap::Subcommand;
use fortyseven::models::InvoiceStatus;

use crate::client::FortysevenClient;
use crate::output::{self, OutputConfig};

/// Invoice commands
#[derive(Subcommand, Debug)]
pub enum InvoiceCommands {
    /// List invoices
    List {
        /// Only invoices in this status (repeatable)
        #[clap(long)]
        status: Vec<InvoiceStatus>,
        /// Only invoices for this client
        #[clap(long)]
        client_id: Option<String>,
    },
    /// Email an invoice to its customer
    Send {
        /// The invoice ID
        id: String,
    },
    /// Record a payment received outside Stripe
    MarkPaid {
        /// The invoice ID
        id: String,
    },
}

pub async fn execute(
    client: &FortysevenClient,
    cmd: InvoiceCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        InvoiceCommands::List { status, client_id } => {
            let statuses: Vec<String> = status.iter().map(|s| s.to_string()).collect();
            let invoices = client.list_invoices(&statuses, client_id.as_deref()).await?;
            output::print_invoices(&invoices, config);
        }
        InvoiceCommands::Send { id } => {
            let invoice = client.send_invoice(&id).await?;
            output::print_invoice(&invoice, config);
        }
        InvoiceCommands::MarkPaid { id } => {
            let invoice = client.mark_invoice_paid(&id).await?;
            output::print_invoice(&invoice, config);
        }
    }
    Ok(())
}
