use clap::Subcommand;
use fortyseven::models::OrderStatus;

use crate::client::FortysevenClient;
use crate::output::{self, OutputConfig};

/// Storefront order commands
#[derive(Subcommand, Debug)]
pub enum OrderCommands {
    /// List orders, newest first
    List {
        /// Only orders in this status (repeatable)
        #[clap(long)]
        status: Vec<OrderStatus>,
    },
    /// Show one order
    Get {
        /// The order ID
        id: String,
    },
    /// Move an order to a new status
    SetStatus {
        /// The order ID
        id: String,
        /// New status, e.g. SHIPPED
        status: OrderStatus,
    },
}

/// Executes an order command
pub async fn execute(
    client: &FortysevenClient,
    cmd: OrderCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        OrderCommands::List { status } => {
            let statuses: Vec<String> = status.iter().map(|s| s.to_string()).collect();
            let orders = client.list_orders(&statuses).await?;
            output::print_orders(&orders, config);
        }
        OrderCommands::Get { id } => {
            let order = client.get_order(&id).await?;
            output::print_order(&order, config);
        }
        OrderCommands::SetStatus { id, status } => {
            let order = client.update_order_status(&id, status.as_str()).await?;
            output::print_order(&order, config);
        }
    }
    Ok(())
}
