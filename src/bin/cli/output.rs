use clap::ValueEnum;
use fortyseven::models::{BillInstance, Invoice, Order, ProposedBill};
use fortyseven::money::format_cents;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
    /// Waybar-compatible JSON output
    Waybar,
}

/// Bundled output configuration passed to all print functions
#[derive(Debug, Clone, Copy)]
pub struct OutputConfig {
    /// The output format
    pub format: OutputFormat,
    /// When true, print minimal output (just IDs or counts)
    pub quiet: bool,
}

fn print_json<T: Serialize + ?Sized>(value: &T, pretty: bool) {
    let text = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
    match text {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Could not encode output: {}", e),
    }
}

/// Prints a table of rows, or the first column only in quiet mode
fn print_table(headers: &[&str], rows: &[Vec<String>], empty: &str, config: &OutputConfig) {
    if rows.is_empty() {
        if !config.quiet {
            println!("{}", empty);
        }
        return;
    }
    if config.quiet {
        for row in rows {
            println!("{}", row[0]);
        }
        return;
    }
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| rows.iter().map(|r| r[i].len()).max().unwrap_or(0).max(h.len()))
        .collect();
    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    println!("{}", line(headers.to_vec()));
    for row in rows {
        println!("{}", line(row.iter().map(String::as_str).collect()));
    }
}

fn print_list<T: Serialize>(values: &[T], headers: &[&str], rows: Vec<Vec<String>>, empty: &str, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => print_table(headers, &rows, empty, config),
        OutputFormat::Json => print_json(values, true),
        OutputFormat::Waybar => print_json(values, false),
    }
}

/// Prints a list of orders in the specified format
pub fn print_orders(orders: &[Order], config: &OutputConfig) {
    let rows = orders
        .iter()
        .map(|o| {
            vec![
                o.get_id(),
                o.get_order_number(),
                o.get_status().to_string(),
                format_cents(o.get_total_cents()),
                o.get_customer_email(),
                o.get_created_at().format("%Y-%m-%d").to_string(),
            ]
        })
        .collect();
    print_list(orders, &["ID", "NUMBER", "STATUS", "TOTAL", "EMAIL", "CREATED"], rows, "No orders found.", config);
}

/// Prints a single order in the specified format
pub fn print_order(order: &Order, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if config.quiet {
                println!("{}", order.get_id());
                return;
            }
            println!("ID:       {}", order.get_id());
            println!("Number:   {}", order.get_order_number());
            println!("Status:   {}", order.get_status());
            println!("Customer: {} <{}>", order.get_customer_name(), order.get_customer_email());
            println!("Subtotal: {}", format_cents(order.get_subtotal_cents()));
            println!("Shipping: {}", format_cents(order.get_shipping_cents()));
            println!("Tax:      {}", format_cents(order.get_tax_cents()));
            println!("Total:    {}", format_cents(order.get_total_cents()));
            if let Some(tracking) = order.get_tracking_number() {
                println!("Tracking: {} {}", order.get_carrier().unwrap_or_default(), tracking);
            }
            println!("Created:  {}", order.get_created_at());
        }
        OutputFormat::Json => print_json(order, true),
        OutputFormat::Waybar => print_json(order, false),
    }
}

pub fn print_invoices(invoices: &[Invoice], config: &OutputConfig) {
    let rows = invoices
        .iter()
        .map(|i| {
            vec![
                i.get_id(),
                i.get_invoice_number(),
                i.get_status().to_string(),
                format_cents(i.get_total_cents()),
                i.get_due_date().to_string(),
                i.get_customer_name(),
            ]
        })
        .collect();
    print_list(invoices, &["ID", "NUMBER", "STATUS", "TOTAL", "DUE", "CUSTOMER"], rows, "No invoices found.", config);
}

pub fn print_invoice(invoice: &Invoice, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if config.quiet {
                println!("{}", invoice.get_id());
                return;
            }
            println!("ID:       {}", invoice.get_id());
            println!("Number:   {}", invoice.get_invoice_number());
            println!("Status:   {}", invoice.get_status());
            println!("Customer: {} <{}>", invoice.get_customer_name(), invoice.get_customer_email());
            println!("Total:    {}", format_cents(invoice.get_total_cents()));
            println!("Due:      {}", invoice.get_due_date());
            if let Some(paid_at) = invoice.get_paid_at() {
                println!("Paid:     {}", paid_at);
            }
        }
        OutputFormat::Json => print_json(invoice, true),
        OutputFormat::Waybar => print_json(invoice, false),
    }
}

pub fn print_bill_instances(instances: &[BillInstance], config: &OutputConfig) {
    let rows = instances
        .iter()
        .map(|b| {
            vec![
                b.id.clone(),
                b.recurring_bill_id.clone(),
                b.status.to_string(),
                format_cents(b.amount_cents),
                b.due_date.to_string(),
            ]
        })
        .collect();
    print_list(instances, &["ID", "BILL", "STATUS", "AMOUNT", "DUE"], rows, "No bills found.", config);
}

pub fn print_proposed_bills(proposals: &[ProposedBill], config: &OutputConfig) {
    let rows = proposals
        .iter()
        .map(|p| {
            vec![
                p.id.clone(),
                p.vendor.clone(),
                p.amount_cents.map(format_cents).unwrap_or_else(|| "-".to_string()),
                p.due_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
                p.subject.clone(),
            ]
        })
        .collect();
    print_list(proposals, &["ID", "VENDOR", "AMOUNT", "DUE", "SUBJECT"], rows, "No proposed bills.", config);
}

/// Prints a server summary object such as a job result
///
/// Scalar fields print as `key: value`; nested lists print their length.
pub fn print_summary(summary: &serde_json::Value, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if config.quiet {
                return;
            }
            let Some(fields) = summary.as_object() else {
                println!("{}", summary);
                return;
            };
            for (key, value) in fields {
                match value {
                    serde_json::Value::Array(items) => println!("{}: {} entries", key, items.len()),
                    serde_json::Value::String(text) => println!("{}: {}", key, text),
                    other => println!("{}: {}", key, other),
                }
            }
        }
        OutputFormat::Json => print_json(summary, true),
        OutputFormat::Waybar => print_json(summary, false),
    }
}

/// Prints dashboard numbers, with a one-line revenue label for Waybar
pub fn print_dashboard(stats: &serde_json::Value, config: &OutputConfig) {
    match config.format {
        OutputFormat::Waybar => {
            let cents = |key: &str| stats.get(key).and_then(|v| v.as_i64()).unwrap_or(0);
            let waybar = serde_json::json!({
                "text": format_cents(cents("revenue_cents")),
                "tooltip": format!(
                    "Revenue {}\nExpenses {}\nOutstanding {}",
                    format_cents(cents("revenue_cents")),
                    format_cents(cents("expenses_cents")),
                    format_cents(cents("outstanding_invoice_cents")),
                ),
                "class": if cents("failed_print_orders") > 0 { "warning" } else { "ok" },
            });
            print_json(&waybar, false);
        }
        _ => print_summary(stats, config),
    }
}

/// Prints a simple success message (for operations that don't return data)
pub fn print_success(message: &str, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if !config.quiet {
                println!("{}", message);
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({"status": "ok", "message": message}), true),
        OutputFormat::Waybar => print_json(&serde_json::json!({"status": "ok", "message": message}), false),
    }
}
