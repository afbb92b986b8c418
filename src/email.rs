//! Outgoing email templates
//!
//! Every template is a plain function producing an [`Email`]. Delivery goes
//! through [`deliver`], which never fails the caller: a missing or failing
//! mailer is logged and the business operation carries on.

use tracing::{info, warn};

use crate::integrations::{Email, Integrations};
use crate::models::{Contract, Invoice, Order, OrderItem, ServiceInquiry};
use crate::money::format_cents;

/// Escapes text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn layout(heading: &str, body: &str) -> String {
    format!(
        "<div style=\"font-family:Helvetica,Arial,sans-serif;max-width:600px;margin:0 auto\">\
         <h2 style=\"color:#111\">{}</h2>{}\
         <p style=\"color:#888;font-size:12px\">47 Industries</p></div>",
        escape_html(heading),
        body
    )
}

fn button(url: &str, label: &str) -> String {
    format!(
        "<p><a href=\"{}\" style=\"background:#111;color:#fff;padding:10px 18px;text-decoration:none;border-radius:4px\">{}</a></p>",
        escape_html(url),
        escape_html(label)
    )
}

pub fn order_confirmation(order: &Order, items: &[OrderItem]) -> Email {
    let rows: String = items
        .iter()
        .map(|item| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&item.product_name),
                item.quantity,
                format_cents(item.line_total_cents())
            )
        })
        .collect();
    let body = format!(
        "<p>Thanks {}, we received your order <strong>{}</strong>.</p>\
         <table>{}</table>\
         <p>Subtotal {}<br>Shipping {}<br>Tax {}<br><strong>Total {}</strong></p>",
        escape_html(&order.get_customer_name()),
        escape_html(&order.get_order_number()),
        rows,
        format_cents(order.get_subtotal_cents()),
        format_cents(order.get_shipping_cents()),
        format_cents(order.get_tax_cents()),
        format_cents(order.get_total_cents()),
    );
    Email {
        to: order.get_customer_email(),
        subject: format!("Order {} confirmed", order.get_order_number()),
        html: layout("Order confirmed", &body),
    }
}

pub fn shipping_notification(order: &Order) -> Email {
    let tracking = order.get_tracking_number().unwrap_or_default();
    let carrier = order.get_carrier().unwrap_or_default();
    let body = format!(
        "<p>Your order <strong>{}</strong> is on its way.</p><p>Carrier: {}<br>Tracking number: {}</p>",
        escape_html(&order.get_order_number()),
        escape_html(&carrier),
        escape_html(&tracking),
    );
    Email {
        to: order.get_customer_email(),
        subject: format!("Order {} has shipped", order.get_order_number()),
        html: layout("Your order shipped", &body),
    }
}

pub fn invoice(invoice: &Invoice, pay_url: &str) -> Email {
    let body = format!(
        "<p>Hi {},</p><p>Invoice <strong>{}</strong> for <strong>{}</strong> is due {}.</p>{}",
        escape_html(&invoice.get_customer_name()),
        escape_html(&invoice.get_invoice_number()),
        format_cents(invoice.get_total_cents()),
        invoice.get_due_date().format("%B %-d, %Y"),
        button(pay_url, "View and pay"),
    );
    Email {
        to: invoice.get_customer_email(),
        subject: format!("Invoice {} from 47 Industries", invoice.get_invoice_number()),
        html: layout("New invoice", &body),
    }
}

pub fn payment_receipt(invoice: &Invoice) -> Email {
    let body = format!(
        "<p>Hi {},</p><p>We received your payment of <strong>{}</strong> for invoice {}. Thank you!</p>",
        escape_html(&invoice.get_customer_name()),
        format_cents(invoice.get_total_cents()),
        escape_html(&invoice.get_invoice_number()),
    );
    Email {
        to: invoice.get_customer_email(),
        subject: format!("Receipt for invoice {}", invoice.get_invoice_number()),
        html: layout("Payment received", &body),
    }
}

pub fn contract_signing_request(contract: &Contract, sign_url: &str) -> Email {
    let greeting = contract.get_signer_name().unwrap_or_else(|| "there".to_string());
    let body = format!(
        "<p>Hi {},</p><p>Please review and sign <strong>{}</strong>.</p>{}",
        escape_html(&greeting),
        escape_html(&contract.get_title()),
        button(sign_url, "Review and sign"),
    );
    Email {
        to: contract.get_signer_email(),
        subject: format!("Signature requested: {}", contract.get_title()),
        html: layout("Signature requested", &body),
    }
}

pub fn contract_signed(contract: &Contract, admin_email: &str) -> Email {
    let signer = contract.get_signer_name().unwrap_or_else(|| contract.get_signer_email());
    let body = format!(
        "<p><strong>{}</strong> signed <strong>{}</strong>.</p>",
        escape_html(&signer),
        escape_html(&contract.get_title()),
    );
    Email {
        to: admin_email.to_string(),
        subject: format!("Contract signed: {}", contract.get_title()),
        html: layout("Contract signed", &body),
    }
}

pub fn new_lead(inquiry: &ServiceInquiry, admin_email: &str) -> Email {
    let optional = |label: &str, value: &Option<String>| {
        value
            .as_deref()
            .map(|v| format!("{}: {}<br>", label, escape_html(v)))
            .unwrap_or_default()
    };
    let body = format!(
        "<p>{} &lt;{}&gt; via {}</p><p>{}{}{}{}</p><blockquote>{}</blockquote>",
        escape_html(&inquiry.name),
        escape_html(&inquiry.email),
        escape_html(&inquiry.source),
        optional("Phone", &inquiry.phone),
        optional("Company", &inquiry.company),
        optional("Service", &inquiry.service_type),
        optional("Budget", &inquiry.budget),
        escape_html(&inquiry.message),
    );
    Email {
        to: admin_email.to_string(),
        subject: format!("New inquiry from {}", inquiry.name),
        html: layout("New inquiry", &body),
    }
}

/// Sends an email, logging instead of failing when delivery is not possible
///
/// Returns whether the message was handed to the mailer.
pub async fn deliver(integrations: &Integrations, email: Email) -> bool {
    let mailer = match integrations.mailer() {
        Ok(mailer) => mailer,
        Err(e) => {
            warn!("Skipping email \"{}\" to {}: {}", email.subject, email.to, e);
            return false;
        }
    };
    match mailer.send(&email).await {
        Ok(()) => {
            info!("Sent email \"{}\" to {}", email.subject, email.to);
            true
        }
        Err(e) => {
            warn!("Failed to send email \"{}\" to {}: {}", email.subject, email.to, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Address, OrderTotals};
    use chrono::NaiveDate;

    fn order() -> Order {
        let address = Address {
            name: "Sam <Rider>".to_string(),
            company: None,
            street1: "1 Main St".to_string(),
            street2: None,
            city: "Tampa".to_string(),
            state: "FL".to_string(),
            zip: "33602".to_string(),
            country: "US".to_string(),
            phone: None,
            email: None,
        };
        Order::new(
            "sam@example.com".to_string(),
            "Sam <Rider>".to_string(),
            &address,
            OrderTotals { subtotal_cents: 5000, shipping_cents: 750, tax_cents: 350 },
        )
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>\"A&B\"</b>"), "&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt;");
    }

    #[test]
    fn test_order_confirmation_lists_items_and_total() {
        let order = order();
        let items = vec![OrderItem::new(&order.get_id(), "p1", "Carbon Tee".to_string(), 2500, 2)];

        let email = order_confirmation(&order, &items);

        assert_eq!(email.to, "sam@example.com");
        assert!(email.subject.contains(&order.get_order_number()));
        assert!(email.html.contains("Carbon Tee"));
        assert!(email.html.contains("$61.00"));
        assert!(email.html.contains("Sam &lt;Rider&gt;"));
        assert!(!email.html.contains("Sam <Rider>"));
    }

    #[test]
    fn test_invoice_email_has_pay_link() {
        let issue = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let due = NaiveDate::from_ymd_opt(2026, 3, 16).unwrap();
        let invoice = Invoice::new(
            "INV-2026-0007".to_string(),
            "Acme".to_string(),
            "ap@acme.test".to_string(),
            issue,
            due,
            0,
            crate::models::compute_invoice_totals(&[(1, 12000)], 0),
        );

        let email = super::invoice(&invoice, "https://47industries.com/invoice/tok");

        assert_eq!(email.to, "ap@acme.test");
        assert!(email.html.contains("https://47industries.com/invoice/tok"));
        assert!(email.html.contains("$120.00"));
        assert!(email.html.contains("March 16, 2026"));
    }

    #[tokio::test]
    async fn test_deliver_without_mailer_is_logged_not_fatal() {
        let sent = deliver(&Integrations::default(), shipping_notification(&order())).await;
        assert!(!sent);
    }
}
