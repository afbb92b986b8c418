pub mod bank;
pub mod bills;
pub mod cron;
pub mod invoices;
pub mod orders;
