use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use directories::ProjectDirs;
use clap::Parser;
use std::fs;
use tracing::{info, warn};

use crate::models::Address;

/// Configuration for the 47 Industries server
///
/// Secrets are optional: an integration whose key is missing is simply not
/// wired up, and the routes that need it report it as unavailable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// URL for the database connection
    pub database_url: String,
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// Public base URL used in emailed links and checkout redirects
    pub site_url: String,
    /// Directory for JSON log files (stdout only when unset)
    pub log_dir: Option<PathBuf>,
    /// Directory where contract PDFs are stored
    pub storage_dir: PathBuf,
    /// Sales tax applied at checkout, in basis points
    pub sales_tax_bps: i32,
    /// Bearer token for `/api/admin` routes
    pub admin_api_token: Option<String>,
    /// Bearer token for `/api/cron` routes
    pub cron_secret: Option<String>,
    /// Shared secret for the inbound lead webhook
    pub lead_webhook_secret: Option<String>,
    /// Shared secret for calls from the MotoRev backend
    pub motorev_webhook_secret: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub shippo_api_key: Option<String>,
    pub easypost_api_key: Option<String>,
    pub printful_api_key: Option<String>,
    pub resend_api_key: Option<String>,
    /// Sender for outgoing mail
    pub email_from: String,
    /// Where admin notifications go
    pub admin_email: Option<String>,
    pub plaid_client_id: Option<String>,
    pub plaid_secret: Option<String>,
    /// Plaid environment: `sandbox` or `production`
    pub plaid_env: String,
    pub gmail_client_id: Option<String>,
    pub gmail_client_secret: Option<String>,
    pub gmail_refresh_token: Option<String>,
    /// Origin address for shipping quotes and labels
    pub ship_from: Option<Address>,
}

/// Update structure for Config with all fields optional
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfigUpdate {
    pub database_url: Option<String>,
    pub bind_address: Option<String>,
    pub site_url: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub storage_dir: Option<PathBuf>,
    pub sales_tax_bps: Option<i32>,
    pub admin_api_token: Option<String>,
    pub cron_secret: Option<String>,
    pub lead_webhook_secret: Option<String>,
    pub motorev_webhook_secret: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub shippo_api_key: Option<String>,
    pub easypost_api_key: Option<String>,
    pub printful_api_key: Option<String>,
    pub resend_api_key: Option<String>,
    pub email_from: Option<String>,
    pub admin_email: Option<String>,
    pub plaid_client_id: Option<String>,
    pub plaid_secret: Option<String>,
    pub plaid_env: Option<String>,
    pub gmail_client_id: Option<String>,
    pub gmail_client_secret: Option<String>,
    pub gmail_refresh_token: Option<String>,
    pub ship_from: Option<Address>,
}

/// Command line arguments for the server
#[derive(Parser, Debug, Default)]
#[clap(name = "fortyseven", about = "47 Industries storefront and back office server")]
pub struct CliArgs {
    /// Path to a TOML config file (defaults to the platform config directory)
    #[clap(long, env = "FORTYSEVEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database URL
    #[clap(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Address to bind, e.g. 0.0.0.0:3000
    #[clap(long, env = "BIND_ADDRESS")]
    pub bind_address: Option<String>,

    /// Public site URL
    #[clap(long, env = "SITE_URL")]
    pub site_url: Option<String>,

    /// Directory for JSON log files
    #[clap(long, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Directory for stored documents
    #[clap(long, env = "STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Sales tax in basis points
    #[clap(long, env = "SALES_TAX_BPS")]
    pub sales_tax_bps: Option<i32>,

    #[clap(long, env = "ADMIN_API_TOKEN", hide_env_values = true)]
    pub admin_api_token: Option<String>,

    #[clap(long, env = "CRON_SECRET", hide_env_values = true)]
    pub cron_secret: Option<String>,

    #[clap(long, env = "LEAD_WEBHOOK_SECRET", hide_env_values = true)]
    pub lead_webhook_secret: Option<String>,

    #[clap(long, env = "MOTOREV_WEBHOOK_SECRET", hide_env_values = true)]
    pub motorev_webhook_secret: Option<String>,

    #[clap(long, env = "STRIPE_SECRET_KEY", hide_env_values = true)]
    pub stripe_secret_key: Option<String>,

    #[clap(long, env = "STRIPE_WEBHOOK_SECRET", hide_env_values = true)]
    pub stripe_webhook_secret: Option<String>,

    #[clap(long, env = "SHIPPO_API_KEY", hide_env_values = true)]
    pub shippo_api_key: Option<String>,

    #[clap(long, env = "EASYPOST_API_KEY", hide_env_values = true)]
    pub easypost_api_key: Option<String>,

    #[clap(long, env = "PRINTFUL_API_KEY", hide_env_values = true)]
    pub printful_api_key: Option<String>,

    #[clap(long, env = "RESEND_API_KEY", hide_env_values = true)]
    pub resend_api_key: Option<String>,

    /// Sender address for outgoing mail
    #[clap(long, env = "EMAIL_FROM")]
    pub email_from: Option<String>,

    /// Recipient for admin notifications
    #[clap(long, env = "ADMIN_EMAIL")]
    pub admin_email: Option<String>,

    #[clap(long, env = "PLAID_CLIENT_ID", hide_env_values = true)]
    pub plaid_client_id: Option<String>,

    #[clap(long, env = "PLAID_SECRET", hide_env_values = true)]
    pub plaid_secret: Option<String>,

    #[clap(long, env = "PLAID_ENV")]
    pub plaid_env: Option<String>,

    #[clap(long, env = "GMAIL_CLIENT_ID", hide_env_values = true)]
    pub gmail_client_id: Option<String>,

    #[clap(long, env = "GMAIL_CLIENT_SECRET", hide_env_values = true)]
    pub gmail_client_secret: Option<String>,

    #[clap(long, env = "GMAIL_REFRESH_TOKEN", hide_env_values = true)]
    pub gmail_refresh_token: Option<String>,

    /// Debug mode
    #[clap(long, env = "FORTYSEVEN_DEBUG", default_value_t = false)]
    pub debug: bool,
}

impl Config {
    /// Applies a config update to the current configuration
    pub fn apply_update(self, update: ConfigUpdate) -> Self {
        Self {
            database_url: update.database_url.unwrap_or(self.database_url),
            bind_address: update.bind_address.unwrap_or(self.bind_address),
            site_url: update.site_url.unwrap_or(self.site_url),
            log_dir: update.log_dir.or(self.log_dir),
            storage_dir: update.storage_dir.unwrap_or(self.storage_dir),
            sales_tax_bps: update.sales_tax_bps.unwrap_or(self.sales_tax_bps),
            admin_api_token: update.admin_api_token.or(self.admin_api_token),
            cron_secret: update.cron_secret.or(self.cron_secret),
            lead_webhook_secret: update.lead_webhook_secret.or(self.lead_webhook_secret),
            motorev_webhook_secret: update.motorev_webhook_secret.or(self.motorev_webhook_secret),
            stripe_secret_key: update.stripe_secret_key.or(self.stripe_secret_key),
            stripe_webhook_secret: update.stripe_webhook_secret.or(self.stripe_webhook_secret),
            shippo_api_key: update.shippo_api_key.or(self.shippo_api_key),
            easypost_api_key: update.easypost_api_key.or(self.easypost_api_key),
            printful_api_key: update.printful_api_key.or(self.printful_api_key),
            resend_api_key: update.resend_api_key.or(self.resend_api_key),
            email_from: update.email_from.unwrap_or(self.email_from),
            admin_email: update.admin_email.or(self.admin_email),
            plaid_client_id: update.plaid_client_id.or(self.plaid_client_id),
            plaid_secret: update.plaid_secret.or(self.plaid_secret),
            plaid_env: update.plaid_env.unwrap_or(self.plaid_env),
            gmail_client_id: update.gmail_client_id.or(self.gmail_client_id),
            gmail_client_secret: update.gmail_client_secret.or(self.gmail_client_secret),
            gmail_refresh_token: update.gmail_refresh_token.or(self.gmail_refresh_token),
            ship_from: update.ship_from.or(self.ship_from),
        }
    }

    /// The site URL without a trailing slash
    pub fn site_base(&self) -> &str {
        self.site_url.trim_end_matches('/')
    }

    /// Describes the configuration without revealing any secret
    pub fn redacted_summary(&self) -> String {
        let flag = |value: &Option<String>| if value.as_deref().is_some_and(|v| !v.is_empty()) { "set" } else { "unset" };
        format!(
            "database_url={}, bind_address={}, site_url={}, storage_dir={:?}, sales_tax_bps={}, \
             admin_token={}, cron_secret={}, stripe={}, shippo={}, easypost={}, printful={}, resend={}, plaid={}, gmail={}",
            self.database_url,
            self.bind_address,
            self.site_url,
            self.storage_dir,
            self.sales_tax_bps,
            flag(&self.admin_api_token),
            flag(&self.cron_secret),
            flag(&self.stripe_secret_key),
            flag(&self.shippo_api_key),
            flag(&self.easypost_api_key),
            flag(&self.printful_api_key),
            flag(&self.resend_api_key),
            flag(&self.plaid_secret),
            flag(&self.gmail_refresh_token),
        )
    }
}

/// Returns the base (default) configuration
pub fn base_config(config_path: Option<PathBuf>) -> Config {
    let (database_url, storage_dir) = match config_path {
        Some(path) => (
            path.join("fortyseven.db").to_string_lossy().to_string(),
            path.join("storage"),
        ),
        None => ("fortyseven.db".to_string(), PathBuf::from("storage")),
    };

    Config {
        database_url,
        bind_address: "127.0.0.1:3000".to_string(),
        site_url: "http://localhost:3000".to_string(),
        log_dir: None,
        storage_dir,
        sales_tax_bps: 0,
        admin_api_token: None,
        cron_secret: None,
        lead_webhook_secret: None,
        motorev_webhook_secret: None,
        stripe_secret_key: None,
        stripe_webhook_secret: None,
        shippo_api_key: None,
        easypost_api_key: None,
        printful_api_key: None,
        resend_api_key: None,
        email_from: "47 Industries <noreply@47industries.com>".to_string(),
        admin_email: None,
        plaid_client_id: None,
        plaid_secret: None,
        plaid_env: "production".to_string(),
        gmail_client_id: None,
        gmail_client_secret: None,
        gmail_refresh_token: None,
        ship_from: None,
    }
}

/// Loads configuration from a TOML file
pub fn config_from_file(config_path: Option<PathBuf>) -> Result<ConfigUpdate, String> {
    let Some(config_path) = config_path else {
        return Ok(ConfigUpdate::default());
    };

    if !config_path.exists() {
        info!("Config file not found at {:?}, using defaults", config_path);
        return Ok(ConfigUpdate::default());
    }

    match fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str::<ConfigUpdate>(&content) {
            Ok(config) => {
                info!("Loaded configuration from {:?}", config_path);
                Ok(config)
            },
            Err(e) => {
                warn!("Failed to parse config file: {}", e);
                Err(format!("Failed to parse config file: {}", e))
            }
        },
        Err(e) => {
            warn!("Failed to read config file: {}", e);
            Err(format!("Failed to read config file: {}", e))
        }
    }
}

/// Loads configuration from command line arguments and environment
pub fn config_from_args(args: CliArgs) -> ConfigUpdate {
    ConfigUpdate {
        database_url: args.database_url,
        bind_address: args.bind_address,
        site_url: args.site_url,
        log_dir: args.log_dir,
        storage_dir: args.storage_dir,
        sales_tax_bps: args.sales_tax_bps,
        admin_api_token: args.admin_api_token,
        cron_secret: args.cron_secret,
        lead_webhook_secret: args.lead_webhook_secret,
        motorev_webhook_secret: args.motorev_webhook_secret,
        stripe_secret_key: args.stripe_secret_key,
        stripe_webhook_secret: args.stripe_webhook_secret,
        shippo_api_key: args.shippo_api_key,
        easypost_api_key: args.easypost_api_key,
        printful_api_key: args.printful_api_key,
        resend_api_key: args.resend_api_key,
        email_from: args.email_from,
        admin_email: args.admin_email,
        plaid_client_id: args.plaid_client_id,
        plaid_secret: args.plaid_secret,
        plaid_env: args.plaid_env,
        gmail_client_id: args.gmail_client_id,
        gmail_client_secret: args.gmail_client_secret,
        gmail_refresh_token: args.gmail_refresh_token,
        ship_from: None,
    }
}

/// Returns the platform config directory if it exists
pub fn get_config_dir_path() -> Option<PathBuf> {
    match ProjectDirs::from("com", "47industries", "fortyseven") {
        Some(proj_dirs) => {
            let path = PathBuf::from(proj_dirs.config_dir());
            if path.exists() {
                Some(path)
            } else {
                info!("Config directory not found at {:?}, using defaults", path);
                None
            }
        }
        None => {
            warn!("Could not determine XDG config directory, skipping config file");
            None
        }
    }
}

/// Gets the complete configuration by combining defaults with
/// values from config file, environment variables, and command line arguments
/// in order of increasing precedence
pub fn get_config(args: CliArgs) -> Config {
    let config_dir = get_config_dir_path();

    let config_file = args
        .config
        .clone()
        .or_else(|| config_dir.as_ref().map(|dir| dir.join("config.toml")));

    let base = base_config(config_dir);

    // Apply updates in order of increasing precedence
    let config = base
        .apply_update(config_from_file(config_file).unwrap_or_default())
        .apply_update(config_from_args(args));

    info!("Final configuration: {}", config.redacted_summary());

    config
}

#[cfg(test)]
mod tests;

#[cfg(test)]
mod prop_tests;
