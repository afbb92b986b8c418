use super::*;
use tempfile::{tempdir, TempDir};
use std::fs::File;
use std::io::Write;

/// Helper function to create a test configuration file
fn create_test_config_file(dir: &TempDir, content: &str) -> PathBuf {
    let config_path = dir.path().join("config.toml");
    let mut file = File::create(&config_path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    config_path
}

#[test]
fn test_apply_update_with_partial_values() {
    let config = base_config(None);

    let update = ConfigUpdate {
        database_url: Some("updated.db".to_string()),
        sales_tax_bps: Some(700),
        cron_secret: Some("cron".to_string()),
        ..Default::default()
    };

    let updated = config.apply_update(update);

    assert_eq!(updated.database_url, "updated.db");
    assert_eq!(updated.sales_tax_bps, 700);
    assert_eq!(updated.cron_secret.as_deref(), Some("cron"));
    assert_eq!(updated.bind_address, "127.0.0.1:3000"); // Unchanged
    assert!(updated.stripe_secret_key.is_none()); // Unchanged
}

#[test]
fn test_apply_update_keeps_existing_secret() {
    let config = base_config(None).apply_update(ConfigUpdate {
        stripe_secret_key: Some("sk_file".to_string()),
        ..Default::default()
    });

    let updated = config.apply_update(ConfigUpdate::default());

    assert_eq!(updated.stripe_secret_key.as_deref(), Some("sk_file"));
}

#[test]
fn test_base_config_defaults() {
    let config = base_config(None);

    assert_eq!(config.database_url, "fortyseven.db");
    assert_eq!(config.storage_dir, PathBuf::from("storage"));
    assert_eq!(config.sales_tax_bps, 0);
    assert_eq!(config.plaid_env, "production");
    assert!(config.admin_api_token.is_none());
}

#[test]
fn test_base_config_with_path() {
    let temp_dir = tempdir().unwrap();
    let config = base_config(Some(temp_dir.path().to_path_buf()));

    let expected_db_path = temp_dir.path().join("fortyseven.db").to_string_lossy().to_string();
    assert_eq!(config.database_url, expected_db_path);
    assert_eq!(config.storage_dir, temp_dir.path().join("storage"));
}

#[test]
fn test_site_base_trims_slash() {
    let config = base_config(None).apply_update(ConfigUpdate {
        site_url: Some("https://47industries.com/".to_string()),
        ..Default::default()
    });
    assert_eq!(config.site_base(), "https://47industries.com");
}

#[test]
fn test_redacted_summary_hides_secrets() {
    let config = base_config(None).apply_update(ConfigUpdate {
        stripe_secret_key: Some("sk_live_supersecret".to_string()),
        admin_api_token: Some("admin-token-value".to_string()),
        ..Default::default()
    });

    let summary = config.redacted_summary();

    assert!(!summary.contains("sk_live_supersecret"));
    assert!(!summary.contains("admin-token-value"));
    assert!(summary.contains("stripe=set"));
    assert!(summary.contains("shippo=unset"));
}

#[test]
fn test_config_from_args_with_values() {
    let args = CliArgs {
        database_url: Some("args.db".to_string()),
        sales_tax_bps: Some(825),
        debug: true,
        ..Default::default()
    };

    let update = config_from_args(args);

    assert_eq!(update.database_url, Some("args.db".to_string()));
    assert_eq!(update.sales_tax_bps, Some(825));
    assert_eq!(update.bind_address, None);
}

#[test]
fn test_config_from_file_with_no_path() {
    let update = config_from_file(None).unwrap();
    assert_eq!(update.database_url, None);
    assert!(update.ship_from.is_none());
}

#[test]
fn test_config_from_file_with_valid_toml() {
    let temp_dir = tempdir().unwrap();
    let config_content = r#"
        database_url = "file.db"
        sales_tax_bps = 600
        shippo_api_key = "shippo_test_key"

        [ship_from]
        name = "47 Industries"
        street1 = "100 Shop Rd"
        city = "Tampa"
        state = "FL"
        zip = "33602"
    "#;

    let config_path = create_test_config_file(&temp_dir, config_content);

    let result = config_from_file(Some(config_path));

    assert!(result.is_ok(), "Failed to parse config file: {}", result.err().unwrap());
    let update = result.unwrap();
    assert_eq!(update.database_url, Some("file.db".to_string()));
    assert_eq!(update.sales_tax_bps, Some(600));
    assert_eq!(update.shippo_api_key.as_deref(), Some("shippo_test_key"));
    let ship_from = update.ship_from.unwrap();
    assert_eq!(ship_from.city, "Tampa");
    assert_eq!(ship_from.country, "US");
}

#[test]
fn test_config_from_file_with_invalid_toml() {
    let temp_dir = tempdir().unwrap();
    let config_content = r#"
        database_url = "file.db"
        sales_tax_bps = "not a number" # Type error
    "#;

    let config_path = create_test_config_file(&temp_dir, config_content);

    assert!(config_from_file(Some(config_path)).is_err());
}

#[test]
fn test_config_from_file_with_nonexistent_file() {
    let temp_dir = tempdir().unwrap();
    let nonexistent_path = temp_dir.path().join("nonexistent_config.toml");

    let update = config_from_file(Some(nonexistent_path)).unwrap();

    assert_eq!(update.database_url, None);
}

#[test]
fn test_precedence_args_over_file_over_base() {
    let args = CliArgs {
        database_url: Some("args.db".to_string()),
        ..Default::default()
    };

    let file_config = ConfigUpdate {
        database_url: Some("file.db".to_string()),
        sales_tax_bps: Some(500),
        ..Default::default()
    };

    let config = base_config(None)
        .apply_update(file_config)
        .apply_update(config_from_args(args));

    assert_eq!(config.database_url, "args.db"); // From args
    assert_eq!(config.sales_tax_bps, 500); // From file
    assert_eq!(config.bind_address, "127.0.0.1:3000"); // From base
}
