use super::*;
use crate::test_utils::arb_messy_string;
use proptest::prelude::*;

/// Generates an arbitrary Config built from the defaults
fn arb_config() -> impl Strategy<Value = Config> {
    (arb_messy_string(), any::<i32>(), prop::option::of(arb_messy_string())).prop_map(
        |(database_url, sales_tax_bps, stripe_secret_key)| Config {
            database_url,
            sales_tax_bps,
            stripe_secret_key,
            ..base_config(None)
        },
    )
}

/// Generates an arbitrary ConfigUpdate touching a handful of fields
fn arb_config_update() -> impl Strategy<Value = ConfigUpdate> {
    (
        prop::option::of(arb_messy_string()),
        prop::option::of(any::<i32>()),
        prop::option::of(arb_messy_string()),
    )
        .prop_map(|(database_url, sales_tax_bps, stripe_secret_key)| ConfigUpdate {
            database_url,
            sales_tax_bps,
            stripe_secret_key,
            ..Default::default()
        })
}

proptest! {
    /// Applying an empty update changes nothing
    #[test]
    fn prop_apply_update_identity(config in arb_config()) {
        let original = config.clone();

        let updated = config.apply_update(ConfigUpdate::default());

        prop_assert_eq!(updated.database_url, original.database_url);
        prop_assert_eq!(updated.sales_tax_bps, original.sales_tax_bps);
        prop_assert_eq!(updated.stripe_secret_key, original.stripe_secret_key);
    }

    /// The later update's Some fields win over the earlier one's
    #[test]
    fn prop_apply_update_last_write_wins(
        config in arb_config(),
        a in arb_config_update(),
        b in arb_config_update(),
    ) {
        let after_ab = config.clone().apply_update(a.clone()).apply_update(b.clone());

        let expected_url = b.database_url.unwrap_or_else(|| a.database_url.unwrap_or(config.database_url.clone()));
        let expected_tax = b.sales_tax_bps.unwrap_or_else(|| a.sales_tax_bps.unwrap_or(config.sales_tax_bps));
        let expected_key = b.stripe_secret_key.or(a.stripe_secret_key).or(config.stripe_secret_key.clone());

        prop_assert_eq!(after_ab.database_url, expected_url);
        prop_assert_eq!(after_ab.sales_tax_bps, expected_tax);
        prop_assert_eq!(after_ab.stripe_secret_key, expected_key);
    }

    /// Secrets never leak into the logged summary
    #[test]
    fn prop_redacted_summary_never_contains_secret(secret in "[a-zA-Z0-9]{24,40}") {
        let config = base_config(None).apply_update(ConfigUpdate {
            stripe_secret_key: Some(secret.clone()),
            cron_secret: Some(secret.clone()),
            ..Default::default()
        });

        prop_assert!(!config.redacted_summary().contains(&secret));
    }
}
