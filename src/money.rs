//! Integer-cent money arithmetic
//!
//! All amounts are stored as cents and all rates as basis points
//! (1 bps = 0.01%), so no floating point touches a price.

/// Basis points in 100%
pub const BPS_DENOMINATOR: i64 = 10_000;

/// `amount × bps / 10000`, rounded down
///
/// Used for commissions, which never round in the earner's favour.
pub fn apply_bps_floor(amount_cents: i64, bps: i32) -> i64 {
    let product = amount_cents as i128 * bps as i128;
    product.div_euclid(BPS_DENOMINATOR as i128) as i64
}

/// `amount × bps / 10000`, rounded half up
///
/// Used for sales tax.
pub fn apply_bps_rounded(amount_cents: i64, bps: i32) -> i64 {
    let product = amount_cents as i128 * bps as i128;
    (product + (BPS_DENOMINATOR as i128) / 2).div_euclid(BPS_DENOMINATOR as i128) as i64
}

/// Renders cents as a dollar string such as `$1,234.56`
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let dollars = (abs / 100).to_string();
    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, ch) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}${}.{:02}", sign, grouped, abs % 100)
}

/// Parses a dollar amount such as `1,234.5` or `$12.99` into cents
pub fn parse_dollars(text: &str) -> Option<i64> {
    let cleaned: String = text
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let (whole, fraction) = match cleaned.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (cleaned.as_str(), ""),
    };
    if fraction.len() > 2 || !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let fraction: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_bps_floor() {
        assert_eq!(apply_bps_floor(10_000, 1000), 1000);
        assert_eq!(apply_bps_floor(999, 1000), 99);
        assert_eq!(apply_bps_floor(0, 2000), 0);
    }

    #[test]
    fn test_apply_bps_rounded() {
        // 8.25% of $19.99 = 164.9175 cents
        assert_eq!(apply_bps_rounded(1999, 825), 165);
        // exactly half a cent rounds up
        assert_eq!(apply_bps_rounded(50, 100), 1);
        assert_eq!(apply_bps_rounded(49, 100), 0);
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(0), "$0.00");
        assert_eq!(format_cents(5), "$0.05");
        assert_eq!(format_cents(123_456), "$1,234.56");
        assert_eq!(format_cents(100_000_000), "$1,000,000.00");
        assert_eq!(format_cents(-2550), "-$25.50");
    }

    #[test]
    fn test_parse_dollars() {
        assert_eq!(parse_dollars("$1,234.56"), Some(123_456));
        assert_eq!(parse_dollars("12.5"), Some(1250));
        assert_eq!(parse_dollars("40"), Some(4000));
        assert_eq!(parse_dollars(".99"), Some(99));
        assert_eq!(parse_dollars("1.999"), None);
        assert_eq!(parse_dollars("abc"), None);
        assert_eq!(parse_dollars(""), None);
    }
}
