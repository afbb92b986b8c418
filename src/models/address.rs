use serde::{Deserialize, Serialize};

/// A postal address
///
/// Stored as JSON on orders and sent to the shipping and fulfillment
/// providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    #[serde(default)]
    pub company: Option<String>,
    pub street1: String,
    #[serde(default)]
    pub street2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: String,
    /// ISO 3166-1 alpha-2 country code
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

fn default_country() -> String {
    "US".to_string()
}

impl Address {
    /// Returns the names of required fields that are blank
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        for (name, value) in [
            ("name", &self.name),
            ("street1", &self.street1),
            ("city", &self.city),
            ("state", &self.state),
            ("zip", &self.zip),
            ("country", &self.country),
        ] {
            if value.trim().is_empty() {
                missing.push(name);
            }
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_country_defaults_to_us() {
        let address: Address = serde_json::from_value(json!({
            "name": "Rider One",
            "street1": "1 Main St",
            "city": "Tampa",
            "state": "FL",
            "zip": "33602"
        }))
        .unwrap();
        assert_eq!(address.country, "US");
        assert!(address.missing_fields().is_empty());
    }

    #[test]
    fn test_missing_fields() {
        let address: Address = serde_json::from_value(json!({
            "name": " ",
            "street1": "1 Main St",
            "city": "",
            "state": "FL",
            "zip": "33602"
        }))
        .unwrap();
        assert_eq!(address.missing_fields(), vec!["name", "city"]);
    }
}
