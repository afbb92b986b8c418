use diesel::deserialize::{FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::serialize;
use diesel::serialize::{Output, ToSql, IsNull};
use diesel::sql_types::Text;
use diesel::sqlite::{Sqlite, SqliteValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A JSON document stored in a TEXT column
///
/// Used for product image lists and order shipping addresses, which are
/// always read and written whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(transparent)]
pub struct JsonValue(pub serde_json::Value);

impl JsonValue {
    /// Serializes any value into a stored JSON document
    pub fn from_typed<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        Ok(JsonValue(serde_json::to_value(value)?))
    }

    /// Deserializes the stored document into a typed value
    pub fn to_typed<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.0.clone())
    }

    /// An empty JSON array
    pub fn empty_array() -> Self {
        JsonValue(serde_json::Value::Array(Vec::new()))
    }
}

impl FromSql<Text, Sqlite> for JsonValue {
    fn from_sql(value: SqliteValue<'_, '_, '_>) -> diesel::deserialize::Result<Self> {
        let text = <String as FromSql<Text, Sqlite>>::from_sql(value)?;
        let value = serde_json::from_str(&text)?;
        Ok(JsonValue(value))
    }
}

impl ToSql<Text, Sqlite> for JsonValue {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(serde_json::to_string(&self.0)?);
        Ok(IsNull::No)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_typed_conversion() {
        let value = JsonValue::from_typed(&Point { x: 3, y: 4 }).unwrap();
        assert_eq!(value.0, json!({"x": 3, "y": 4}));
        assert_eq!(value.to_typed::<Point>().unwrap(), Point { x: 3, y: 4 });
    }

    #[test]
    fn test_serializes_transparently() {
        let value = JsonValue(json!(["a.png", "b.png"]));
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"["a.png","b.png"]"#);
    }
}
