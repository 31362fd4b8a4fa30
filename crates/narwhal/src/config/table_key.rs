//! Identifier for a logical table within a run's configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical name of one table in the table definitions.
///
/// Distinct from the physical table name the catalog knows the table by.
///
/// ```
/// use narwhal::config::TableKey;
///
/// let key = TableKey::new("orders");
/// assert_eq!(key.id(), "orders");
/// ```
#[derive(Debug, Clone, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableKey(String);

impl TableKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TableKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TableKey {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_id() {
        let key = TableKey::new("orders");
        assert_eq!(key.id(), "orders");
        assert_eq!(key.to_string(), "orders");
    }

    #[test]
    fn test_serde_transparent() {
        let key: TableKey = serde_json::from_str(r#""users""#).unwrap();
        assert_eq!(key, TableKey::new("users"));
        assert_eq!(serde_json::to_string(&key).unwrap(), r#""users""#);
    }
}
