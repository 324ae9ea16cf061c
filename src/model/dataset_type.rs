//! Dataset type schemas.

use serde::{Deserialize, Serialize};

/// Schema shared by many dataset references: the required dimension set and
/// the storage format of the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetType {
    /// Dataset type name (e.g. "raw", "deepCoadd_calexp").
    pub name: String,
    /// Required dimension names; every reference's data coordinate must
    /// assign all of them.
    pub dimensions: Vec<String>,
    /// Storage class describing the payload format.
    pub storage_class: String,
}

impl DatasetType {
    /// New dataset type.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        dimensions: impl IntoIterator<Item = impl Into<String>>,
        storage_class: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dimensions: dimensions.into_iter().map(Into::into).collect(),
            storage_class: storage_class.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip() {
        let dt = DatasetType::new("raw", ["instrument", "detector", "exposure"], "Exposure");
        let json = serde_json::to_string(&dt).unwrap();
        let back: DatasetType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dt);
    }
}
