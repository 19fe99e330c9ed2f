//! Store configuration
//!
//! The defaults describe a store of 32 pages of 4 KiB that may grow
//! until the allocator says no. Any field may be omitted from JSON.

use serde::Deserialize;

use crate::error::StoreError;

/// Environment variable holding a JSON [`StoreConfig`]
pub const CONFIG_ENV: &str = "MEMDEV_CONFIG";

pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const DEFAULT_INITIAL_ORDER: u8 = 5;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Allocation granularity in bytes, a power of two
    pub page_size: usize,
    /// log2 of the initial page count
    pub initial_order: u8,
    /// Upper bound for capacity; growth past it fails like an allocation failure
    pub max_capacity: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            initial_order: DEFAULT_INITIAL_ORDER,
            max_capacity: None,
        }
    }
}

impl StoreConfig {
    /// Parse a configuration from JSON bytes and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the values are inconsistent.
    pub fn from_json(json: &[u8]) -> Result<Self, StoreError> {
        let config: Self = serde_json::from_slice(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a reader, see [`StoreConfig::from_json`].
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, malformed JSON, or inconsistent values.
    pub fn from_reader(reader: impl std::io::Read) -> Result<Self, StoreError> {
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Read the configuration from [`CONFIG_ENV`], falling back to defaults
    /// when the variable is not set.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is set but does not hold a valid configuration.
    pub fn from_env() -> Result<Self, StoreError> {
        match std::env::var(CONFIG_ENV) {
            Ok(json) => Self::from_json(json.as_bytes()),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Initial capacity in bytes, `None` if it does not fit in `usize`
    #[must_use]
    pub fn initial_capacity(&self) -> Option<usize> {
        capacity_for(self.page_size, self.initial_order)
    }

    /// Check the invariants the store relies on.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] describing the first violation.
    pub fn validate(&self) -> Result<(), StoreError> {
        if !self.page_size.is_power_of_two() {
            return Err(StoreError::InvalidConfig(format!(
                "page_size {} is not a power of two",
                self.page_size
            )));
        }
        let initial = self.initial_capacity().ok_or_else(|| {
            StoreError::InvalidConfig(format!(
                "initial capacity {} << {} overflows",
                self.page_size, self.initial_order
            ))
        })?;
        if let Some(max) = self.max_capacity {
            if max < initial {
                return Err(StoreError::InvalidConfig(format!(
                    "max_capacity {max} is below the initial capacity {initial}"
                )));
            }
        }
        Ok(())
    }
}

/// Byte length of `2^order` pages.
///
/// Capacity is tracked as an order and converted here, so the allocated
/// length and the reported capacity share one unit.
#[must_use]
pub fn capacity_for(page_size: usize, order: u8) -> Option<usize> {
    let pages = 1usize.checked_shl(u32::from(order))?;
    let bytes = pages.checked_mul(page_size)?;
    // Allocations are limited to isize::MAX bytes
    isize::try_from(bytes).ok()?;
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.page_size, 4096);
        assert_eq!(config.initial_order, 5);
        assert_eq!(config.initial_capacity(), Some(32 * 4096));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = StoreConfig::from_json(br#"{"initial_order": 0}"#).unwrap();
        assert_eq!(config.page_size, 4096);
        assert_eq!(config.initial_capacity(), Some(4096));
        assert_eq!(config.max_capacity, None);
    }

    #[test]
    fn test_from_reader() {
        let json = br#"{"page_size": 16, "initial_order": 1, "max_capacity": 64}"#;
        let config = StoreConfig::from_reader(&json[..]).unwrap();
        assert_eq!(config.initial_capacity(), Some(32));
        assert_eq!(config.max_capacity, Some(64));
    }

    #[test]
    fn test_rejects_bad_page_size() {
        let err = StoreConfig::from_json(br#"{"page_size": 1000}"#).unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_small_max_capacity() {
        let err =
            StoreConfig::from_json(br#"{"page_size": 16, "initial_order": 2, "max_capacity": 32}"#)
                .unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_unknown_and_malformed() {
        assert!(matches!(
            StoreConfig::from_json(br#"{"pages": 3}"#),
            Err(StoreError::Config(_))
        ));
        assert!(matches!(
            StoreConfig::from_json(b"not json"),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn test_capacity_for_overflow() {
        assert_eq!(capacity_for(4096, 0), Some(4096));
        assert_eq!(capacity_for(4096, 3), Some(4096 * 8));
        assert_eq!(capacity_for(4096, 63), None);
        assert_eq!(capacity_for(4096, 200), None);
    }
}
