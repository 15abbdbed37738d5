//! Transaction options and their TOML form.

use serde::Deserialize;

use crate::types::{Result, TxnError};

/// Bucket count a fresh transaction table starts with.
pub const DEFAULT_INITIAL_BUCKETS: usize = 8;

/// Configuration applied when a transaction is created.
///
/// Can be built in code or loaded from TOML:
///
/// ```toml
/// initial_buckets = 16
/// max_table_buckets = 4096
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TxnOptions {
    /// Number of buckets in a new page table.
    pub initial_buckets: usize,
    /// Upper bound on table growth; growth past it is refused like an
    /// allocation failure.
    pub max_table_buckets: Option<usize>,
}

impl Default for TxnOptions {
    fn default() -> Self {
        Self {
            initial_buckets: DEFAULT_INITIAL_BUCKETS,
            max_table_buckets: None,
        }
    }
}

impl TxnOptions {
    /// Sets the initial bucket count.
    pub fn initial_buckets(mut self, buckets: usize) -> Self {
        self.initial_buckets = buckets;
        self
    }

    /// Caps the table at `buckets` buckets.
    pub fn max_table_buckets(mut self, buckets: usize) -> Self {
        self.max_table_buckets = Some(buckets);
        self
    }

    /// Parses options from a TOML document and validates them.
    pub fn from_toml_str(src: &str) -> Result<Self> {
        let options: TxnOptions = toml::from_str(src)?;
        options.validate()?;
        Ok(options)
    }

    /// Rejects option combinations a table cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.initial_buckets == 0 {
            return Err(TxnError::Invalid("initial_buckets must be non-zero"));
        }
        if let Some(max) = self.max_table_buckets {
            if max < self.initial_buckets {
                return Err(TxnError::Invalid(
                    "max_table_buckets smaller than initial_buckets",
                ));
            }
        }
        Ok(())
    }
}
