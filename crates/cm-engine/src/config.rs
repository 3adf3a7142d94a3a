use crate::error::{EngineError, Result};

/// Largest product (in elements) computed in one shot on an accelerator.
pub const DEFAULT_ELEMENT_LIMIT: usize = 250_000_000;

/// Column width of one block in blocked mode.
pub const DEFAULT_BLOCK_COLS: usize = 5_000;

/// Column width of the sub-blocks the assembler appends.
pub const DEFAULT_SPLIT_COLS: usize = 500;

/// Tunables of the chunked multiplication engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Products with more elements than this run in blocked mode.
    pub element_limit: usize,
    /// Nominal width of each column block.
    pub block_cols: usize,
    /// Width of the sub-blocks used when appending to the result.
    pub split_cols: usize,
    /// Derive `element_limit` and `block_cols` from the device's reported
    /// memory instead of the fixed values above.
    pub derive_from_device: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            element_limit: DEFAULT_ELEMENT_LIMIT,
            block_cols: DEFAULT_BLOCK_COLS,
            split_cols: DEFAULT_SPLIT_COLS,
            derive_from_device: false,
        }
    }
}

impl EngineConfig {
    /// Reject zero widths and limits, which would never make progress.
    pub fn validate(&self) -> Result<()> {
        if self.element_limit == 0 {
            return Err(EngineError::InvalidConfig(
                "element_limit must be > 0".to_string(),
            ));
        }
        if self.block_cols == 0 {
            return Err(EngineError::InvalidConfig(
                "block_cols must be > 0".to_string(),
            ));
        }
        if self.split_cols == 0 {
            return Err(EngineError::InvalidConfig(
                "split_cols must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = EngineConfig::default();
        assert_eq!(c.element_limit, 250_000_000);
        assert_eq!(c.block_cols, 5_000);
        assert_eq!(c.split_cols, 500);
        assert!(!c.derive_from_device);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        for c in [
            EngineConfig { element_limit: 0, ..Default::default() },
            EngineConfig { block_cols: 0, ..Default::default() },
            EngineConfig { split_cols: 0, ..Default::default() },
        ] {
            assert!(matches!(c.validate(), Err(EngineError::InvalidConfig(_))));
        }
    }
}
