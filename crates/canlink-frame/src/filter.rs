use crate::error::{FrameError, Result};
use crate::frame::{EXTENDED_ID_MAX, STANDARD_ID_MAX};

/// A kernel-side acceptance rule.
///
/// A frame passes when `frame.id & mask == id & mask`. Filters are
/// evaluated by the native layer, never in software; this crate only
/// checks the ranges before installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanFilter {
    pub id: u32,
    pub mask: u32,
    /// Whether the rule targets extended addressing. Only widens the
    /// accepted id range; the kernel match itself is mask-based.
    pub extended: bool,
}

impl CanFilter {
    /// Build a filter, deriving `extended` from the id range.
    pub fn new(id: u32, mask: u32) -> Self {
        Self {
            id,
            mask,
            extended: id > STANDARD_ID_MAX,
        }
    }

    /// Matches every frame on the bus. Installing an empty filter
    /// list resolves to this.
    pub const fn accept_all() -> Self {
        Self {
            id: 0,
            mask: 0,
            extended: false,
        }
    }

    /// Range-check id and mask against the addressing mode.
    pub fn validate(&self) -> Result<()> {
        let id_max = if self.extended {
            EXTENDED_ID_MAX
        } else {
            STANDARD_ID_MAX
        };
        if self.id > id_max {
            return Err(FrameError::InvalidFilter {
                field: "id",
                value: self.id,
                max: id_max,
            });
        }
        if self.mask > EXTENDED_ID_MAX {
            return Err(FrameError::InvalidFilter {
                field: "mask",
                value: self.mask,
                max: EXTENDED_ID_MAX,
            });
        }
        Ok(())
    }

    /// Software evaluation of the rule, for simulated buses.
    pub fn matches(&self, id: u32) -> bool {
        id & self.mask == self.id & self.mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_derives_extended() {
        assert!(!CanFilter::new(0x7FF, 0x7FF).extended);
        assert!(CanFilter::new(0x800, 0x7FF).extended);
    }

    #[test]
    fn validate_checks_ranges() {
        assert!(CanFilter::new(0x123, 0x7FF).validate().is_ok());
        assert!(CanFilter::new(0x1FFF_FFFF, 0x1FFF_FFFF).validate().is_ok());

        let filter = CanFilter {
            id: 0x800,
            mask: 0x7FF,
            extended: false,
        };
        assert!(matches!(
            filter.validate().unwrap_err(),
            FrameError::InvalidFilter { field: "id", .. }
        ));

        let filter = CanFilter {
            id: 0x100,
            mask: 0x2000_0000,
            extended: false,
        };
        assert!(matches!(
            filter.validate().unwrap_err(),
            FrameError::InvalidFilter { field: "mask", .. }
        ));
    }

    #[test]
    fn accept_all_matches_everything() {
        let filter = CanFilter::accept_all();
        for id in [0u32, 0x7FF, 0x800, 0x1FFF_FFFF] {
            assert!(filter.matches(id));
        }
    }

    #[test]
    fn masked_match() {
        let filter = CanFilter::new(0x120, 0x7F0);
        assert!(filter.matches(0x123));
        assert!(filter.matches(0x12F));
        assert!(!filter.matches(0x130));
    }
}
