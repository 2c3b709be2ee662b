use std::time::Duration;

use crate::error::{ExtentError, Result};

/// which extents to extract from a single file.
#[derive(Clone, Copy, Debug)]
pub struct ExtractOptions {
    pub bbox: bool,
    pub tbox: bool,
    pub convex_hull: bool,
    /// CSV only: sample this many rows (seeded) when probing time columns
    pub num_sample: Option<usize>,
    /// treat ungeoreferenced rasters with out-of-range coordinates as WGS84
    pub assume_wgs84: bool,
    pub show_progress: bool,
}

impl ExtractOptions {
    /// at least one extraction target must be enabled.
    pub fn validate(&self) -> Result<()> {
        if !self.bbox && !self.tbox {
            Err(ExtentError::Config(String::from(
                "at least one of bbox or tbox extraction must be enabled",
            )))
        } else {
            Ok(())
        }
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            bbox: true,
            tbox: true,
            convex_hull: false,
            num_sample: None,
            assume_wgs84: false,
            show_progress: true,
        }
    }
}

/// directory walk configuration on top of per-file extraction.
#[derive(Clone, Debug)]
pub struct WalkOptions {
    pub extract: ExtractOptions,
    /// keep the per-file detail map in the result
    pub details: bool,
    /// wall-clock budget; checked between files, never mid-file
    pub timeout: Option<Duration>,
    /// descend into subdirectories and archives
    pub recursive: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        WalkOptions {
            extract: ExtractOptions::default(),
            details: false,
            timeout: None,
            recursive: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_targets_disabled_is_a_config_error() {
        let opts = ExtractOptions {
            bbox: false,
            tbox: false,
            ..Default::default()
        };
        assert!(matches!(opts.validate(), Err(ExtentError::Config(_))));
        assert!(ExtractOptions::default().validate().is_ok());
    }
}
