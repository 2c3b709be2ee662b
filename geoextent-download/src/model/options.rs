use geoextent_core::ops::dates::DEFAULT_SAMPLE_SEED;

/// subset-selection strategy under a size budget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectionMethod {
    /// take descriptors in the given order until the budget is exhausted
    #[default]
    Ordered,
    /// smallest files first
    Smallest,
    /// seeded shuffle, then take in shuffled order
    Random,
}

impl std::str::FromStr for SelectionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ordered" => Ok(SelectionMethod::Ordered),
            "smallest" => Ok(SelectionMethod::Smallest),
            "random" => Ok(SelectionMethod::Random),
            other => Err(format!(
                "unknown download method '{}', expected ordered|smallest|random",
                other
            )),
        }
    }
}

/// download engine configuration. everything flows through this struct;
/// the engine holds no other state.
#[derive(Clone, Debug)]
pub struct DownloadOptions {
    /// total byte budget for the selected subset; None takes all files
    pub max_size_bytes: Option<u64>,
    pub method: SelectionMethod,
    pub method_seed: u64,
    /// prefer geospatial-extension files; non-geo files are dropped entirely
    pub skip_nogeo: bool,
    /// extensions to treat as geospatial in addition to the built-in set
    pub skip_nogeo_exts: Vec<String>,
    /// worker bound; 1 forces sequential downloads
    pub max_workers: usize,
    pub show_progress: bool,
    /// honor rate-limit headers on every response, not only on 429
    pub throttle: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        DownloadOptions {
            max_size_bytes: None,
            method: SelectionMethod::Ordered,
            method_seed: DEFAULT_SAMPLE_SEED,
            skip_nogeo: false,
            skip_nogeo_exts: vec![],
            max_workers: 4,
            show_progress: true,
            throttle: false,
        }
    }
}
