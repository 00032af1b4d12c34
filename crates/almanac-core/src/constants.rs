/// Product identifiers shared across crates
pub const PRODUCT_NAME: &str = "Almanac";
pub const PRODUCT_VENDOR: &str = "Almanac";

/// `PRODID` written into calendar documents produced by the engine.
pub const PRODID: &str = const_str::concat!("-//", PRODUCT_VENDOR, "//", PRODUCT_NAME, " Query Engine//EN");

/// Prefix for environment-variable configuration overrides.
pub const ENV_PREFIX: &str = "ALMANAC";

/// Optional configuration file (extension resolved by `config`) looked up in the working directory.
pub const CONFIG_FILE_STEM: &str = "almanac";
