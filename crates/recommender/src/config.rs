//! Job configuration loading

use anyhow::{Context, Result};
use recommender_lib::RecommenderConfig;
use std::path::Path;

const ENV_PREFIX: &str = "RECOMMENDER";

/// Load configuration from an optional file, then environment overrides
///
/// Environment variables look like `RECOMMENDER_BATCH_SIZE=10`; list values
/// such as `RECOMMENDER_PERCENTILES=50,90` are comma separated. Anything left
/// unset falls back to the library defaults.
pub fn load(path: Option<&Path>) -> Result<RecommenderConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let config = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("percentiles"),
        )
        .build()
        .context("Failed to read recommender configuration")?;

    config
        .try_deserialize()
        .context("Failed to parse recommender configuration")
}
