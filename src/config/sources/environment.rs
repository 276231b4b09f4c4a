//! Environment variable source: NODESTORE_* prefix with __ separator

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Add environment variable overlay to builder.
/// Uses NODESTORE_ prefix and __ as separator for nested keys,
/// e.g. `NODESTORE__STORAGE__ROLE=name_node`.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let builder = builder.add_source(
        Environment::with_prefix("NODESTORE")
            .separator("__")
            .try_parsing(true),
    );
    Ok(builder)
}
