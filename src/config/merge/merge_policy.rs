//! Built-in defaults that every configuration starts from.

use crate::types::{
    DEFAULT_LAYOUT_VERSION, LAST_PRE_UPGRADE_LAYOUT_VERSION, LAST_UPGRADABLE_LAYOUT_VERSION,
};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Start a builder seeded with defaults.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("storage.role", "data_node")?
        .set_default("storage.check_lock_support", true)?
        .set_default("storage.layout.current_version", i64::from(DEFAULT_LAYOUT_VERSION))?
        .set_default(
            "storage.layout.last_upgradable_version",
            i64::from(LAST_UPGRADABLE_LAYOUT_VERSION),
        )?
        .set_default(
            "storage.layout.last_pre_upgrade_version",
            i64::from(LAST_PRE_UPGRADE_LAYOUT_VERSION),
        )?
        .set_default("logging.level", "info")
}
