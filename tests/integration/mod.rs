//! Integration tests for storage directory startup, recovery and configuration

mod config_loading;
mod startup_recovery;
mod version_record;
