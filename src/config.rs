use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub migration: MigrationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Persist migration status every N processed units.
    pub status_commit_interval: u64,
    /// Upper bound for one custom transform script invocation.
    pub script_timeout_ms: u64,
    /// Apply each unit's index batch right after its transaction commits.
    /// When false, batches are collected and applied once after the run.
    pub synchronous_index_apply: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            migration: MigrationConfig::default(),
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            status_commit_interval: 50,
            script_timeout_ms: 2_000,
            synchronous_index_apply: true,
        }
    }
}

impl MigrationConfig {
    pub fn script_timeout(&self) -> Duration {
        Duration::from_millis(self.script_timeout_ms)
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional config file and
    /// environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        // Add config file if it exists
        config = config.add_source(config::File::with_name("config").required(false));

        // Add environment variables with prefix "STRATA"
        config = config.add_source(
            config::Environment::with_prefix("STRATA")
                .separator("_")
                .prefix_separator("_"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.migration.status_commit_interval, 50);
        assert_eq!(config.migration.script_timeout(), Duration::from_secs(2));
        assert!(config.migration.synchronous_index_apply);
    }
}
