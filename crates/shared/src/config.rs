//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Bounds and policies for the company hierarchy.
    #[serde(default)]
    pub hierarchy: HierarchyConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// What happens when a node is promoted to root while another active root exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootPolicy {
    /// Refuse the promotion.
    #[default]
    Reject,
    /// Move the existing root under the promoted node in the same transaction.
    DemoteExisting,
}

/// Hierarchy bounds.
///
/// Every loop over the tree is bounded by one of these values, so corrupted
/// data (a cycle, an absurdly deep chain) costs a bounded amount of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct HierarchyConfig {
    /// Highest level a node may be assigned; deeper nodes are clamped.
    #[serde(default = "default_max_level")]
    pub max_level: u32,
    /// Maximum number of hops a descendant or ancestor walk expands.
    #[serde(default = "default_max_traversal_depth")]
    pub max_traversal_depth: u32,
    /// Maximum number of nodes a single descendant walk returns.
    #[serde(default = "default_max_descendants")]
    pub max_descendants: usize,
    /// Pass budget for the level repair fixed-point loop.
    #[serde(default = "default_max_repair_passes")]
    pub max_repair_passes: u32,
    /// Number of descendant sets kept by the scope cache.
    #[serde(default = "default_scope_cache_capacity")]
    pub scope_cache_capacity: u64,
    /// Time-to-live of a cached descendant set, in seconds.
    #[serde(default = "default_scope_cache_ttl_secs")]
    pub scope_cache_ttl_secs: u64,
    /// Promotion policy when a second root is requested.
    #[serde(default)]
    pub root_policy: RootPolicy,
}

fn default_max_level() -> u32 {
    10
}

fn default_max_traversal_depth() -> u32 {
    10
}

fn default_max_descendants() -> usize {
    10_000
}

fn default_max_repair_passes() -> u32 {
    10
}

fn default_scope_cache_capacity() -> u64 {
    1_000
}

fn default_scope_cache_ttl_secs() -> u64 {
    300 // 5 minutes
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            max_level: default_max_level(),
            max_traversal_depth: default_max_traversal_depth(),
            max_descendants: default_max_descendants(),
            max_repair_passes: default_max_repair_passes(),
            scope_cache_capacity: default_scope_cache_capacity(),
            scope_cache_ttl_secs: default_scope_cache_ttl_secs(),
            root_policy: RootPolicy::default(),
        }
    }
}

impl HierarchyConfig {
    /// Level of a child whose parent sits at `parent_level`, with the cap applied.
    ///
    /// Returns the level and whether it had to be clamped.
    #[must_use]
    pub fn child_level(&self, parent_level: u32) -> (u32, bool) {
        let computed = parent_level.saturating_add(1);
        if computed > self.max_level {
            (self.max_level, true)
        } else {
            (computed, false)
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("HOLDTREE").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
