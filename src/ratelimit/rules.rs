//! Per-operation rate limit rules.
//!
//! Rules come from three places: the built-in table of operation defaults,
//! an optional YAML rules file that overrides and extends that table, and the
//! explicit handler/group configuration declared in the same file. The
//! handler/group part is flattened into a [`HandlerRegistry`] once at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::descriptor::OperationKey;
use crate::error::{FloodgateError, Result};

/// Longest accepted window, in seconds.
pub const MAX_WINDOW_SECS: u64 = u32::MAX as u64;

/// Limit applied to one operation for one caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum operations permitted per window
    pub limit: u64,
    /// Window length in seconds
    pub window: u64,
    /// Replaces the generated rejection message when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RateLimitConfig {
    /// Create a config without a custom message.
    pub fn new(limit: u64, window: u64) -> Self {
        Self {
            limit,
            window,
            message: None,
        }
    }

    /// Set the custom rejection message.
    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    /// The window as a [`Duration`].
    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.window)
    }

    /// Reject zero limits and windows.
    pub fn validate(&self, context: &str) -> Result<()> {
        if self.limit == 0 {
            return Err(FloodgateError::Config(format!(
                "{}: limit must be greater than zero",
                context
            )));
        }
        if self.window == 0 {
            return Err(FloodgateError::Config(format!(
                "{}: window must be greater than zero",
                context
            )));
        }
        if self.window > MAX_WINDOW_SECS {
            return Err(FloodgateError::Config(format!(
                "{}: window must be at most {} seconds",
                context, MAX_WINDOW_SECS
            )));
        }
        Ok(())
    }
}

/// Static per-operation defaults plus the authenticated/public fallbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDefaults {
    /// Operation key (`Type:name`) to its default config
    #[serde(default)]
    pub operations: HashMap<String, RateLimitConfig>,
    /// Fallback for authenticated callers
    pub default_authenticated: RateLimitConfig,
    /// Fallback for anonymous callers
    pub default_public: RateLimitConfig,
}

impl RateLimitDefaults {
    /// The built-in defaults table.
    pub fn builtin() -> Self {
        let operations = [
            // Authentication
            ("Mutation:login", 5, 60),
            ("Mutation:register", 3, 60),
            ("Mutation:forgotPassword", 3, 300),
            ("Mutation:resetPassword", 5, 300),
            ("Mutation:refreshToken", 10, 60),
            // Public reads
            ("Query:search", 30, 60),
            ("Query:publicProfile", 60, 60),
            // Heavy work
            ("Mutation:uploadFile", 10, 60),
            ("Query:generateReport", 5, 60),
            ("Query:analytics", 10, 60),
        ]
        .into_iter()
        .map(|(key, limit, window)| (key.to_string(), RateLimitConfig::new(limit, window)))
        .collect();

        Self {
            operations,
            default_authenticated: RateLimitConfig::new(1000, 60),
            default_public: RateLimitConfig::new(100, 60),
        }
    }

    /// Default config for an operation key, if the table has one.
    pub fn for_operation(&self, key: &OperationKey) -> Option<&RateLimitConfig> {
        self.operations.get(&key.to_string_key())
    }

    /// Fallback config chosen by whether the caller is authenticated.
    pub fn fallback(&self, authenticated: bool) -> &RateLimitConfig {
        if authenticated {
            &self.default_authenticated
        } else {
            &self.default_public
        }
    }

    /// Apply overrides from a rules file on top of this table.
    pub fn merge(&mut self, overrides: DefaultsOverrides) {
        self.operations.extend(overrides.operations);
        if let Some(config) = overrides.default_authenticated {
            self.default_authenticated = config;
        }
        if let Some(config) = overrides.default_public {
            self.default_public = config;
        }
    }

    fn validate(&self) -> Result<()> {
        for (key, config) in &self.operations {
            validate_operation_key(key)?;
            config.validate(&format!("defaults.operations[{}]", key))?;
        }
        self.default_authenticated
            .validate("defaults.default_authenticated")?;
        self.default_public.validate("defaults.default_public")
    }
}

impl Default for RateLimitDefaults {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Partial defaults as written in a rules file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsOverrides {
    #[serde(default)]
    pub operations: HashMap<String, RateLimitConfig>,
    #[serde(default)]
    pub default_authenticated: Option<RateLimitConfig>,
    #[serde(default)]
    pub default_public: Option<RateLimitConfig>,
}

/// A group of handlers (e.g. one resolver) sharing an optional limit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupRules {
    /// Limit applied to every handler in the group without its own limit
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    /// Operation keys of the handlers in this group
    #[serde(default)]
    pub handlers: Vec<String>,
}

/// The rules file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitRules {
    /// Overrides for the static defaults table
    #[serde(default)]
    pub defaults: DefaultsOverrides,
    /// Handler groups by name
    #[serde(default)]
    pub groups: HashMap<String, GroupRules>,
    /// Handler-specific limits by operation key
    #[serde(default)]
    pub handlers: HashMap<String, RateLimitConfig>,
}

impl RateLimitRules {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("Failed to parse rate limit rules: {}", e)))
    }

    /// Built-in defaults with this file's overrides applied.
    pub fn build_defaults(&self) -> Result<RateLimitDefaults> {
        let mut defaults = RateLimitDefaults::builtin();
        defaults.merge(self.defaults.clone());
        defaults.validate()?;
        Ok(defaults)
    }

    /// Walk the declared handlers and groups into a lookup registry.
    pub fn build_registry(&self) -> Result<HandlerRegistry> {
        let mut registry = HandlerRegistry::new();

        for (group, rules) in &self.groups {
            if let Some(config) = &rules.rate_limit {
                config.validate(&format!("groups[{}].rate_limit", group))?;
                registry.register_group(group, config.clone());
            }
            for handler in &rules.handlers {
                validate_operation_key(handler)?;
                registry.assign_group(handler, group)?;
            }
        }

        for (handler, config) in &self.handlers {
            validate_operation_key(handler)?;
            config.validate(&format!("handlers[{}]", handler))?;
            registry.register_handler(handler, config.clone());
        }

        debug!(
            handlers = registry.handler_count(),
            groups = registry.group_count(),
            "Built handler registry"
        );
        Ok(registry)
    }
}

fn validate_operation_key(key: &str) -> Result<()> {
    if OperationKey::parse(key).is_none() {
        return Err(FloodgateError::Config(format!(
            "invalid operation key '{}', expected 'Type:name'",
            key
        )));
    }
    Ok(())
}

/// Explicit limits attached to handlers and their groups.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    /// Operation key to handler-specific config
    handlers: HashMap<String, RateLimitConfig>,
    /// Operation key to the group that contains it
    membership: HashMap<String, String>,
    /// Group name to group-level config
    groups: HashMap<String, RateLimitConfig>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a config to a single handler.
    ///
    /// The config is stored as given; run [`RateLimitConfig::validate`] first
    /// when it did not come through [`RateLimitRules::build_registry`].
    pub fn register_handler(&mut self, operation_key: &str, config: RateLimitConfig) {
        self.handlers.insert(operation_key.to_string(), config);
    }

    /// Attach a config to a whole group.
    pub fn register_group(&mut self, group: &str, config: RateLimitConfig) {
        self.groups.insert(group.to_string(), config);
    }

    /// Record that a handler belongs to a group.
    ///
    /// A handler can only belong to one group.
    pub fn assign_group(&mut self, operation_key: &str, group: &str) -> Result<()> {
        match self.membership.get(operation_key) {
            Some(existing) if existing != group => Err(FloodgateError::Config(format!(
                "handler '{}' is in both group '{}' and group '{}'",
                operation_key, existing, group
            ))),
            _ => {
                self.membership
                    .insert(operation_key.to_string(), group.to_string());
                Ok(())
            }
        }
    }

    /// The handler's own config.
    pub fn handler_config(&self, key: &OperationKey) -> Option<&RateLimitConfig> {
        self.handlers.get(&key.to_string_key())
    }

    /// The config of the group containing the handler.
    pub fn group_config(&self, key: &OperationKey) -> Option<&RateLimitConfig> {
        let group = self.membership.get(&key.to_string_key())?;
        self.groups.get(group)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}
