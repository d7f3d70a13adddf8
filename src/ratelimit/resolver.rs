//! Chooses the limit that applies to an operation.

use super::descriptor::OperationKey;
use super::rules::{HandlerRegistry, RateLimitConfig, RateLimitDefaults};

/// Which tier a resolved config came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Attached to the handler itself
    Handler,
    /// Attached to the handler's group
    Group,
    /// Static per-operation default
    OperationDefault,
    /// Fallback for authenticated callers
    Authenticated,
    /// Fallback for anonymous callers
    Public,
}

impl ConfigSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigSource::Handler => "handler",
            ConfigSource::Group => "group",
            ConfigSource::OperationDefault => "operation_default",
            ConfigSource::Authenticated => "default_authenticated",
            ConfigSource::Public => "default_public",
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves operation keys against the registry and the defaults table.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    registry: HandlerRegistry,
    defaults: RateLimitDefaults,
}

impl ConfigResolver {
    /// Create a resolver from a registry and a defaults table.
    pub fn new(registry: HandlerRegistry, defaults: RateLimitDefaults) -> Self {
        Self { registry, defaults }
    }

    /// Resolve the config for `key`. First match wins: handler, group,
    /// operation default, then the authenticated or public fallback.
    pub fn resolve(
        &self,
        key: &OperationKey,
        authenticated: bool,
    ) -> (&RateLimitConfig, ConfigSource) {
        if let Some(config) = self.registry.handler_config(key) {
            return (config, ConfigSource::Handler);
        }
        if let Some(config) = self.registry.group_config(key) {
            return (config, ConfigSource::Group);
        }
        if let Some(config) = self.defaults.for_operation(key) {
            return (config, ConfigSource::OperationDefault);
        }

        let source = if authenticated {
            ConfigSource::Authenticated
        } else {
            ConfigSource::Public
        };
        (self.defaults.fallback(authenticated), source)
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn defaults(&self) -> &RateLimitDefaults {
        &self.defaults
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_key() -> OperationKey {
        OperationKey::new("Query", "generateReport")
    }

    fn resolver_with(handler: bool, group: bool) -> ConfigResolver {
        let mut registry = HandlerRegistry::new();
        registry.assign_group("Query:generateReport", "ReportResolver").unwrap();
        if handler {
            registry.register_handler("Query:generateReport", RateLimitConfig::new(1, 60));
        }
        if group {
            registry.register_group("ReportResolver", RateLimitConfig::new(2, 60));
        }
        ConfigResolver::new(registry, RateLimitDefaults::builtin())
    }

    #[test]
    fn test_handler_overrides_group() {
        let resolver = resolver_with(true, true);
        let (config, source) = resolver.resolve(&report_key(), true);
        assert_eq!(source, ConfigSource::Handler);
        assert_eq!(config.limit, 1);
    }

    #[test]
    fn test_group_overrides_operation_default() {
        let resolver = resolver_with(false, true);
        let (config, source) = resolver.resolve(&report_key(), true);
        assert_eq!(source, ConfigSource::Group);
        assert_eq!(config.limit, 2);
    }

    #[test]
    fn test_operation_default_overrides_fallback() {
        let resolver = resolver_with(false, false);
        let (config, source) = resolver.resolve(&report_key(), true);
        assert_eq!(source, ConfigSource::OperationDefault);
        assert_eq!(config, &RateLimitConfig::new(5, 60));
    }

    #[test]
    fn test_login_default_ignores_authentication() {
        let resolver = ConfigResolver::default();
        let login = OperationKey::new("Mutation", "login");

        for authenticated in [true, false] {
            let (config, source) = resolver.resolve(&login, authenticated);
            assert_eq!(source, ConfigSource::OperationDefault);
            assert_eq!(config, &RateLimitConfig::new(5, 60));
        }
    }

    #[test]
    fn test_unknown_operation_falls_back() {
        let resolver = ConfigResolver::default();
        let key = OperationKey::new("Query", "listWidgets");

        let (config, source) = resolver.resolve(&key, true);
        assert_eq!(source, ConfigSource::Authenticated);
        assert_eq!(config, &resolver.defaults().default_authenticated);

        let (config, source) = resolver.resolve(&key, false);
        assert_eq!(source, ConfigSource::Public);
        assert_eq!(config, &resolver.defaults().default_public);
    }

    #[test]
    fn test_group_without_limit_is_skipped() {
        let mut registry = HandlerRegistry::new();
        registry.assign_group("Mutation:login", "AuthResolver").unwrap();
        let resolver = ConfigResolver::new(registry, RateLimitDefaults::builtin());

        let (_, source) = resolver.resolve(&OperationKey::new("Mutation", "login"), false);
        assert_eq!(source, ConfigSource::OperationDefault);
    }
}
