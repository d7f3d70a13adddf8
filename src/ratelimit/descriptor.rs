//! Operation descriptors and counter key construction.

use super::client::AddressHints;

/// Identity segment used in counter keys for unauthenticated callers.
pub const ANONYMOUS_IDENTITY: &str = "anonymous";

/// Identifies an operation as `type:name`, e.g. `Mutation:login`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey {
    /// Operation category (`Query`, `Mutation`, ...)
    pub operation_type: String,
    /// Operation name
    pub operation_name: String,
}

impl OperationKey {
    /// Create a new operation key.
    pub fn new(operation_type: &str, operation_name: &str) -> Self {
        Self {
            operation_type: operation_type.to_string(),
            operation_name: operation_name.to_string(),
        }
    }

    /// Parse a `type:name` string. Both halves must be non-empty.
    pub fn parse(key: &str) -> Option<Self> {
        let (operation_type, operation_name) = key.split_once(':')?;
        if operation_type.is_empty() || operation_name.is_empty() {
            return None;
        }
        Some(Self::new(operation_type, operation_name))
    }

    /// Convert the key to its `type:name` string form.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}", self.operation_type, self.operation_name)
    }
}

impl std::fmt::Display for OperationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.operation_type, self.operation_name)
    }
}

/// The operation being admitted, as parsed by the fronting server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub operation_type: String,
    pub operation_name: String,
}

impl OperationDescriptor {
    /// Create a new descriptor.
    pub fn new(operation_type: &str, operation_name: &str) -> Self {
        Self {
            operation_type: operation_type.to_string(),
            operation_name: operation_name.to_string(),
        }
    }

    /// The operation key, or `None` when the type or name is missing.
    pub fn operation_key(&self) -> Option<OperationKey> {
        let operation_type = self.operation_type.trim();
        let operation_name = self.operation_name.trim();
        if operation_type.is_empty() || operation_name.is_empty() {
            return None;
        }
        Some(OperationKey::new(operation_type, operation_name))
    }
}

/// Who is calling: address hints plus an optional authenticated identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    pub hints: AddressHints,
    pub user_id: Option<String>,
}

impl CallerContext {
    /// Create an anonymous caller context.
    pub fn new(hints: AddressHints) -> Self {
        Self {
            hints,
            user_id: None,
        }
    }

    /// Attach an authenticated user identifier.
    pub fn with_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    /// The authenticated identity, if one was supplied and is not blank.
    pub fn authenticated_user(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Whether the caller is authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated_user().is_some()
    }

    /// Resolved client address.
    pub fn address(&self) -> String {
        self.hints.resolve()
    }
}

/// Counter key for the per-operation tier: `address:identity:type:name`.
///
/// Authenticated identities are written as `user:{id}` so no user id can
/// collide with [`ANONYMOUS_IDENTITY`].
pub fn operation_counter_key(
    address: &str,
    user_id: Option<&str>,
    operation: &OperationKey,
) -> String {
    match user_id {
        Some(id) => format!("{}:user:{}:{}", address, id, operation),
        None => format!("{}:{}:{}", address, ANONYMOUS_IDENTITY, operation),
    }
}

/// Counter key for the global tier: the address alone.
pub fn global_counter_key(address: &str) -> String {
    address.to_string()
}
