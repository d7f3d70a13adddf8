//! Client address resolution.

/// Returned when the caller supplied no usable address hint.
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// Untrusted address hints collected by the transport for one caller.
///
/// None of these are validated; they are whatever the fronting server saw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressHints {
    /// Raw `X-Forwarded-For` header value, possibly a comma separated chain
    pub forwarded_for: Option<String>,
    /// Raw `X-Real-IP` header value
    pub real_ip: Option<String>,
    /// Address of the connection peer
    pub peer_addr: Option<String>,
    /// Generic "ip" hint set by the framework
    pub ip: Option<String>,
}

impl AddressHints {
    /// Resolve the hints to a single client address.
    pub fn resolve(&self) -> String {
        resolve_client_address(self)
    }
}

/// Pick the client address from `hints`.
///
/// Precedence, highest first: first entry of the forwarded-for chain,
/// real-ip, connection peer, generic ip hint, then [`UNKNOWN_ADDRESS`].
/// Blank hints count as absent.
pub fn resolve_client_address(hints: &AddressHints) -> String {
    let forwarded = hints
        .forwarded_for
        .as_deref()
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty());

    forwarded
        .or_else(|| non_blank(&hints.real_ip))
        .or_else(|| non_blank(&hints.peer_addr))
        .or_else(|| non_blank(&hints.ip))
        .unwrap_or(UNKNOWN_ADDRESS)
        .to_string()
}

fn non_blank(hint: &Option<String>) -> Option<&str> {
    hint.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints(
        forwarded_for: Option<&str>,
        real_ip: Option<&str>,
        peer_addr: Option<&str>,
        ip: Option<&str>,
    ) -> AddressHints {
        AddressHints {
            forwarded_for: forwarded_for.map(String::from),
            real_ip: real_ip.map(String::from),
            peer_addr: peer_addr.map(String::from),
            ip: ip.map(String::from),
        }
    }

    #[test]
    fn test_forwarded_for_first_entry_wins() {
        let h = hints(
            Some("1.2.3.4, 5.6.7.8"),
            Some("9.9.9.9"),
            Some("10.0.0.1"),
            Some("10.0.0.2"),
        );
        assert_eq!(resolve_client_address(&h), "1.2.3.4");
    }

    #[test]
    fn test_forwarded_for_is_trimmed() {
        let h = hints(Some("  203.0.113.7  ,10.0.0.1"), None, None, None);
        assert_eq!(h.resolve(), "203.0.113.7");
    }

    #[test]
    fn test_real_ip_when_no_forwarded_for() {
        let h = hints(None, Some("9.9.9.9"), Some("10.0.0.1"), None);
        assert_eq!(resolve_client_address(&h), "9.9.9.9");
    }

    #[test]
    fn test_peer_then_ip_hint() {
        let h = hints(None, None, Some("10.0.0.1"), Some("10.0.0.2"));
        assert_eq!(resolve_client_address(&h), "10.0.0.1");

        let h = hints(None, None, None, Some("10.0.0.2"));
        assert_eq!(resolve_client_address(&h), "10.0.0.2");
    }

    #[test]
    fn test_all_absent_is_unknown() {
        assert_eq!(resolve_client_address(&AddressHints::default()), "unknown");
    }

    #[test]
    fn test_blank_hints_are_skipped() {
        let h = hints(Some(" , 5.6.7.8"), Some(""), Some("   "), Some("10.0.0.2"));
        assert_eq!(resolve_client_address(&h), "10.0.0.2");
    }
}
