//! Sender key parsing.

/// The identity a message is rate limited under.
///
/// The full address keys the token; the domain part selects whitelist and
/// per-domain limit entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SenderKey {
    /// The envelope sender exactly as received
    pub address: String,
    /// Everything after the first `@`, or empty when there is none
    pub domain: String,
}

impl SenderKey {
    /// Split a sender address into its key parts.
    pub fn new(sender: &str) -> Self {
        let domain = sender
            .split_once('@')
            .map(|(_, domain)| domain)
            .unwrap_or_default();

        Self {
            address: sender.to_string(),
            domain: domain.to_string(),
        }
    }

    /// Whether this is the null sender (`<>`), as used by bounces.
    pub fn is_null(&self) -> bool {
        self.address.is_empty()
    }
}

impl std::fmt::Display for SenderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "<>")
        } else {
            write!(f, "{}", self.address)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_key_splits_domain() {
        let key = SenderKey::new("alice@example.com");

        assert_eq!(key.address, "alice@example.com");
        assert_eq!(key.domain, "example.com");
    }

    #[test]
    fn test_sender_key_without_at() {
        let key = SenderKey::new("MAILER-DAEMON");
        assert_eq!(key.domain, "");
    }

    #[test]
    fn test_sender_key_uses_first_at() {
        let key = SenderKey::new("odd@name@example.com");
        assert_eq!(key.domain, "name@example.com");
    }

    #[test]
    fn test_null_sender_display() {
        let key = SenderKey::new("");
        assert!(key.is_null());
        assert_eq!(key.to_string(), "<>");
    }
}
