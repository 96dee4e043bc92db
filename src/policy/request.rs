//! Policy delegation request parsing.
//!
//! Postfix sends one `name=value` attribute per line and ends the request
//! with an empty line.

use std::collections::HashMap;

use crate::error::{Result, SendlimitError};

/// Longest attribute line accepted, including the line terminator.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Attributes of one policy request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyRequest {
    attributes: HashMap<String, String>,
}

impl PolicyRequest {
    /// Parse a complete request block, with or without its terminating empty line.
    #[cfg(test)]
    pub(crate) fn parse(block: &str) -> Result<Self> {
        let mut request = Self::default();
        for line in block.lines().filter(|l| !l.is_empty()) {
            request.push_line(line)?;
        }
        Ok(request)
    }

    /// Add one `name=value` line. Later values replace earlier ones.
    pub fn push_line(&mut self, line: &str) -> Result<()> {
        let (name, value) = line.split_once('=').ok_or_else(|| {
            SendlimitError::Protocol(format!("attribute line without '=': {:?}", line))
        })?;

        self.attributes.insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Envelope sender; the null sender when absent.
    pub fn sender(&self) -> &str {
        self.get("sender").unwrap_or_default()
    }

    /// Recipient count; 0 when absent or not a number.
    ///
    /// Postfix only fills this in at the DATA and END-OF-MESSAGE stages.
    pub fn recipient_count(&self) -> u64 {
        self.get("recipient_count")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_postfix_request() {
        let block = "request=smtpd_access_policy\n\
                     protocol_state=END-OF-MESSAGE\n\
                     sender=alice@example.com\n\
                     recipient_count=3\n\
                     client_address=192.0.2.10\n\n";

        let request = PolicyRequest::parse(block).unwrap();

        assert_eq!(request.sender(), "alice@example.com");
        assert_eq!(request.recipient_count(), 3);
        assert_eq!(request.get("protocol_state"), Some("END-OF-MESSAGE"));
    }

    #[test]
    fn test_missing_attributes_default() {
        let request = PolicyRequest::parse("request=smtpd_access_policy\n").unwrap();

        assert_eq!(request.sender(), "");
        assert_eq!(request.recipient_count(), 0);
    }

    #[test]
    fn test_invalid_recipient_count_is_zero() {
        let request = PolicyRequest::parse("recipient_count=many\n").unwrap();
        assert_eq!(request.recipient_count(), 0);
    }

    #[test]
    fn test_value_may_contain_equals() {
        let request = PolicyRequest::parse("sender=a=b@example.com\n").unwrap();
        assert_eq!(request.sender(), "a=b@example.com");
    }

    #[test]
    fn test_line_without_equals_is_rejected() {
        let result = PolicyRequest::parse("sender alice@example.com\n");
        assert!(matches!(result, Err(SendlimitError::Protocol(_))));
    }
}
