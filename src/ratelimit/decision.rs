//! Policy decisions returned to the mail transfer agent.

/// Reply sent when a message is allowed through.
pub const PERMIT_ACTION: &str = "action=dunno";
/// Prefix of the reply sent when a message is deferred.
pub const DEFER_ACTION: &str = "action=defer_if_permit";

/// Outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Let the message through; Postfix continues with its other checks.
    Permit,
    /// Defer the message, carrying the text appended to the reply.
    Defer(String),
}

impl Decision {
    pub fn is_permit(&self) -> bool {
        matches!(self, Decision::Permit)
    }
}

/// Renders the full policy reply, including the terminating empty line.
impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Permit => write!(f, "{}\n\n", PERMIT_ACTION),
            Decision::Defer(message) => write!(f, "{} {}\n\n", DEFER_ACTION, message),
        }
    }
}
