//! Rate limiter trait used by the policy service.

use super::decision::Decision;

/// Anything able to decide on a message given its sender and recipient count.
///
/// The policy service works against this trait so connection handling can
/// be exercised without a real window controller.
pub trait PolicyBackend: Send + Sync {
    /// Decide whether the message may pass.
    fn check(&self, sender: &str, recipients: u64) -> Decision;
}
