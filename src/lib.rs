//! Sendlimit - Sender-based Rate Limiting for Postfix
//!
//! This crate implements a Postfix policy delegation service that limits how
//! many messages each envelope sender may send within a sliding time window.
//! Senders and domains can be whitelisted, and individual domains can be
//! given their own limits.

pub mod config;
pub mod error;
pub mod policy;
pub mod ratelimit;
