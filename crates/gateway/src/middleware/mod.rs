//! Request middleware

pub mod guard;
pub mod metrics;
pub mod rate_limit;
