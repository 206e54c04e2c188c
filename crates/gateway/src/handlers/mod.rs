//! API handlers module

pub mod chat;
pub mod health;
pub mod insights;
pub mod papers;
