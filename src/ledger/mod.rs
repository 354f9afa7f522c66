//! Ledger module containing account management, entry recording and the operation facade

pub mod account;
pub mod core;
pub mod entry;

pub use account::*;
pub use core::*;
pub use entry::*;
