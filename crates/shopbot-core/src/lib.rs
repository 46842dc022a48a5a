//! Low-level file and clock helpers shared by the shopbot crates.
//!
//! The record store and voucher ledger persist through
//! [`write_json_document`] and [`read_json_document_or_default`], so a crash
//! mid-write never truncates a state file and a corrupt one is kept aside.

pub mod atomic_io;
pub mod json_document;
pub mod time_utils;

pub use atomic_io::{read_text_optional, write_text_atomic};
pub use json_document::{read_json_document_or_default, write_json_document};
pub use time_utils::{current_unix_timestamp_ms, elapsed_ms_since};
