//! Utility functions shared across the metadata layer.

mod checksum;

pub use checksum::{md5_hex, module_file_checksum};
