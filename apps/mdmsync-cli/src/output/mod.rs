//! Output formatting for CLI commands

pub mod printer;
pub mod table;

pub use printer::{print_header, print_info, print_json, print_key_value, print_success, print_warning};
pub use table::{format_duration, format_timestamp, truncate};
