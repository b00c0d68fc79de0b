//! Terminal output helpers. Colors are dropped when `NO_COLOR` is set.

use serde::Serialize;

use crate::error::CliResult;

const GREEN: &str = "32";
const YELLOW: &str = "33";
const BLUE: &str = "34";
const BOLD: &str = "1";

const HEADER_WIDTH: usize = 59;

fn paint(code: &str, text: &str) -> String {
    if std::env::var_os("NO_COLOR").is_some() {
        text.to_string()
    } else {
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn print_success(message: &str) {
    println!("{} {message}", paint(GREEN, "✓"));
}

/// Warnings go to stderr.
pub fn print_warning(message: &str) {
    eprintln!("{} {message}", paint(YELLOW, "Warning:"));
}

pub fn print_info(message: &str) {
    println!("{} {message}", paint(BLUE, "ℹ"));
}

pub fn print_header(title: &str) {
    let border = "═".repeat(HEADER_WIDTH);
    println!("\n{border}\n{title:^HEADER_WIDTH$}\n{border}\n");
}

pub fn print_key_value(key: &str, value: &str) {
    println!("  {} {value}", paint(BOLD, &format!("{key}:")));
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
