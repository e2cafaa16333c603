//! Terminal reporting for checkpoint events.
//!
//! Events are one-line, of the form `" MEMORIZING <call_id>"`, colored when
//! stdout is a terminal and `NO_COLOR` is unset.

use colored::{Color, Colorize};
use once_cell::sync::Lazy;
use std::io::IsTerminal;

static ALLOW_COLOR: Lazy<bool> = Lazy::new(|| {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var("TERM").is_ok_and(|term| term == "dumb") {
        return false;
    }
    std::io::stdout().is_terminal()
});

pub(crate) fn log_event(title: &str, call_id: &str, color: Color) {
    if *ALLOW_COLOR {
        println!(
            "{} {}",
            format!(" {} ", title).black().on_color(color),
            call_id.color(color)
        );
    } else {
        println!(" {} {}", title, call_id);
    }
}

pub(crate) fn log_line(text: &str) {
    println!("{}", text);
}
