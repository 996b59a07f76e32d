//! Terminal output.
//!
//! Status messages go to stderr and results to stdout, so that `stash get`
//! can be piped. Colors are used only on a terminal and never when
//! `NO_COLOR` is set.

use std::env;
use std::io::{self, IsTerminal};

pub mod errors;

/// ANSI styles used by the CLI
#[derive(Debug, Clone, Copy)]
pub enum Style {
    Green,
    Yellow,
    Red,
    Dim,
}

impl Style {
    fn code(self) -> &'static str {
        match self {
            Style::Green => "32",
            Style::Yellow => "33",
            Style::Red => "31",
            Style::Dim => "2",
        }
    }
}

/// Whether styled output is enabled
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    /// Enable styles when stderr is a terminal and `NO_COLOR` is unset
    pub fn detect() -> Self {
        let enabled = env::var_os("NO_COLOR").is_none() && io::stderr().is_terminal();
        Self { enabled }
    }

    /// Palette that never styles
    pub fn plain() -> Self {
        Self { enabled: false }
    }

    /// Wrap `text` in `style`
    pub fn paint(&self, style: Style, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{}m{}\x1b[0m", style.code(), text)
        } else {
            text.to_string()
        }
    }
}

/// Output handler shared by all commands
pub struct OutputHandler {
    palette: Palette,
}

impl OutputHandler {
    pub fn new() -> Self {
        Self {
            palette: Palette::detect(),
        }
    }

    /// Print a command result on stdout
    pub fn result(&self, message: &str) {
        println!("{}", message);
    }

    /// Print an informational note
    pub fn info(&self, message: &str) {
        eprintln!("{}", self.palette.paint(Style::Dim, message));
    }

    pub fn success(&self, message: &str) {
        eprintln!("{} {}", self.palette.paint(Style::Green, "✓"), message);
    }

    pub fn warn(&self, message: &str) {
        eprintln!("{} {}", self.palette.paint(Style::Yellow, "⚠"), message);
    }
}

impl Default for OutputHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_palette_leaves_text_alone() {
        assert_eq!(Palette::plain().paint(Style::Red, "error"), "error");
    }

    #[test]
    fn test_enabled_palette_wraps_text() {
        let palette = Palette { enabled: true };
        assert_eq!(palette.paint(Style::Green, "ok"), "\x1b[32mok\x1b[0m");
    }
}
