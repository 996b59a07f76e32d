//! Error formatting with actionable suggestions.

use stash_core::StashError;
use std::error::Error;

use super::{Palette, Style};

/// Formats errors reaching the top of the CLI
pub struct ErrorFormatter {
    palette: Palette,
}

impl ErrorFormatter {
    pub fn new() -> Self {
        Self::with_palette(Palette::detect())
    }

    pub fn with_palette(palette: Palette) -> Self {
        Self { palette }
    }

    /// Format a cache error with its suggestion and cause chain
    pub fn format_error(&self, error: &StashError) -> String {
        let mut output = self.headline(&error.to_string());

        if let Some(suggestion) = error.suggestion() {
            output.push_str(&format!("\n{}: {}", self.palette.paint(Style::Dim, "help"), suggestion));
        }
        self.push_causes(&mut output, error.source());
        output
    }

    /// Format any error, using the cache error's details when it is one
    pub fn format_anyhow(&self, error: &anyhow::Error) -> String {
        if let Some(stash_error) = error.downcast_ref::<StashError>() {
            return self.format_error(stash_error);
        }

        let mut output = self.headline(&error.to_string());
        self.push_causes(&mut output, error.source());
        output
    }

    fn headline(&self, message: &str) -> String {
        format!("{}: {}", self.palette.paint(Style::Red, "error"), message)
    }

    fn push_causes(&self, output: &mut String, mut source: Option<&(dyn Error + 'static)>) {
        while let Some(err) = source {
            output.push_str(&format!("\n{}: {}", self.palette.paint(Style::Dim, "caused by"), err));
            source = err.source();
        }
    }
}

impl Default for ErrorFormatter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_format_with_suggestion_and_cause() {
        let formatter = ErrorFormatter::with_palette(Palette::plain());
        let error = StashError::backend(
            "Failed to write cas/ab/1",
            io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"),
        );

        let text = formatter.format_error(&error);
        assert!(text.starts_with("error: "));
        assert!(text.contains("help: Check the cache backend is reachable"));
        assert!(text.contains("caused by: pipe closed"));
    }

    #[test]
    fn test_format_anyhow_downcasts() {
        let formatter = ErrorFormatter::with_palette(Palette::plain());
        let error = anyhow::Error::new(StashError::Closed);
        assert!(formatter.format_anyhow(&error).contains("help: Open a new store instance"));

        let other = anyhow::anyhow!("blob not found");
        assert_eq!(formatter.format_anyhow(&other), "error: blob not found");
    }
}
