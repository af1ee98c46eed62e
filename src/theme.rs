//! Centralized color theming for consistent CLI output.
//!
//! This module provides a semantic color palette that works with both
//! `owo_colors` (for terminal text) and `comfy_table` (for tables).
//!
//! # NO_COLOR Support
//!
//! Colors can be disabled globally via:
//! - The `--no-color` CLI flag
//! - The `NO_COLOR` environment variable
//!
//! When colors are disabled, all theming functions return unstyled output.

use crate::launcher::{BindingStrength, ChildImportance};
use std::sync::atomic::{AtomicBool, Ordering};

/// Global color enable flag (respects NO_COLOR and --no-color).
static COLORS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Disable all colors globally.
///
/// This affects both owo_colors output and comfy_table cells.
/// Call this early in main() when --no-color is set.
pub fn disable_colors() {
    COLORS_ENABLED.store(false, Ordering::Relaxed);
    owo_colors::set_override(false);
}

/// Check if colors are currently enabled.
pub fn colors_enabled() -> bool {
    COLORS_ENABLED.load(Ordering::Relaxed)
}

/// Semantic color categories for consistent theming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Semantic {
    /// Process ids
    Pid,
    /// Worker class names
    Class,
    /// Strong bindings and important workers
    Strong,
    /// Moderate bindings and workers
    Moderate,
    /// Unbound workers, first in line for eviction
    Unbound,
    /// Crashes and out-of-memory kills
    Crash,
    /// Clean exits
    Clean,
    /// Muted/secondary text
    Muted,
}

impl Semantic {
    pub fn for_binding(binding: BindingStrength) -> Self {
        match binding {
            BindingStrength::Strong => Self::Strong,
            BindingStrength::Moderate => Self::Moderate,
            BindingStrength::None => Self::Unbound,
        }
    }

    pub fn for_importance(importance: ChildImportance) -> Self {
        match importance {
            ChildImportance::Important => Self::Strong,
            ChildImportance::Moderate => Self::Moderate,
            ChildImportance::Normal => Self::Unbound,
        }
    }
}

/// Get the comfy_table color for a semantic category.
///
/// Returns `None` when colors are disabled, which leaves the cell unstyled.
pub fn table_color(semantic: Semantic) -> Option<comfy_table::Color> {
    if !colors_enabled() {
        return None;
    }
    Some(match semantic {
        Semantic::Pid => comfy_table::Color::Cyan,
        Semantic::Class => comfy_table::Color::Magenta,
        Semantic::Strong => comfy_table::Color::Green,
        Semantic::Moderate => comfy_table::Color::Yellow,
        Semantic::Unbound => comfy_table::Color::DarkGrey,
        Semantic::Crash => comfy_table::Color::Red,
        Semantic::Clean => comfy_table::Color::Green,
        Semantic::Muted => comfy_table::Color::Reset,
    })
}

/// Extension trait for comfy_table cells with NO_COLOR support.
pub trait ThemedCell {
    /// Apply semantic coloring to a cell, respecting NO_COLOR.
    fn themed(self, semantic: Semantic) -> Self;
}

impl ThemedCell for comfy_table::Cell {
    fn themed(self, semantic: Semantic) -> Self {
        match table_color(semantic) {
            Some(color) => self.fg(color),
            None => self,
        }
    }
}

/// Extension trait for applying semantic colors with owo_colors.
///
/// All methods respect the global color enable state set by `disable_colors()`.
pub trait Themed: owo_colors::OwoColorize {
    /// Style for warning messages (yellow).
    fn warning(&self) -> String
    where
        Self: std::fmt::Display,
    {
        if colors_enabled() {
            format!("{}", owo_colors::OwoColorize::yellow(self))
        } else {
            self.to_string()
        }
    }

    /// Style for section headers (bold + underline).
    fn section_header(&self) -> String
    where
        Self: std::fmt::Display,
    {
        if colors_enabled() {
            format!(
                "{}",
                owo_colors::OwoColorize::underline(&owo_colors::OwoColorize::bold(self))
            )
        } else {
            self.to_string()
        }
    }

    /// Style for count values (cyan).
    fn count(&self) -> String
    where
        Self: std::fmt::Display,
    {
        if colors_enabled() {
            format!("{}", owo_colors::OwoColorize::cyan(self))
        } else {
            self.to_string()
        }
    }
}

impl Themed for String {}
impl Themed for &str {}
impl Themed for usize {}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn reset_colors() {
        COLORS_ENABLED.store(true, Ordering::Relaxed);
        owo_colors::set_override(true);
    }

    #[test]
    #[serial(colors)]
    fn test_disable_colors() {
        reset_colors();
        assert!(colors_enabled());
        disable_colors();
        assert!(!colors_enabled());
        reset_colors();
    }

    #[test]
    #[serial(colors)]
    fn test_themed_trait_with_colors() {
        reset_colors();
        let colored = 4242usize.count();
        assert!(colored.contains("\x1b["), "Expected ANSI escape codes");
        assert!(colored.contains("4242"));
    }

    #[test]
    #[serial(colors)]
    fn test_themed_trait_without_colors() {
        reset_colors();
        disable_colors();

        let text = "test";
        assert_eq!(text.warning(), "test");
        assert_eq!(text.section_header(), "test");
        assert_eq!(3usize.count(), "3");

        reset_colors();
    }

    #[test]
    #[serial(colors)]
    fn test_table_color_follows_binding() {
        reset_colors();
        assert_eq!(
            table_color(Semantic::for_binding(BindingStrength::Strong)),
            Some(comfy_table::Color::Green)
        );
        assert_eq!(
            table_color(Semantic::for_binding(BindingStrength::None)),
            Some(comfy_table::Color::DarkGrey)
        );
        assert_eq!(
            Semantic::for_importance(ChildImportance::Moderate),
            Semantic::Moderate
        );
    }

    #[test]
    #[serial(colors)]
    fn test_table_color_without_colors() {
        reset_colors();
        disable_colors();
        assert_eq!(table_color(Semantic::Pid), None);
        assert_eq!(table_color(Semantic::Crash), None);
        reset_colors();
    }

    #[test]
    #[serial(colors)]
    fn test_themed_cell_no_color() {
        reset_colors();
        disable_colors();
        let cell = comfy_table::Cell::new("test").themed(Semantic::Pid);
        assert_eq!(cell.content(), "test");
        reset_colors();
    }
}
