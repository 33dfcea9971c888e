//! Output styles, plain when stdout is not a terminal

use owo_colors::Style;
use serde_json::Value;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct Theme {
    pub header: Style,
    pub success: Style,
    pub error: Style,
    pub warn: Style,
    pub info: Style,
    /// Field names in records and summaries
    pub key: Style,
    /// Numbers and booleans in records
    pub scalar: Style,
    pub null: Style,
}

impl Theme {
    pub fn new(colored: bool) -> Self {
        let pick = |style: Style| if colored { style } else { Style::new() };
        Self {
            header: pick(Style::new().cyan().bold()),
            success: pick(Style::new().green().bold()),
            error: pick(Style::new().red().bold()),
            warn: pick(Style::new().yellow().bold()),
            info: pick(Style::new().magenta()),
            key: pick(Style::new().blue()),
            scalar: pick(Style::new().bright_yellow()),
            null: pick(Style::new().bright_black().italic()),
        }
    }

    pub fn for_stdout() -> Self {
        Self::new(console::Term::stdout().is_term() && console::colors_enabled())
    }

    /// Style for one stored value, picked by its JSON kind
    pub fn value_style(&self, value: &Value) -> Style {
        match value {
            Value::Null => self.null.clone(),
            Value::Number(_) | Value::Bool(_) => self.scalar.clone(),
            _ => Style::new(),
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::for_stdout)
}
