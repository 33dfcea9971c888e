use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;
use serde_json::{Map, Value};

pub fn header(text: &str) {
    println!("{} {}", Icons::DATABASE, text.style(theme().header.clone()));
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().error.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().warn.clone()));
}

pub fn info(label: &str, value: &str) {
    println!(
        "{} {}: {}",
        Icons::INFO.style(theme().info.clone()),
        label.style(theme().key.clone()),
        value
    );
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().key.clone()), value);
}

/// Display text for one stored value
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Print a flat record, one `key: value` per line, keys aligned
pub fn record(fields: &Map<String, Value>) {
    let width = fields.keys().map(|k| k.len()).max().unwrap_or(0);
    for (key, value) in fields {
        let text = cell_text(value).style(theme().value_style(value)).to_string();
        println!("  {:<width$}  {}", key.style(theme().key.clone()), text, width = width);
    }
}
