pub mod agents;
pub mod clusters;
pub mod deployments;

use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::Format;

/// Render rows as a borderless table, header first.
pub fn render_table<T: Tabled>(rows: impl IntoIterator<Item = T>) -> String {
    let mut table = Table::new(rows);
    table.with(Style::blank());
    format!("{table}\n")
}

/// Print `value` as JSON, or the table built by `text`.
pub fn emit<T: Serialize>(format: Format, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Format::Text => print!("{}", text()),
    }
    Ok(())
}
