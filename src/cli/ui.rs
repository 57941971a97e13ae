use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Defines different styles for text elements.
pub enum StyleType {
    Title,
    Label,
    Fired,
    Armed,
    Error,
    Subtle,
}

/// Applies a consistent style to a string.
pub fn style_text(text: &str, style_type: StyleType) -> String {
    let styled = match style_type {
        StyleType::Title => style(text).bold().underlined(),
        StyleType::Label => style(text).bold(),
        StyleType::Fired => style(text).yellow().bold(),
        StyleType::Armed => style(text).green(),
        StyleType::Error => style(text).red(),
        StyleType::Subtle => style(text).dim(),
    };
    styled.to_string()
}

/// Creates a new `comfy_table::Table` with standard styling.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

/// Formats an `Option<T>` into a `Cell`. `None` is displayed as "N/A".
pub fn format_optional_cell<T>(value: Option<T>, format_fn: impl Fn(T) -> String) -> Cell {
    value.map_or(
        Cell::new("N/A")
            .fg(Color::DarkGrey)
            .set_alignment(CellAlignment::Right),
        |v| Cell::new(format_fn(v)).set_alignment(CellAlignment::Right),
    )
}

pub fn rate_cell(rate: f64) -> Cell {
    Cell::new(rate.to_string()).set_alignment(CellAlignment::Right)
}

/// Yes/no cell highlighting triggered days.
pub fn triggered_cell(triggered: bool) -> Cell {
    if triggered {
        Cell::new("yes")
            .fg(Color::Yellow)
            .add_attribute(Attribute::Bold)
    } else {
        Cell::new("no").fg(Color::DarkGrey)
    }
}

pub fn state_cell(active: bool) -> Cell {
    if active {
        Cell::new("armed").fg(Color::Green)
    } else {
        Cell::new("fired").fg(Color::Yellow)
    }
}

pub fn outcome_cell(label: &str) -> Cell {
    let color = match label {
        "triggered" => Color::Yellow,
        "reactivated" => Color::Green,
        "unchanged" => Color::Reset,
        "unsubscribed" => Color::DarkGrey,
        _ => Color::Red,
    };
    Cell::new(label).fg(color)
}

/// Creates a spinner shown while rates are being fetched.
pub fn new_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
