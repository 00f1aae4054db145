//! Built-in tool listing.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use tether_core::tools::registry::ToolRegistry;

/// Print every built-in tool with its category and recorded outcome.
pub fn list(json: bool) -> Result<()> {
    let registry = ToolRegistry::with_builtins();
    let declarations = registry.declarations();

    if json {
        println!("{}", serde_json::to_string_pretty(&declarations)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Tool").fg(Color::White),
        Cell::new("Records").fg(Color::White),
        Cell::new("Description").fg(Color::White),
    ]);
    for decl in &declarations {
        let outcome = decl
            .category
            .outcome()
            .map(|o| o.as_str().to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(&decl.name).fg(Color::Cyan),
            Cell::new(outcome).fg(Color::DarkGrey),
            Cell::new(&decl.description),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!("  {} tools", style(declarations.len()).bold());
    println!();
    Ok(())
}
