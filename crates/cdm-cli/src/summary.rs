use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use cdm_core::{AbortReason, AbortedInstance, TermResolutionWarning};

use crate::types::RunResult;

pub fn print_summary(result: &RunResult) {
    println!("Dataset: {}", result.dataset_name);
    println!("Output: {}", result.output_dir.display());
    println!("Chunks: {}", result.summary.chunks_processed);

    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Rows"),
        header_cell("File"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    for (name, rows) in &result.tables {
        let file = result
            .files
            .get(name)
            .and_then(|path| path.file_name())
            .map_or_else(|| dim_cell("-"), |file| Cell::new(file.to_string_lossy()));
        table.add_row(vec![table_cell(name), Cell::new(rows), file]);
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        Cell::new(result.tables.values().sum::<usize>()).add_attribute(Attribute::Bold),
        dim_cell("-"),
    ]);
    println!("{table}");

    print_aborted_table(&result.summary.aborted);
    print_warning_table(&result.summary.warnings);
}

fn print_aborted_table(aborted: &[AbortedInstance]) {
    if aborted.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Object"),
        header_cell("Table"),
        header_cell("Chunk"),
        header_cell("Reason"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);
    for instance in aborted {
        let reason = match &instance.reason {
            AbortReason::Failed(error) => Cell::new(error.to_string()).fg(Color::Red),
            AbortReason::DependsOn(parent) => {
                Cell::new(format!("depends on {parent}")).fg(Color::Yellow)
            }
        };
        table.add_row(vec![
            Cell::new(&instance.name).add_attribute(Attribute::Bold),
            table_cell(&instance.table),
            Cell::new(instance.chunk),
            reason,
        ]);
    }
    println!();
    println!("Aborted:");
    println!("{table}");
}

fn print_warning_table(warnings: &[TermResolutionWarning]) {
    if warnings.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Object"),
        header_cell("Field"),
        header_cell("Source"),
        header_cell("Value"),
        header_cell("Count"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 4, CellAlignment::Right);
    for warning in warnings {
        let value = match &warning.value {
            Some(value) => Cell::new(value),
            None => dim_cell(cdm_core::resolution::REDACTED),
        };
        table.add_row(vec![
            Cell::new(&warning.instance),
            Cell::new(&warning.destination_field),
            Cell::new(format!("{}.{}", warning.source_table, warning.source_field)),
            value,
            Cell::new(warning.occurrences).fg(Color::Yellow),
        ]);
    }
    println!();
    println!("Unmapped values:");
    println!("{table}");
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(140);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn table_cell(name: &str) -> Cell {
    Cell::new(name)
        .fg(Color::Blue)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
