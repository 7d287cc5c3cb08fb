//! Output formatting for the leadflow CLI.
//!
//! This module provides output writers for formatting command results in
//! different formats.
//!
//! ## What
//!
//! - [`OutputWriter`] enum handles different output formats (JSON, Table)
//! - [`JsonOutputWriter`] serializes results to JSON
//! - [`TableOutputWriter`] displays results in human-readable tables

use serde::Serialize;
use tabled::{Table, Tabled};

pub enum OutputWriter {
    /// Display results in a human-readable table
    Table(TableOutputWriter),
    /// Display results as JSON
    Json(JsonOutputWriter),
}

impl OutputWriter {
    /// Write a list of items using the configured output format.
    pub fn write_list<T: Serialize + Tabled>(
        &self,
        items: &[T],
        out: &mut dyn std::io::Write,
    ) -> anyhow::Result<()> {
        match self {
            OutputWriter::Table(writer) => writer.write_list(items, out),
            OutputWriter::Json(writer) => writer.write_list(items, out),
        }
    }

    /// Write a single item using the configured output format.
    pub fn write_item<T: Serialize + Tabled>(
        &self,
        item: &T,
        out: &mut dyn std::io::Write,
    ) -> anyhow::Result<()> {
        match self {
            OutputWriter::Table(writer) => writer.write_item(item, out),
            OutputWriter::Json(writer) => writer.write_item(item, out),
        }
    }
}

/// Writer for formatting output as human-readable tables
pub struct TableOutputWriter;

impl TableOutputWriter {
    pub fn write_list<T: Serialize + Tabled>(
        &self,
        items: &[T],
        out: &mut dyn std::io::Write,
    ) -> anyhow::Result<()> {
        let table = Table::new(items);
        writeln!(out, "{}", table)?;
        Ok(())
    }

    pub fn write_item<T: Serialize + Tabled>(
        &self,
        item: &T,
        out: &mut dyn std::io::Write,
    ) -> anyhow::Result<()> {
        self.write_list(std::slice::from_ref(item), out)
    }
}

/// Writer for formatting output as JSON
pub struct JsonOutputWriter;

impl JsonOutputWriter {
    pub fn write_list<T: Serialize>(
        &self,
        items: &[T],
        out: &mut dyn std::io::Write,
    ) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(items)?;
        writeln!(out, "{}", json)?;
        Ok(())
    }

    pub fn write_item<T: Serialize>(
        &self,
        item: &T,
        out: &mut dyn std::io::Write,
    ) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(item)?;
        writeln!(out, "{}", json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{JsonOutputWriter, OutputWriter, TableOutputWriter};
    use chrono::Utc;
    use leadflow::types::FlowRecord;

    fn sample_flow() -> FlowRecord {
        FlowRecord {
            id: 1,
            customer_id: 42,
            name: "Quick Follow-up".to_string(),
            trigger: "new_lead".to_string(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_json_writer_list() {
        let writer = OutputWriter::Json(JsonOutputWriter);
        let mut cursor = std::io::Cursor::new(Vec::new());
        writer.write_list(&[sample_flow()], &mut cursor).unwrap();
        let output = String::from_utf8(cursor.into_inner()).unwrap();
        assert!(output.contains("Quick Follow-up"));
        assert!(output.contains("customer_id"));
    }

    #[test]
    fn test_table_writer_list() {
        let writer = OutputWriter::Table(TableOutputWriter);
        let mut cursor = std::io::Cursor::new(Vec::new());
        writer.write_list(&[sample_flow()], &mut cursor).unwrap();
        let output = String::from_utf8(cursor.into_inner()).unwrap();

        assert!(output.contains("name"), "Should contain name column header");
        assert!(output.contains("Quick Follow-up"));
        assert!(output.contains("|"), "Should contain table borders");
    }

    #[test]
    fn test_json_writer_item() {
        let writer = OutputWriter::Json(JsonOutputWriter);
        let mut cursor = std::io::Cursor::new(Vec::new());
        writer.write_item(&sample_flow(), &mut cursor).unwrap();
        let output = String::from_utf8(cursor.into_inner()).unwrap();
        assert!(output.contains("new_lead"));
    }
}
