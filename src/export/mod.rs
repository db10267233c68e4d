pub mod csv;

// Re-export common types
pub use self::csv::{ExportField, parse_fields, write_csv};
