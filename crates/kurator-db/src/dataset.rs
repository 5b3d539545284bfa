//! Destination declarations for extraction jobs
//!
//! Each data source declares where its extract lands through this explicit
//! interface, so the load layer depends on the declaration and nothing
//! source-specific.

/// Declares the warehouse destination of one data source.
pub trait Dataset {
    /// Target table name.
    fn table_name(&self) -> &str;

    /// Columns identifying a row for conflict resolution. Never empty. A
    /// composite key is one logical key: two rows are the same iff all of
    /// their key columns match.
    fn primary_key(&self) -> &[&str];

    /// Declared column layout, for documentation and review. At load time
    /// the live catalog is the source of truth, never this list.
    fn columns(&self) -> &[(&str, &str)];
}
