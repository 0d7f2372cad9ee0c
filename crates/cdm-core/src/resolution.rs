//! Recording of term-mapping misses.
//!
//! A value with no entry in a lookup mapping is not an error: the field is
//! left `Missing` and the miss is recorded here. Each distinct
//! instance/field/value is reported once per run.

use std::collections::BTreeMap;
use std::fmt;

use tracing::warn;

/// Placeholder shown instead of source values when data logging is off.
pub const REDACTED: &str = "<redacted>";

/// A source value that had no entry in its field's term mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermResolutionWarning {
    pub instance: String,
    pub table: String,
    pub destination_field: String,
    pub source_table: String,
    pub source_field: String,
    /// The unmapped value, `None` when redacted.
    pub value: Option<String>,
    /// Rows that carried this value.
    pub occurrences: usize,
}

impl fmt::Display for TermResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): no mapping for {}.{} value '{}' in field '{}' ({} rows)",
            self.instance,
            self.table,
            self.source_table,
            self.source_field,
            self.value.as_deref().unwrap_or(REDACTED),
            self.destination_field,
            self.occurrences
        )
    }
}

type WarningKey = (String, String, String);

/// Collected term-mapping misses.
#[derive(Debug, Default)]
pub struct ResolutionLog {
    log_data: bool,
    entries: BTreeMap<WarningKey, TermResolutionWarning>,
}

/// Where a miss happened.
#[derive(Debug, Clone, Copy)]
pub struct MissSite<'a> {
    pub instance: &'a str,
    pub table: &'a str,
    pub destination_field: &'a str,
    pub source_table: &'a str,
    pub source_field: &'a str,
}

impl ResolutionLog {
    /// `log_data` keeps raw source values in the recorded warnings.
    pub fn new(log_data: bool) -> Self {
        Self {
            log_data,
            entries: BTreeMap::new(),
        }
    }

    /// Record one row whose value had no mapping.
    pub fn record(&mut self, site: MissSite<'_>, value: &str) {
        let key = (
            site.instance.to_string(),
            site.destination_field.to_string(),
            value.to_string(),
        );
        let log_data = self.log_data;
        self.entries
            .entry(key)
            .and_modify(|entry| entry.occurrences += 1)
            .or_insert_with(|| TermResolutionWarning {
                instance: site.instance.to_string(),
                table: site.table.to_string(),
                destination_field: site.destination_field.to_string(),
                source_table: site.source_table.to_string(),
                source_field: site.source_field.to_string(),
                value: log_data.then(|| value.to_string()),
                occurrences: 1,
            });
    }

    /// Fold a committed per-chunk log into this one, warning on new entries.
    pub fn merge(&mut self, other: ResolutionLog) {
        for (key, incoming) in other.entries {
            match self.entries.get_mut(&key) {
                Some(existing) => existing.occurrences += incoming.occurrences,
                None => {
                    warn!(
                        instance = %incoming.instance,
                        field = %incoming.destination_field,
                        source = %format!("{}.{}", incoming.source_table, incoming.source_field),
                        value = %incoming.value.as_deref().unwrap_or(REDACTED),
                        "no term mapping for source value"
                    );
                    self.entries.insert(key, incoming);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &TermResolutionWarning> + '_ {
        self.entries.values()
    }

    pub fn into_warnings(self) -> Vec<TermResolutionWarning> {
        self.entries.into_values().collect()
    }
}
