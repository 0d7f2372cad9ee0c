use std::collections::BTreeMap;

/// Rows of one source table held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SourceTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Finds a column by name, falling back to an ASCII case-insensitive match.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .or_else(|| self.headers.iter().position(|h| h.eq_ignore_ascii_case(name)))
    }

    /// Value at `row`/`column`; cells past the end of a row read as empty.
    pub fn value(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .map(|r| r.get(column).map(String::as_str).unwrap_or(""))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A synchronized batch of rows drawn from every source.
///
/// Rows are not joined across sources; callers index each source by name and
/// rely on row position for alignment.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub index: usize,
    tables: BTreeMap<String, SourceTable>,
}

impl Chunk {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            tables: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, table: SourceTable) {
        self.tables.insert(name.into(), table);
    }

    /// Looks up a source by name, exact first, then ASCII case-insensitive.
    pub fn table(&self, name: &str) -> Option<&SourceTable> {
        self.tables.get(name).or_else(|| {
            self.tables
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, table)| table)
        })
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.tables.keys().map(String::as_str)
    }

    pub fn row_count(&self, name: &str) -> usize {
        self.table(name).map_or(0, SourceTable::len)
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(SourceTable::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_rows() == 0
    }
}
