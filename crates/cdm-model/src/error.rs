use thiserror::Error;

/// Errors raised while building or validating destination-table definitions.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("table {table} defines no columns")]
    EmptyTable { table: String },

    #[error("duplicate column {column} in table {table}")]
    DuplicateColumn { table: String, column: String },

    #[error("primary key {key} is not a column of table {table}")]
    UnknownPrimaryKey { table: String, key: String },

    #[error("foreign key column {column} is not a column of table {table}")]
    UnknownForeignKeyColumn { table: String, column: String },

    #[error("{table}.{column} references unregistered table {target}")]
    UnknownReferencedTable {
        table: String,
        column: String,
        target: String,
    },

    #[error("{table}.{column} references {target}.{key}, which is not the primary key of {target}")]
    ReferenceNotPrimaryKey {
        table: String,
        column: String,
        target: String,
        key: String,
    },

    #[error("invalid operation name: {0}")]
    UnknownOperation(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
