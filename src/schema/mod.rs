// ABOUTME: Destination table introspection: columns, autoincrement, PK and unique constraints
// ABOUTME: Produces an immutable TableDescriptor read inside the caller's transaction

pub mod sync;

pub use sync::sync_columns;

use crate::error::{LoaderError, LoaderResult, StatementContext};
use crate::utils::{quote_ident, quote_ident_list};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tokio_postgres::GenericClient;

/// A table name, optionally schema-qualified.
///
/// Unqualified names resolve through the connection's `search_path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: Option<&str>, name: &str) -> Self {
        Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// Parse `name` or `schema.name`.
    pub fn parse(input: &str) -> LoaderResult<Self> {
        let trimmed = input.trim();
        let (schema, name) = match trimmed.split_once('.') {
            Some((schema, name)) => (Some(schema.trim()), name.trim()),
            None => (None, trimmed),
        };
        if name.is_empty() || schema.is_some_and(str::is_empty) {
            return Err(LoaderError::InvalidArgument(format!(
                "invalid table name '{}', expected 'table' or 'schema.table'",
                crate::utils::sanitize_identifier(input)
            )));
        }
        Ok(Self::new(schema, name))
    }

    /// Quoted `"schema"."name"`, or just `"name"` when unqualified.
    pub fn qualified(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for TableRef {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    /// `udt_name` from information_schema (int4, text, timestamptz, ...)
    pub data_type: String,
    pub nullable: bool,
    /// Identity, serial and generated columns: values the server assigns itself
    pub autoincrement: bool,
}

/// A primary-key or unique constraint with its columns in key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedConstraint {
    pub name: String,
    pub columns: Vec<String>,
}

/// Schema facts about a destination table.
#[derive(Debug, Clone, Serialize)]
pub struct TableDescriptor {
    pub table: TableRef,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Option<NamedConstraint>,
    /// First declared unique constraint (lowest OID)
    pub unique: Option<NamedConstraint>,
}

/// Where an `ON CONFLICT` clause points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictTarget {
    Constraint(NamedConstraint),
    Columns(Vec<String>),
}

impl ConflictTarget {
    pub fn columns(&self) -> &[String] {
        match self {
            ConflictTarget::Constraint(c) => &c.columns,
            ConflictTarget::Columns(columns) => columns,
        }
    }

    /// Conflict target as it appears after `ON CONFLICT`.
    pub fn to_sql(&self) -> String {
        match self {
            ConflictTarget::Constraint(c) => format!("ON CONSTRAINT {}", quote_ident(&c.name)),
            ConflictTarget::Columns(columns) => format!("({})", quote_ident_list(columns)),
        }
    }
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn is_autoincrement(&self, name: &str) -> bool {
        self.column(name).is_some_and(|c| c.autoincrement)
    }

    /// Unique constraint columns, else primary key columns.
    pub fn constraint_columns(&self) -> Option<&[String]> {
        self.unique
            .as_ref()
            .or(self.primary_key.as_ref())
            .map(|c| c.columns.as_slice())
    }

    /// Fail with a schema error naming the first column the table lacks.
    pub fn ensure_columns<S: AsRef<str>>(&self, columns: &[S]) -> LoaderResult<()> {
        match columns.iter().find(|c| !self.has_column(c.as_ref())) {
            Some(missing) => Err(LoaderError::schema(
                &self.table,
                format!("column '{}' does not exist", missing.as_ref()),
            )),
            None => Ok(()),
        }
    }

    /// Resolve the conflict target: a non-empty override column list, else the
    /// first unique constraint, else the primary key.
    pub fn resolve_conflict_target(
        &self,
        override_columns: Option<&[String]>,
    ) -> LoaderResult<Option<ConflictTarget>> {
        if let Some(columns) = override_columns.filter(|c| !c.is_empty()) {
            self.ensure_columns(columns)?;
            return Ok(Some(ConflictTarget::Columns(columns.to_vec())));
        }
        Ok(self
            .unique
            .as_ref()
            .or(self.primary_key.as_ref())
            .cloned()
            .map(ConflictTarget::Constraint))
    }
}

/// Fill in the schema of an unqualified `table` with `current_schema()`, the
/// first existing schema on the session's `search_path`.
pub(crate) async fn resolve_table<C>(client: &C, table: &TableRef) -> LoaderResult<TableRef>
where
    C: GenericClient,
{
    if table.schema.is_some() {
        return Ok(table.clone());
    }
    let row = client
        .query_one("SELECT current_schema()::text", &[])
        .await
        .map_err(|e| LoaderError::schema(table, format!("failed to read current schema: {}", e)))?;
    let schema: Option<String> = row.get(0);
    match schema {
        Some(schema) => Ok(TableRef::new(Some(&schema), &table.name)),
        None => Err(LoaderError::schema(
            table,
            "search_path names no existing schema, qualify the table name",
        )),
    }
}

/// Read the descriptor of `table`.
///
/// Pass the transaction that will perform the write so the descriptor matches
/// what the write sees. The descriptor's table is always schema-qualified.
pub async fn describe<C>(client: &C, table: &TableRef) -> LoaderResult<TableDescriptor>
where
    C: GenericClient,
{
    let table = &resolve_table(client, table).await?;
    let schema = table.schema.as_deref().unwrap_or_default();
    let rows = client
        .query(
            "SELECT column_name::text,
                    udt_name::text,
                    is_nullable = 'YES',
                    (is_identity = 'YES'
                     OR is_generated = 'ALWAYS'
                     OR COALESCE(column_default, '') LIKE 'nextval(%')
             FROM information_schema.columns
             WHERE table_schema = $1 AND table_name = $2
             ORDER BY ordinal_position",
            &[&schema, &table.name],
        )
        .await
        .map_err(|e| LoaderError::schema(table, format!("failed to read columns: {}", e)))?;

    if rows.is_empty() {
        return Err(LoaderError::schema(table, "table does not exist"));
    }

    let columns: Vec<ColumnInfo> = rows
        .iter()
        .map(|row| ColumnInfo {
            name: row.get(0),
            data_type: row.get(1),
            nullable: row.get(2),
            autoincrement: row.get(3),
        })
        .collect();

    let rows = client
        .query(
            "SELECT con.contype::text,
                    con.conname::text,
                    ARRAY(SELECT a.attname::text
                          FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
                          JOIN pg_attribute a
                            ON a.attrelid = con.conrelid AND a.attnum = k.attnum
                          ORDER BY k.ord)
             FROM pg_constraint con
             JOIN pg_class c ON c.oid = con.conrelid
             JOIN pg_namespace n ON n.oid = c.relnamespace
             WHERE n.nspname = $1
               AND c.relname = $2
               AND con.contype IN ('p', 'u')
             ORDER BY con.oid",
            &[&schema, &table.name],
        )
        .await
        .map_err(|e| LoaderError::schema(table, format!("failed to read constraints: {}", e)))?;

    let mut primary_key = None;
    let mut unique = None;
    for row in &rows {
        let kind: String = row.get(0);
        let constraint = NamedConstraint {
            name: row.get(1),
            columns: row.get(2),
        };
        match kind.as_str() {
            "p" => primary_key = Some(constraint),
            "u" if unique.is_none() => unique = Some(constraint),
            _ => {}
        }
    }

    tracing::debug!(
        "Described {}: {} columns, primary key {:?}, unique {:?}",
        table,
        columns.len(),
        primary_key.as_ref().map(|c| &c.name),
        unique.as_ref().map(|c| &c.name)
    );

    Ok(TableDescriptor {
        table: table.clone(),
        columns,
        primary_key,
        unique,
    })
}

/// Return the resolved constraint columns of `table` (unique, else primary key).
pub async fn constraint_columns<C>(client: &C, table: &TableRef) -> LoaderResult<Vec<String>>
where
    C: GenericClient,
{
    let descriptor = describe(client, table).await?;
    Ok(descriptor
        .constraint_columns()
        .map(<[String]>::to_vec)
        .unwrap_or_default())
}

/// Run `SET LOCAL work_mem` inside the current transaction.
pub(crate) async fn set_local_work_mem<C>(client: &C, work_mem: &str) -> LoaderResult<()>
where
    C: GenericClient,
{
    let statement = format!("SET LOCAL work_mem = {}", crate::utils::quote_literal(work_mem));
    client
        .batch_execute(&statement)
        .await
        .statement_context(|| format!("failed to set work_mem to '{}'", work_mem))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn column(name: &str, data_type: &str, autoincrement: bool) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            autoincrement,
        }
    }

    pub(crate) fn report_descriptor() -> TableDescriptor {
        TableDescriptor {
            table: TableRef::new(Some("public"), "daily_report"),
            columns: vec![
                column("id", "int4", true),
                column("a", "text", false),
                column("b", "int4", false),
                column("c", "int4", false),
                column("meta_updated_at", "timestamptz", false),
            ],
            primary_key: Some(NamedConstraint {
                name: "daily_report_pkey".to_string(),
                columns: vec!["id".to_string()],
            }),
            unique: Some(NamedConstraint {
                name: "daily_report_a_key".to_string(),
                columns: vec!["a".to_string()],
            }),
        }
    }

    #[test]
    fn test_table_ref_parse() {
        let table = TableRef::parse("analytics.daily_report").unwrap();
        assert_eq!(table.schema.as_deref(), Some("analytics"));
        assert_eq!(table.name, "daily_report");
        assert_eq!(table.qualified(), "\"analytics\".\"daily_report\"");
        assert_eq!(table.to_string(), "analytics.daily_report");

        // Unqualified names are left to search_path
        let table: TableRef = "events".parse().unwrap();
        assert_eq!(table.schema, None);
        assert_eq!(table.qualified(), "\"events\"");
        assert_eq!(table.to_string(), "events");

        assert!(TableRef::parse("").is_err());
        assert!(TableRef::parse(".events").is_err());
        assert!(TableRef::parse("public.").is_err());
    }

    #[test]
    fn test_autoincrement_columns() {
        let descriptor = report_descriptor();
        assert!(descriptor.is_autoincrement("id"));
        assert!(!descriptor.is_autoincrement("a"));
        assert!(!descriptor.is_autoincrement("missing"));
    }

    #[test]
    fn test_resolve_prefers_override_then_unique_then_pk() {
        let mut descriptor = report_descriptor();

        let override_cols = vec!["b".to_string(), "c".to_string()];
        let target = descriptor
            .resolve_conflict_target(Some(&override_cols))
            .unwrap()
            .unwrap();
        assert_eq!(target.to_sql(), "(\"b\", \"c\")");

        let target = descriptor.resolve_conflict_target(Some(&[])).unwrap().unwrap();
        assert_eq!(target.to_sql(), "ON CONSTRAINT \"daily_report_a_key\"");
        assert_eq!(target.columns(), &["a".to_string()]);

        descriptor.unique = None;
        let target = descriptor.resolve_conflict_target(None).unwrap().unwrap();
        assert_eq!(target.to_sql(), "ON CONSTRAINT \"daily_report_pkey\"");

        descriptor.primary_key = None;
        assert!(descriptor.resolve_conflict_target(None).unwrap().is_none());
        assert!(descriptor.constraint_columns().is_none());
    }

    #[test]
    fn test_override_with_unknown_column_is_schema_error() {
        let descriptor = report_descriptor();
        let err = descriptor
            .resolve_conflict_target(Some(&["nope".to_string()]))
            .unwrap_err();
        assert!(matches!(err, LoaderError::Schema { .. }));
        assert!(err.to_string().contains("nope"));
    }
}
