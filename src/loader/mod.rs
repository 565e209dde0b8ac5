// ABOUTME: SelectLoader: pages a templated query into a table with INSERT ... SELECT
// ABOUTME: All pages share one transaction and stop at the first page that inserts nothing

pub mod template;

pub use template::QueryTemplate;

use crate::error::{LoaderError, LoaderResult, StatementContext};
use crate::schema::{describe, set_local_work_mem, ConflictTarget, TableDescriptor, TableRef};
use crate::writer::statement::{build_insert_select, ConflictClause};
use crate::writer::{BatchResult, ConflictPolicy};
use std::collections::BTreeMap;
use tokio_postgres::{Client, Transaction};

pub const DEFAULT_PAGE_SIZE: usize = 80_000;

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Rows requested per page through `{{ limit }}`
    pub page_size: usize,
    pub work_mem: Option<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            work_mem: None,
        }
    }
}

/// Conflict clause for insert-from-select.
///
/// `update` targets the primary key columns, `partial_update` the first unique
/// constraint (else the primary key) by name, `ignore` has no target.
fn select_conflict_clause(
    descriptor: &TableDescriptor,
    policy: ConflictPolicy,
    columns: &[String],
) -> LoaderResult<ConflictClause> {
    let required = || LoaderError::ConstraintRequired {
        policy: policy.to_string(),
        table: descriptor.table.to_string(),
    };
    let set_except = |key: &[String]| -> Vec<String> {
        columns
            .iter()
            .filter(|c| !key.contains(c))
            .cloned()
            .collect()
    };

    match policy {
        ConflictPolicy::NoCheck => Ok(ConflictClause::None),
        ConflictPolicy::Ignore => Ok(ConflictClause::DoNothing(None)),
        ConflictPolicy::Update => {
            let pk = descriptor.primary_key.as_ref().ok_or_else(required)?;
            Ok(ConflictClause::DoUpdate {
                target: ConflictTarget::Columns(pk.columns.clone()),
                set_columns: set_except(&pk.columns),
            })
        }
        ConflictPolicy::PartialUpdate => {
            let constraint = descriptor
                .unique
                .as_ref()
                .or(descriptor.primary_key.as_ref())
                .ok_or_else(required)?;
            Ok(ConflictClause::DoUpdate {
                target: ConflictTarget::Constraint(constraint.clone()),
                set_columns: set_except(&constraint.columns),
            })
        }
        ConflictPolicy::Scd2 => Err(LoaderError::UnsupportedPolicy {
            policy: policy.to_string(),
            operation: "load_from_query".to_string(),
        }),
    }
}

/// Moves query results into a table without pulling rows to the client.
pub struct SelectLoader<'a> {
    client: &'a mut Client,
}

impl<'a> SelectLoader<'a> {
    pub fn new(client: &'a mut Client) -> Self {
        Self { client }
    }

    /// Render `template` page by page and insert each page into `table`.
    ///
    /// `offset` starts at 0 and grows by `page_size` after every page. The loop
    /// ends at the first page affecting no rows, or after one page when the
    /// template does not reference both `{{ offset }}` and `{{ limit }}`.
    pub async fn load_from_query(
        &mut self,
        template: &str,
        table: &TableRef,
        params: &BTreeMap<String, String>,
        policy: ConflictPolicy,
        options: &LoadOptions,
    ) -> LoaderResult<BatchResult> {
        if options.page_size == 0 {
            return Err(LoaderError::InvalidArgument(
                "page_size must be greater than zero".to_string(),
            ));
        }
        if policy == ConflictPolicy::Scd2 {
            return Err(LoaderError::UnsupportedPolicy {
                policy: policy.to_string(),
                operation: "load_from_query".to_string(),
            });
        }

        let template = QueryTemplate::new(template);
        let first_page = template.render_page(params, 0, options.page_size as u64)?;
        if !template.is_paginated() {
            tracing::info!(
                "Template for {} has no offset/limit placeholders, loading a single page",
                table
            );
        }

        let tx = self
            .client
            .transaction()
            .await
            .statement_context(|| format!("failed to begin transaction on {}", table))?;

        let result = load_pages(&tx, &template, first_page, table, params, policy, options).await;

        match result {
            Ok(result) => {
                tx.commit()
                    .await
                    .statement_context(|| format!("failed to commit load into {}", table))?;
                tracing::info!(
                    "Loaded {} rows into {} (policy {})",
                    result.affected_rows,
                    table,
                    policy
                );
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("Rollback of load into {} failed: {}", table, rollback_err);
                }
                Err(e)
            }
        }
    }
}

async fn load_pages(
    tx: &Transaction<'_>,
    template: &QueryTemplate,
    first_page: String,
    table: &TableRef,
    params: &BTreeMap<String, String>,
    policy: ConflictPolicy,
    options: &LoadOptions,
) -> LoaderResult<BatchResult> {
    if let Some(work_mem) = &options.work_mem {
        set_local_work_mem(tx, work_mem).await?;
    }

    let descriptor = describe(tx, table).await?;

    // Preparing the page reports its result columns without running it
    let statement = tx
        .prepare(&first_page)
        .await
        .statement_context(|| format!("failed to prepare source query for {}", table))?;
    let columns: Vec<String> = statement
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .filter(|c| !descriptor.is_autoincrement(c))
        .collect();
    if columns.is_empty() {
        return Err(LoaderError::schema(
            table,
            "source query returns no insertable columns",
        ));
    }
    descriptor.ensure_columns(&columns)?;

    let conflict = select_conflict_clause(&descriptor, policy, &columns)?;
    let paginated = template.is_paginated();
    let page_size = options.page_size as u64;

    let mut affected = 0u64;
    let mut offset = 0u64;
    let mut page = 1usize;
    let mut query = first_page;

    loop {
        let insert = build_insert_select(&descriptor.table, &columns, &query, &conflict);
        let inserted = tx
            .execute(insert.as_str(), &[])
            .await
            .statement_context(|| format!("failed to load page {} into {}", page, table))?;
        tracing::info!(
            "Page {} (offset {}) into {}: {} rows",
            page,
            offset,
            table,
            inserted
        );
        affected += inserted;

        if inserted == 0 || !paginated {
            break;
        }
        offset += page_size;
        page += 1;
        query = template.render_page(params, offset, page_size)?;
    }

    Ok(BatchResult {
        affected_rows: affected,
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::report_descriptor;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_update_targets_primary_key_columns() {
        let descriptor = report_descriptor();
        let clause =
            select_conflict_clause(&descriptor, ConflictPolicy::Update, &cols(&["id", "a", "b"]))
                .unwrap();
        assert_eq!(
            clause.to_sql(),
            " ON CONFLICT (\"id\") DO UPDATE SET \"a\" = EXCLUDED.\"a\", \"b\" = EXCLUDED.\"b\""
        );
    }

    #[test]
    fn test_partial_update_targets_unique_constraint_by_name() {
        let descriptor = report_descriptor();
        let clause = select_conflict_clause(
            &descriptor,
            ConflictPolicy::PartialUpdate,
            &cols(&["a", "b"]),
        )
        .unwrap();
        assert_eq!(
            clause.to_sql(),
            " ON CONFLICT ON CONSTRAINT \"daily_report_a_key\" DO UPDATE SET \"b\" = EXCLUDED.\"b\""
        );
    }

    #[test]
    fn test_ignore_has_no_target() {
        let descriptor = report_descriptor();
        let clause =
            select_conflict_clause(&descriptor, ConflictPolicy::Ignore, &cols(&["a"])).unwrap();
        assert_eq!(clause.to_sql(), " ON CONFLICT DO NOTHING");
    }

    #[test]
    fn test_update_without_primary_key_is_rejected() {
        let mut descriptor = report_descriptor();
        descriptor.primary_key = None;
        let err = select_conflict_clause(&descriptor, ConflictPolicy::Update, &cols(&["a"]))
            .unwrap_err();
        assert!(matches!(err, LoaderError::ConstraintRequired { .. }));
    }

    #[test]
    fn test_scd2_is_unsupported() {
        let descriptor = report_descriptor();
        let err = select_conflict_clause(&descriptor, ConflictPolicy::Scd2, &cols(&["a"]))
            .unwrap_err();
        assert!(matches!(err, LoaderError::UnsupportedPolicy { .. }));
    }
}
