use crate::connector::Session;

use super::{
    DiscoveredColumn, DiscoveredForeignKey, DiscoveredTable, DiscoveryError, DiscoveryProvider,
    cell_bool, cell_i64, cell_opt_text, cell_text, normalize_table_type,
};

/// SQLite has a single attached schema worth describing.
pub const SQLITE_SCHEMA: &str = "main";

/// Introspects SQLite through sqlite_master and the pragma table functions.
pub struct SqliteDiscoveryProvider;

impl SqliteDiscoveryProvider {
    async fn table_names(
        &self,
        session: &mut dyn Session,
    ) -> Result<Vec<(String, String)>, DiscoveryError> {
        let result = session
            .execute(
                "SELECT name, type FROM sqlite_master \
                 WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name",
                &[],
            )
            .await?;
        result
            .rows
            .iter()
            .map(|row| Ok((cell_text(row, 0)?, cell_text(row, 1)?)))
            .collect()
    }
}

#[async_trait::async_trait]
impl DiscoveryProvider for SqliteDiscoveryProvider {
    async fn discover_tables(
        &self,
        session: &mut dyn Session,
    ) -> Result<Vec<DiscoveredTable>, DiscoveryError> {
        let mut tables = Vec::new();
        for (name, kind) in self.table_names(session).await? {
            // No statistics to estimate from; count base tables exactly.
            let row_count = if kind == "table" {
                let sql = format!(
                    "SELECT COUNT(*) FROM {}",
                    session.engine().qualified(SQLITE_SCHEMA, &name)
                );
                let result = session.execute(&sql, &[]).await?;
                result.rows.first().and_then(|row| cell_i64(row, 0))
            } else {
                None
            };

            tables.push(DiscoveredTable {
                schema_name: SQLITE_SCHEMA.to_string(),
                table_name: name,
                table_type: normalize_table_type(&kind),
                row_count,
            });
        }
        Ok(tables)
    }

    async fn discover_columns(
        &self,
        session: &mut dyn Session,
    ) -> Result<Vec<DiscoveredColumn>, DiscoveryError> {
        let mut columns = Vec::new();
        for (table, _) in self.table_names(session).await? {
            let result = session
                .execute(
                    "SELECT cid, name, type, \"notnull\", pk FROM pragma_table_info(?)",
                    std::slice::from_ref(&table),
                )
                .await?;
            for row in &result.rows {
                columns.push(DiscoveredColumn {
                    schema_name: SQLITE_SCHEMA.to_string(),
                    table_name: table.clone(),
                    column_name: cell_text(row, 1)?,
                    ordinal_position: cell_i64(row, 0).unwrap_or_default() as i32 + 1,
                    data_type: cell_opt_text(row, 2).unwrap_or_default(),
                    is_nullable: !cell_bool(row, 3),
                    is_primary_key: cell_i64(row, 4).unwrap_or_default() > 0,
                });
            }
        }
        Ok(columns)
    }

    async fn discover_foreign_keys(
        &self,
        session: &mut dyn Session,
    ) -> Result<Vec<DiscoveredForeignKey>, DiscoveryError> {
        let mut foreign_keys = Vec::new();
        for (table, kind) in self.table_names(session).await? {
            if kind != "table" {
                continue;
            }
            let result = session
                .execute(
                    "SELECT \"table\", \"from\", \"to\" FROM pragma_foreign_key_list(?)",
                    std::slice::from_ref(&table),
                )
                .await?;
            for row in &result.rows {
                let to_table = cell_text(row, 0)?;
                // A NULL target column means the referenced table's primary key.
                let to_column = match cell_opt_text(row, 2) {
                    Some(col) => col,
                    None => match primary_key_of(session, &to_table).await? {
                        Some(pk) => pk,
                        None => continue,
                    },
                };
                foreign_keys.push(DiscoveredForeignKey {
                    from_schema: SQLITE_SCHEMA.to_string(),
                    from_table: table.clone(),
                    from_column: cell_text(row, 1)?,
                    to_schema: SQLITE_SCHEMA.to_string(),
                    to_table,
                    to_column,
                });
            }
        }
        Ok(foreign_keys)
    }
}

async fn primary_key_of(
    session: &mut dyn Session,
    table: &str,
) -> Result<Option<String>, DiscoveryError> {
    let result = session
        .execute(
            "SELECT name FROM pragma_table_info(?) WHERE pk = 1",
            &[table.to_string()],
        )
        .await?;
    Ok(result.rows.first().and_then(|row| cell_opt_text(row, 0)))
}
