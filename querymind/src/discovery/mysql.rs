use crate::connector::Session;

use super::{
    DiscoveredColumn, DiscoveredForeignKey, DiscoveredTable, DiscoveryError, DiscoveryProvider,
    cell_bool, cell_i64, cell_text, normalize_table_type,
};

/// Introspects the connected MySQL database (`DATABASE()`), which doubles as the schema name.
pub struct MySqlDiscoveryProvider;

#[async_trait::async_trait]
impl DiscoveryProvider for MySqlDiscoveryProvider {
    async fn discover_tables(
        &self,
        session: &mut dyn Session,
    ) -> Result<Vec<DiscoveredTable>, DiscoveryError> {
        let result = session
            .execute(
                "SELECT CAST(TABLE_SCHEMA AS CHAR), CAST(TABLE_NAME AS CHAR), \
                        CAST(TABLE_TYPE AS CHAR), CAST(TABLE_ROWS AS SIGNED) \
                 FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = DATABASE() \
                 ORDER BY 1, 2",
                &[],
            )
            .await?;

        result
            .rows
            .iter()
            .map(|row| {
                Ok(DiscoveredTable {
                    schema_name: cell_text(row, 0)?,
                    table_name: cell_text(row, 1)?,
                    table_type: normalize_table_type(&cell_text(row, 2)?),
                    row_count: cell_i64(row, 3),
                })
            })
            .collect()
    }

    async fn discover_columns(
        &self,
        session: &mut dyn Session,
    ) -> Result<Vec<DiscoveredColumn>, DiscoveryError> {
        let result = session
            .execute(
                "SELECT CAST(TABLE_SCHEMA AS CHAR), CAST(TABLE_NAME AS CHAR), \
                        CAST(COLUMN_NAME AS CHAR), CAST(ORDINAL_POSITION AS SIGNED), \
                        CAST(COLUMN_TYPE AS CHAR), CAST(IS_NULLABLE AS CHAR), \
                        CASE WHEN COLUMN_KEY = 'PRI' THEN 1 ELSE 0 END \
                 FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = DATABASE() \
                 ORDER BY 1, 2, 4",
                &[],
            )
            .await?;

        result
            .rows
            .iter()
            .map(|row| {
                Ok(DiscoveredColumn {
                    schema_name: cell_text(row, 0)?,
                    table_name: cell_text(row, 1)?,
                    column_name: cell_text(row, 2)?,
                    ordinal_position: cell_i64(row, 3).unwrap_or_default() as i32,
                    data_type: cell_text(row, 4)?,
                    is_nullable: cell_bool(row, 5),
                    is_primary_key: cell_bool(row, 6),
                })
            })
            .collect()
    }

    async fn discover_foreign_keys(
        &self,
        session: &mut dyn Session,
    ) -> Result<Vec<DiscoveredForeignKey>, DiscoveryError> {
        let result = session
            .execute(
                "SELECT CAST(TABLE_SCHEMA AS CHAR), CAST(TABLE_NAME AS CHAR), \
                        CAST(COLUMN_NAME AS CHAR), CAST(REFERENCED_TABLE_SCHEMA AS CHAR), \
                        CAST(REFERENCED_TABLE_NAME AS CHAR), CAST(REFERENCED_COLUMN_NAME AS CHAR) \
                 FROM information_schema.KEY_COLUMN_USAGE \
                 WHERE TABLE_SCHEMA = DATABASE() AND REFERENCED_TABLE_NAME IS NOT NULL \
                 ORDER BY 1, 2, 3",
                &[],
            )
            .await?;

        result
            .rows
            .iter()
            .map(|row| {
                Ok(DiscoveredForeignKey {
                    from_schema: cell_text(row, 0)?,
                    from_table: cell_text(row, 1)?,
                    from_column: cell_text(row, 2)?,
                    to_schema: cell_text(row, 3)?,
                    to_table: cell_text(row, 4)?,
                    to_column: cell_text(row, 5)?,
                })
            })
            .collect()
    }
}
