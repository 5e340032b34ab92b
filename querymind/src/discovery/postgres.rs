use crate::connector::Session;

use super::{
    DiscoveredColumn, DiscoveredForeignKey, DiscoveredTable, DiscoveryError, DiscoveryProvider,
    cell_bool, cell_i64, cell_text, normalize_table_type,
};

const USER_SCHEMAS: &str = "NOT IN ('pg_catalog', 'information_schema') \
     AND {col} !~ '^pg_toast' AND {col} !~ '^pg_temp'";

fn user_schema_filter(col: &str) -> String {
    format!("{col} {}", USER_SCHEMAS.replace("{col}", col))
}

/// Introspects Postgres through information_schema and pg_catalog.
pub struct PostgresDiscoveryProvider;

#[async_trait::async_trait]
impl DiscoveryProvider for PostgresDiscoveryProvider {
    async fn discover_tables(
        &self,
        session: &mut dyn Session,
    ) -> Result<Vec<DiscoveredTable>, DiscoveryError> {
        // reltuples is -1 for tables that were never analyzed
        let sql = format!(
            "SELECT t.table_schema::text, t.table_name::text, t.table_type::text, \
                    CASE WHEN c.reltuples >= 0 THEN c.reltuples::bigint END \
             FROM information_schema.tables t \
             LEFT JOIN pg_catalog.pg_namespace n ON n.nspname = t.table_schema \
             LEFT JOIN pg_catalog.pg_class c \
                    ON c.relnamespace = n.oid AND c.relname = t.table_name \
             WHERE {} \
             UNION ALL \
             SELECT m.schemaname::text, m.matviewname::text, 'MATERIALIZED VIEW', \
                    CASE WHEN c.reltuples >= 0 THEN c.reltuples::bigint END \
             FROM pg_catalog.pg_matviews m \
             JOIN pg_catalog.pg_namespace n ON n.nspname = m.schemaname \
             JOIN pg_catalog.pg_class c ON c.relnamespace = n.oid AND c.relname = m.matviewname \
             WHERE {} \
             ORDER BY 1, 2",
            user_schema_filter("t.table_schema"),
            user_schema_filter("m.schemaname"),
        );

        let result = session.execute(&sql, &[]).await?;
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
        let sql = format!(
            "SELECT c.table_schema::text, c.table_name::text, c.column_name::text, \
                    c.ordinal_position::int, \
                    CASE WHEN c.data_type = 'USER-DEFINED' THEN c.udt_name::text \
                         ELSE c.data_type::text END, \
                    (c.is_nullable = 'YES'), \
                    EXISTS ( \
                        SELECT 1 FROM information_schema.table_constraints tc \
                        JOIN information_schema.key_column_usage kcu \
                          ON tc.constraint_name = kcu.constraint_name \
                         AND tc.table_schema = kcu.table_schema \
                         AND tc.table_name = kcu.table_name \
                        WHERE tc.constraint_type = 'PRIMARY KEY' \
                          AND kcu.table_schema = c.table_schema \
                          AND kcu.table_name = c.table_name \
                          AND kcu.column_name = c.column_name \
                    ) \
             FROM information_schema.columns c \
             WHERE {} \
             UNION ALL \
             SELECT n.nspname::text, cl.relname::text, a.attname::text, a.attnum::int, \
                    format_type(a.atttypid, a.atttypmod), NOT a.attnotnull, false \
             FROM pg_catalog.pg_attribute a \
             JOIN pg_catalog.pg_class cl ON cl.oid = a.attrelid \
             JOIN pg_catalog.pg_namespace n ON n.oid = cl.relnamespace \
             WHERE cl.relkind = 'm' AND a.attnum > 0 AND NOT a.attisdropped \
               AND {} \
             ORDER BY 1, 2, 4",
            user_schema_filter("c.table_schema"),
            user_schema_filter("n.nspname"),
        );

        let result = session.execute(&sql, &[]).await?;
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
        // One row per column pair, so composite keys expand into parallel edges.
        let sql = format!(
            "SELECT src_ns.nspname::text, src.relname::text, src_att.attname::text, \
                    dst_ns.nspname::text, dst.relname::text, dst_att.attname::text \
             FROM pg_catalog.pg_constraint con \
             CROSS JOIN LATERAL unnest(con.conkey, con.confkey) AS k(src_attnum, dst_attnum) \
             JOIN pg_catalog.pg_class src ON src.oid = con.conrelid \
             JOIN pg_catalog.pg_namespace src_ns ON src_ns.oid = src.relnamespace \
             JOIN pg_catalog.pg_attribute src_att \
               ON src_att.attrelid = con.conrelid AND src_att.attnum = k.src_attnum \
             JOIN pg_catalog.pg_class dst ON dst.oid = con.confrelid \
             JOIN pg_catalog.pg_namespace dst_ns ON dst_ns.oid = dst.relnamespace \
             JOIN pg_catalog.pg_attribute dst_att \
               ON dst_att.attrelid = con.confrelid AND dst_att.attnum = k.dst_attnum \
             WHERE con.contype = 'f' AND {} \
             ORDER BY 1, 2, 3",
            user_schema_filter("src_ns.nspname"),
        );

        let result = session.execute(&sql, &[]).await?;
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
