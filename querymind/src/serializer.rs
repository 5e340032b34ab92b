use sea_orm::ConnectionTrait;
use serde::Serialize;
use uuid::Uuid;

use crate::store::{self, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub description: String,
}

/// One table as the language model sees it. Field order is the JSON key order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDescriptor {
    pub table_name: String,
    pub schema_name: String,
    pub description: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.table_name)
    }

    /// How many of the table and its columns carry a description.
    fn described_count(&self) -> usize {
        usize::from(!self.description.is_empty())
            + self
                .columns
                .iter()
                .filter(|c| !c.description.is_empty())
                .count()
    }
}

/// Serialize the stored schema of a database, ordered by schema, table and
/// column declaration order. An empty result means nothing was extracted yet.
pub async fn build_schema_representation<C: ConnectionTrait>(
    db: &C,
    database_id: Uuid,
) -> Result<Vec<TableDescriptor>, StoreError> {
    Ok(store::tables_with_columns(db, database_id)
        .await?
        .into_iter()
        .map(|(table, columns)| TableDescriptor {
            table_name: table.table_name,
            schema_name: table.schema_name,
            description: table.description.unwrap_or_default(),
            columns: columns
                .into_iter()
                .map(|c| ColumnDescriptor {
                    name: c.column_name,
                    data_type: c.data_type,
                    nullable: c.is_nullable,
                    is_primary_key: c.is_primary_key,
                    is_foreign_key: c.is_foreign_key,
                    description: c.description.unwrap_or_default(),
                })
                .collect(),
        })
        .collect())
}

/// Rough token estimate: four characters per token, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

fn schema_tokens(schema: &[TableDescriptor]) -> usize {
    serde_json::to_string_pretty(schema)
        .map(|s| estimate_tokens(&s))
        .unwrap_or(usize::MAX)
}

/// `[` and `\n]` of the pretty-printed array, less the comma its first
/// element goes without.
const ARRAY_CHARS: usize = 2;

/// Characters one table adds to the pretty-printed schema array: its own
/// text indented one level, plus the `,\n` before it.
fn table_chars(table: &TableDescriptor) -> usize {
    serde_json::to_string_pretty(table)
        .map(|s| s.chars().count() + 2 * s.lines().count() + 2)
        .unwrap_or(usize::MAX / 2)
}

/// Bound the schema handed to the prompt builder.
///
/// When schema plus question exceed `budget` estimated tokens, whole tables
/// are omitted, least-described first. Tables named in the question are
/// dropped last. Every omission is reported as a warning; the remaining
/// tables keep their original order and are never truncated.
pub fn fit_to_budget(
    schema: Vec<TableDescriptor>,
    question: &str,
    budget: usize,
) -> (Vec<TableDescriptor>, Vec<String>) {
    let question_tokens = estimate_tokens(question);
    let fits = |chars: usize| question_tokens.saturating_add(chars.div_ceil(4)) <= budget;

    let costs: Vec<usize> = schema.iter().map(table_chars).collect();
    let mut chars = costs
        .iter()
        .fold(ARRAY_CHARS, |total, cost| total.saturating_add(*cost));
    if schema.is_empty() || fits(chars) {
        return (schema, Vec::new());
    }

    let lowered = question.to_lowercase();
    let mentioned = |t: &TableDescriptor| lowered.contains(&t.table_name.to_lowercase());

    // removal order: unmentioned before mentioned, then fewest descriptions, then largest
    let mut removal: Vec<usize> = (0..schema.len()).collect();
    removal.sort_by(|&a, &b| {
        let (ta, tb) = (&schema[a], &schema[b]);
        (mentioned(ta), ta.described_count(), std::cmp::Reverse(ta.columns.len())).cmp(&(
            mentioned(tb),
            tb.described_count(),
            std::cmp::Reverse(tb.columns.len()),
        ))
    });

    let mut kept = vec![true; schema.len()];
    let mut remaining = schema.len();
    let mut omitted = Vec::new();
    for idx in removal {
        if remaining <= 1 || fits(chars) {
            break;
        }
        kept[idx] = false;
        remaining -= 1;
        chars = chars.saturating_sub(costs[idx]);
        omitted.push(schema[idx].qualified_name());
    }

    let total = schema.len();
    let fitted: Vec<TableDescriptor> = schema
        .into_iter()
        .zip(kept)
        .filter_map(|(t, k)| k.then_some(t))
        .collect();

    let mut warnings = Vec::new();
    if !omitted.is_empty() {
        tracing::warn!(
            omitted = omitted.len(),
            total,
            budget,
            "schema exceeds prompt budget, tables omitted"
        );
        warnings.push(format!(
            "Schema exceeds the prompt budget of {budget} tokens; omitted {} of {total} tables: {}",
            omitted.len(),
            omitted.join(", ")
        ));
    }
    if question_tokens + schema_tokens(&fitted) > budget {
        warnings.push(format!(
            "Schema still exceeds the prompt budget of {budget} tokens; the model may truncate it"
        ));
    }
    (fitted, warnings)
}
