use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use uuid::Uuid;

use crate::serializer::TableDescriptor;
use crate::store::MetadataKind;

/// Most sample values quoted into a column description prompt.
pub const MAX_SAMPLE_VALUES: usize = 10;

/// Prompt asking for one SQL query over the given schema.
///
/// The schema is embedded whole; bounding it is the caller's job
/// (see `serializer::fit_to_budget`).
pub fn sql_generation_prompt(schema: &[TableDescriptor], question: &str) -> String {
    let schema_json = serde_json::to_string_pretty(schema).unwrap_or_default();
    format!(
        "Given the following database schema:\n\
         ```\n\
         {schema_json}\n\
         ```\n\
         \n\
         Convert this natural language question to a valid SQL query:\n\
         \"{question}\"\n\
         \n\
         Return your answer as a JSON object with the following format:\n\
         {{\n    \"sql_query\": \"The SQL query\",\n    \"explanation\": \"Brief explanation of what the query does\"\n}}\n\
         Respond with ONLY the JSON object and no other text."
    )
}

/// What is known about the element being described. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptionContext {
    /// Database the element lives in; lets column descriptions sample real values.
    #[serde(default)]
    pub database_id: Option<Uuid>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub nullable: Option<bool>,
    #[serde(default)]
    pub is_primary_key: Option<bool>,
    #[serde(default)]
    pub is_foreign_key: Option<bool>,
    /// Free-form extra context, e.g. the endpoints of a relationship.
    #[serde(default)]
    pub details: Option<String>,
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn sample_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Prompt asking for a one-paragraph description of a table, column or relationship.
pub fn description_prompt(
    kind: MetadataKind,
    name: &str,
    context: &DescriptionContext,
    samples: &[serde_json::Value],
) -> String {
    let mut prompt = match kind {
        MetadataKind::Table => format!(
            "Generate a brief, professional description for a database table named '{name}'."
        ),
        MetadataKind::Column => format!(
            "Generate a brief, professional description for a database column named '{name}'."
        ),
        MetadataKind::Relationship => format!(
            "Generate a brief, professional description for a database relationship where {name}."
        ),
    };

    let mut facts = Vec::new();
    if let Some(schema) = &context.schema {
        facts.push(format!("Schema: {schema}"));
    }
    if let Some(table) = &context.table {
        facts.push(format!("Table: {table}"));
    }
    if let Some(data_type) = &context.data_type {
        facts.push(format!("Data type: {data_type}"));
    }
    if let Some(nullable) = context.nullable {
        facts.push(format!("Nullable: {}", yes_no(nullable)));
    }
    if let Some(pk) = context.is_primary_key {
        facts.push(format!("Primary key: {}", yes_no(pk)));
    }
    if let Some(fk) = context.is_foreign_key {
        facts.push(format!("Foreign key: {}", yes_no(fk)));
    }
    if let Some(details) = &context.details {
        facts.push(format!("Details: {details}"));
    }

    if !facts.is_empty() {
        prompt.push_str("\n\nContext:");
        for fact in &facts {
            let _ = write!(prompt, "\n- {fact}");
        }
    }

    let quoted: Vec<String> = samples
        .iter()
        .take(MAX_SAMPLE_VALUES)
        .map(|v| format!("\"{}\"", sample_text(v)))
        .collect();
    if !quoted.is_empty() {
        let _ = write!(prompt, "\n\nSample values: {}", quoted.join(", "));
    }

    prompt.push_str("\n\nRespond with a single professional paragraph.");
    if !quoted.is_empty() {
        prompt.push_str(
            " Refer to the plausible domain of values the sample values suggest.",
        );
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::ColumnDescriptor;
    use serde_json::json;

    #[test]
    fn test_sql_prompt_embeds_schema_and_question() {
        let schema = vec![TableDescriptor {
            table_name: "orders".to_string(),
            schema_name: "public".to_string(),
            description: String::new(),
            columns: vec![ColumnDescriptor {
                name: "total".to_string(),
                data_type: "numeric".to_string(),
                nullable: true,
                is_primary_key: false,
                is_foreign_key: false,
                description: String::new(),
            }],
        }];
        let prompt = sql_generation_prompt(&schema, "how many rows in orders");

        assert!(prompt.starts_with("Given the following database schema:\n```\n[\n  {\n"));
        assert!(prompt.contains("\"table_name\": \"orders\""));
        assert!(prompt.contains("\"type\": \"numeric\""));
        assert!(prompt.contains("\n\"how many rows in orders\"\n"));
        assert!(prompt.contains("\"sql_query\": \"The SQL query\""));
        assert!(prompt.ends_with("Respond with ONLY the JSON object and no other text."));
    }

    #[test]
    fn test_column_prompt_with_context_and_samples() {
        let context = DescriptionContext {
            schema: Some("public".to_string()),
            table: Some("products".to_string()),
            data_type: Some("text".to_string()),
            nullable: Some(true),
            is_primary_key: Some(false),
            ..Default::default()
        };
        let samples: Vec<serde_json::Value> = (0..12).map(|i| json!(format!("v{i}"))).collect();
        let prompt = description_prompt(MetadataKind::Column, "category", &context, &samples);

        assert!(prompt.starts_with(
            "Generate a brief, professional description for a database column named 'category'."
        ));
        assert!(prompt.contains("\n- Table: products\n- Data type: text\n- Nullable: yes\n"));
        assert!(prompt.contains("Sample values: \"v0\", \"v1\""));
        assert!(prompt.contains("\"v9\""));
        assert!(!prompt.contains("\"v10\""));
        assert!(prompt.ends_with("the sample values suggest."));
    }

    #[test]
    fn test_prompt_without_samples_omits_value_clause() {
        let prompt = description_prompt(
            MetadataKind::Table,
            "orders",
            &DescriptionContext::default(),
            &[],
        );
        assert!(!prompt.contains("Context:"));
        assert!(!prompt.contains("Sample values"));
        assert!(prompt.ends_with("Respond with a single professional paragraph."));
    }

    #[test]
    fn test_relationship_prompt_and_numeric_samples() {
        let prompt = description_prompt(
            MetadataKind::Relationship,
            "orders.customer_id references customers.id",
            &DescriptionContext {
                details: Some("many orders per customer".to_string()),
                ..Default::default()
            },
            &[json!(3), json!(true)],
        );
        assert!(prompt.contains("relationship where orders.customer_id references customers.id."));
        assert!(prompt.contains("- Details: many orders per customer"));
        assert!(prompt.contains("Sample values: \"3\", \"true\""));
    }
}
