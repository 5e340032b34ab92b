use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

pub const FALLBACK_EXPLANATION: &str = "Generated SQL query (no structured explanation available)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedSql {
    pub sql_query: String,
    pub explanation: String,
}

type Strategy = fn(&str) -> Option<ParsedSql>;

/// Tried in order; the first `Some` wins. `raw_fallback` catches the rest.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("whole_json", whole_json),
    ("fenced_json", fenced_json),
    ("fenced_any", fenced_any),
];

/// Turn a model's answer into SQL plus explanation. Never fails.
pub fn parse_sql_response(raw: &str) -> ParsedSql {
    for (name, strategy) in STRATEGIES {
        if let Some(parsed) = strategy(raw) {
            tracing::debug!(strategy = name, "parsed model response");
            return parsed;
        }
    }
    tracing::debug!("model response had no usable JSON, using raw text");
    raw_fallback(raw)
}

/// Descriptions are taken exactly as written, surrounding whitespace included.
pub fn parse_description(raw: &str) -> String {
    raw.to_string()
}

fn from_json(text: &str) -> Option<ParsedSql> {
    let value: serde_json::Value = serde_json::from_str(text.trim()).ok()?;
    let sql_query = value.get("sql_query")?.as_str()?.trim().to_string();
    let explanation = value
        .get("explanation")
        .and_then(|e| e.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_EXPLANATION.to_string());
    Some(ParsedSql {
        sql_query,
        explanation,
    })
}

fn whole_json(raw: &str) -> Option<ParsedSql> {
    from_json(raw)
}

fn json_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json[ \t]*\r?\n?(.*?)```").expect("valid regex"))
}

fn any_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)```").expect("valid regex")
    })
}

fn fenced_json(raw: &str) -> Option<ParsedSql> {
    json_fence()
        .captures_iter(raw)
        .find_map(|caps| from_json(caps.get(1)?.as_str()))
}

fn fenced_any(raw: &str) -> Option<ParsedSql> {
    any_fence()
        .captures_iter(raw)
        .find_map(|caps| from_json(caps.get(1)?.as_str()))
}

fn raw_fallback(raw: &str) -> ParsedSql {
    ParsedSql {
        sql_query: raw.trim().to_string(),
        explanation: FALLBACK_EXPLANATION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(sql: &str, explanation: &str) -> ParsedSql {
        ParsedSql {
            sql_query: sql.to_string(),
            explanation: explanation.to_string(),
        }
    }

    #[test]
    fn test_plain_json() {
        let raw = r#"{"sql_query": "SELECT COUNT(*) FROM orders", "explanation": "Counts orders"}"#;
        assert_eq!(
            parse_sql_response(raw),
            parsed("SELECT COUNT(*) FROM orders", "Counts orders")
        );
    }

    #[test]
    fn test_json_fence_matches_plain_json() {
        let plain = r#"{"sql_query": "SELECT 1", "explanation": "One"}"#;
        let fenced = format!("Here you go:\n```json\n{plain}\n```\nEnjoy!");
        assert_eq!(parse_sql_response(&fenced), parse_sql_response(plain));
    }

    #[test]
    fn test_untagged_fence() {
        let raw = "```\n{\"sql_query\": \"SELECT name FROM users\", \"explanation\": \"Names\"}\n```";
        assert_eq!(
            parse_sql_response(raw),
            parsed("SELECT name FROM users", "Names")
        );
    }

    #[test]
    fn test_sql_fence_then_json_fence() {
        let raw = "```sql\nSELECT 1\n```\n\n```\n{\"sql_query\": \"SELECT 2\", \"explanation\": \"Two\"}\n```";
        assert_eq!(parse_sql_response(raw), parsed("SELECT 2", "Two"));
    }

    #[test]
    fn test_prose_falls_back_to_raw_text() {
        let raw = "  I think you want SELECT * FROM orders WHERE total > 10  ";
        assert_eq!(
            parse_sql_response(raw),
            parsed(
                "I think you want SELECT * FROM orders WHERE total > 10",
                FALLBACK_EXPLANATION
            )
        );
    }

    #[test]
    fn test_json_without_sql_query_falls_through() {
        let raw = r#"{"query": "SELECT 1"}"#;
        assert_eq!(parse_sql_response(raw), parsed(raw, FALLBACK_EXPLANATION));
    }

    #[test]
    fn test_missing_explanation_uses_canned_text() {
        let raw = r#"{"sql_query": "SELECT 1"}"#;
        assert_eq!(parse_sql_response(raw), parsed("SELECT 1", FALLBACK_EXPLANATION));
    }

    #[test]
    fn test_description_is_verbatim() {
        assert_eq!(
            parse_description("\n  Stores customer orders. \n"),
            "\n  Stores customer orders. \n"
        );
        assert_eq!(parse_description("```text\nOrders```"), "```text\nOrders```");
    }
}
