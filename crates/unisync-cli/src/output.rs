use crate::cli::OutputFormat;
use colored::Colorize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

const HEADER: [&str; 6] = ["Type", "Name", "ExternalID", "Phase", "Sources", "LastError"];

pub fn print_value(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            );
        }
        OutputFormat::Table => print_as_table(value),
    }
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

fn print_as_table(value: &Value) {
    let rows: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![value],
        other => {
            println!("{other}");
            return;
        }
    };
    if rows.is_empty() {
        println!("No sync states found.");
        return;
    }

    let mut builder = Builder::default();
    builder.push_record(HEADER);
    for state in &rows {
        builder.push_record(state_row(state));
    }
    println!("{}", builder.build().with(Style::rounded()));
    if rows.len() > 1 {
        println!("Total: {}", rows.len());
    }
}

/// One table row for a serialized `SyncState`.
pub fn state_row(state: &Value) -> [String; 6] {
    let text = |v: Option<&Value>| v.and_then(Value::as_str).unwrap_or("-").to_string();
    let status = state.get("status");
    let sources = state
        .get("sources")
        .and_then(Value::as_array)
        .map(|s| s.len())
        .unwrap_or(0);
    let mut phase = text(status.and_then(|s| s.get("phase")));
    if state
        .get("meta")
        .and_then(|m| m.get("deletionRequestedAt"))
        .is_some()
    {
        phase.push_str(" (deleting)");
    }
    [
        text(state.get("resourceType")),
        text(state.get("name")),
        text(state.get("externalId")),
        phase,
        sources.to_string(),
        text(status.and_then(|s| s.get("lastError"))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_row_reads_nested_fields() {
        let state = json!({
            "resourceType": "Rule",
            "name": "pending-A",
            "externalId": "cf-42",
            "sources": [{}, {}],
            "status": { "phase": "Error", "lastError": "rate limited" },
            "meta": {}
        });
        assert_eq!(
            state_row(&state),
            ["Rule", "pending-A", "cf-42", "Error", "2", "rate limited"].map(String::from)
        );
    }

    #[test]
    fn test_state_row_marks_tombstones() {
        let state = json!({
            "name": "x",
            "status": { "phase": "Synced" },
            "meta": { "deletionRequestedAt": "2026-01-01T00:00:00Z" }
        });
        let row = state_row(&state);
        assert_eq!(row[0], "-");
        assert_eq!(row[3], "Synced (deleting)");
        assert_eq!(row[4], "0");
        assert_eq!(row[5], "-");
    }
}
