use crate::cli::OutputFormat;
use colored::Colorize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_value(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(value),
        OutputFormat::Table => print_as_table(value),
    }
}

pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{value}"),
    }
}

pub fn print_success(msg: &str) {
    eprintln!("{} {}", "✓".green(), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Prints key/value rows as a two-column table.
pub fn print_fields(rows: &[(&str, String)]) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (k, v) in rows {
        builder.push_record([*k, v.as_str()]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

fn print_as_table(value: &Value) {
    if let Some(entries) = extract_bundle_entries(value) {
        if entries.is_empty() {
            println!("No resources found.");
            return;
        }
        let mut builder = Builder::default();
        builder.push_record(["ID", "ResourceType", "LastUpdated"]);
        for entry in entries {
            let resource = entry.get("resource").unwrap_or(entry);
            let id = resource.get("id").and_then(|v| v.as_str()).unwrap_or("-");
            let rt = resource
                .get("resourceType")
                .and_then(|v| v.as_str())
                .unwrap_or("-");
            let updated = resource
                .get("meta")
                .and_then(|m| m.get("lastUpdated"))
                .and_then(|v| v.as_str())
                .unwrap_or("-");
            builder.push_record([id, rt, updated]);
        }
        let total = value.get("total").and_then(|v| v.as_u64());
        let table = builder.build().with(Style::rounded()).to_string();
        println!("{table}");
        if let Some(total) = total {
            println!("Total: {total}");
        }
    } else {
        let rt = value
            .get("resourceType")
            .and_then(|v| v.as_str())
            .unwrap_or("Resource");
        let id = value.get("id").and_then(|v| v.as_str()).unwrap_or("-");
        println!("{} {}/{}", "Resource:".cyan(), rt.cyan(), id.cyan());
        print_json(value);
    }
}

fn extract_bundle_entries(value: &Value) -> Option<&Vec<Value>> {
    if value.get("resourceType")?.as_str()? == "Bundle" {
        value.get("entry")?.as_array()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_bundle_entries() {
        let bundle = json!({"resourceType": "Bundle", "entry": [{"resource": {"id": "p1"}}]});
        assert_eq!(extract_bundle_entries(&bundle).map(Vec::len), Some(1));

        let patient = json!({"resourceType": "Patient", "id": "p1"});
        assert!(extract_bundle_entries(&patient).is_none());
    }
}
