//! Terminal output helpers

use std::collections::HashMap;

use colored::Colorize;
use filess_core::diagnostic::{Diagnostic, Severity};
use filess_core::resource::Value;
use filess_core::schema::ResourceSchema;
use filess_state::ResourceState;

use crate::differ::Diff;

pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let mut strs: Vec<_> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            strs.sort();
            format!("{{{}}}", strs.join(", "))
        }
    }
}

/// Attribute lines sorted by name, with sensitive values masked
pub fn attribute_lines(
    schema: Option<&ResourceSchema>,
    attributes: &HashMap<String, Value>,
) -> Vec<String> {
    let redacted = match schema {
        Some(schema) => schema.redact(attributes),
        None => attributes.clone(),
    };
    let mut lines: Vec<String> = redacted
        .iter()
        .map(|(k, v)| format!("{} = {}", k, format_value(v)))
        .collect();
    lines.sort();
    lines
}

pub fn print_resource_state(resource: &ResourceState, schema: Option<&ResourceSchema>) {
    println!(
        "{} {}",
        format!("{}.{}", resource.resource_type, resource.name).cyan().bold(),
        format!("(id: {})", resource.identifier).dimmed()
    );
    for line in attribute_lines(schema, &resource.attribute_values()) {
        println!("    {}", line);
    }
}

pub fn print_plan(plan: &[Diff]) {
    println!("{}", "Execution Plan:".cyan().bold());
    println!();
    for diff in plan {
        let marker = match diff {
            Diff::Create(_) => "+".green().bold(),
            Diff::Update { .. } => "~".yellow().bold(),
            Diff::Replace { .. } => "-/+".magenta().bold(),
            Diff::Delete(_) => "-".red().bold(),
        };
        println!("  {} {}", marker, diff);
    }
    println!();
}

pub fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        let label = match diagnostic.severity {
            Severity::Warning => "Warning:".yellow().bold(),
            Severity::Error => "Error:".red().bold(),
        };
        println!("    {} {}", label, diagnostic.summary);
        if !diagnostic.detail.is_empty() {
            println!("      {}", diagnostic.detail);
        }
    }
}
