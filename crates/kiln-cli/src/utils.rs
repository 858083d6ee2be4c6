//! Output helpers for Kiln CLI

use anyhow::Result;
use console::style;
use serde_json::Value;
use std::time::Duration;

/// Format duration in human-readable format
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}.{:03}s", secs, duration.subsec_millis())
    } else {
        format!("{:.2}ms", duration.as_secs_f64() * 1000.0)
    }
}

/// Print formatted output (JSON or human-readable)
pub fn print_output(data: &Value, json_output: bool) -> Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(data)?);
    } else {
        print_object(data, 0);
    }
    Ok(())
}

fn print_object(data: &Value, indent: usize) {
    let prefix = "  ".repeat(indent);
    match data {
        Value::Object(map) => {
            for (key, value) in map {
                if value.is_object() {
                    println!("{}{}:", prefix, style(key).bold());
                    print_object(value, indent + 1);
                } else {
                    println!("{}{}: {}", prefix, style(key).bold(), format_value(value));
                }
            }
        }
        other => println!("{}{}", prefix, format_value(other)),
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
