#![allow(clippy::needless_pass_by_value)]

use schemars::schema_for;
use serde::Serialize;
use serde_json::Value;

use super::{CommandCategory, CommandInfo};
use crate::error::AppError;

/// A registry entry: metadata + JSON schema for the params.
#[derive(Debug, Clone, Serialize)]
pub struct CommandRegistryEntry {
    pub name: &'static str,
    pub description: &'static str,
    pub category: CommandCategory,
    pub mutating: bool,
    pub param_schema: Value,
}

pub(super) fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

pub(super) fn schema_value<T: schemars::JsonSchema>() -> Value {
    let root = schema_for!(T);
    serde_json::to_value(root).unwrap_or(empty_object_schema())
}

pub(super) fn entry(info: CommandInfo, param_schema: Value) -> CommandRegistryEntry {
    CommandRegistryEntry {
        name: info.name,
        description: info.description,
        category: info.category,
        mutating: info.mutating,
        param_schema,
    }
}

/// Missing input is treated as an empty object so params with all-default
/// fields can be called with no body.
pub(super) fn de<T: serde::de::DeserializeOwned>(input: &Value) -> Result<T, AppError> {
    let input = if input.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        input.clone()
    };
    serde_json::from_value(input).map_err(|e| AppError::ValidationError {
        message: format!("Invalid parameters: {e}"),
    })
}

/// The complete command registry, auto-generated from param struct schemas.
pub fn command_registry() -> Vec<CommandRegistryEntry> {
    super::Command::registry_entries()
}

/// Help text for command discovery.
/// Three tiers: no topic → categories, category → command list, command → full schema.
pub fn help_text(topic: Option<&str>) -> String {
    let registry = command_registry();

    match topic {
        None => {
            let mut lines = vec!["Available command categories:".to_string()];
            for cat in CommandCategory::all() {
                let count = registry.iter().filter(|e| e.category == *cat).count();
                if count > 0 {
                    lines.push(format!("  {} ({count}): {}", cat.slug(), cat.description()));
                }
            }
            lines.push(String::new());
            lines.push("Use help({topic: \"timeline\"}) to list commands in a category.".to_string());
            lines.push("Use help({topic: \"build_timeline\"}) for full parameter details.".to_string());
            lines.join("\n")
        }
        Some(topic) => {
            if let Some(entry) = registry.iter().find(|e| e.name == topic) {
                let schema_str = serde_json::to_string_pretty(&entry.param_schema)
                    .unwrap_or_else(|_| "{}".to_string());
                return format!(
                    "{}: {}\nCategory: {} | Mutating: {}\n\nParameters:\n{}",
                    entry.name,
                    entry.description,
                    entry.category.slug(),
                    if entry.mutating { "yes" } else { "no" },
                    schema_str,
                );
            }

            let cat_lower = topic.to_lowercase();
            let matching: Vec<&CommandRegistryEntry> = registry
                .iter()
                .filter(|e| e.category.slug() == cat_lower)
                .collect();

            if matching.is_empty() {
                format!("Unknown topic: \"{topic}\". Use help() to see categories and commands.")
            } else {
                let mut lines = vec![format!("{topic} commands:")];
                for entry in &matching {
                    lines.push(format!("  - {}: {}", entry.name, entry.description));
                }
                lines.push(String::new());
                lines.push("Use help({topic: \"command_name\"}) for parameter details.".to_string());
                lines.join("\n")
            }
        }
    }
}

/// JSON Schema formatted tool list (for MCP / REST).
pub fn to_json_schema() -> Value {
    Value::Array(
        command_registry()
            .iter()
            .map(|e| {
                serde_json::json!({
                    "name": e.name,
                    "description": e.description,
                    "category": e.category.slug(),
                    "mutating": e.mutating,
                    "inputSchema": e.param_schema,
                })
            })
            .collect(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn help_tiers() {
        let top = help_text(None);
        assert!(top.contains("assembly (2)"));

        let cat = help_text(Some("Markers"));
        assert!(cat.contains("add_timeline_marker"));
        assert!(cat.contains("get_timeline_markers"));

        let cmd = help_text(Some("build_timeline"));
        assert!(cmd.contains("Mutating: yes"));
        assert!(cmd.contains("insert_placeholder_composition"));

        assert!(help_text(Some("bogus")).starts_with("Unknown topic"));
    }

    #[test]
    fn json_schema_lists_every_tool() {
        let tools = to_json_schema();
        let tools = tools.as_array().unwrap();
        assert_eq!(tools.len(), command_registry().len());
        let build = tools.iter().find(|t| t["name"] == "build_timeline").unwrap();
        assert_eq!(build["category"], "assembly");
        assert!(build["inputSchema"]["properties"]
            .get("insert_placeholder_composition")
            .is_some());
    }

    #[test]
    fn null_input_means_defaults() {
        let p: super::super::params::TimelineItemsParams = de(&Value::Null).unwrap();
        assert_eq!(p.track_index, 1);
    }
}
