//! Configuration file loading
//!
//! ```json
//! {
//!   "resources": {
//!     "main": {"type": "filess_database", "name": "orders", ...}
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use filess_core::resource::{Resource, ResourceId, Value};
use filess_core::schema::ResourceSchema;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default)]
    resources: BTreeMap<String, ResourceBlock>,
}

#[derive(Debug, Deserialize)]
struct ResourceBlock {
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(flatten)]
    attributes: serde_json::Map<String, serde_json::Value>,
}

/// Parse a configuration document into resources ordered by name
///
/// `null` attributes are treated as unset.
pub fn parse(content: &str) -> Result<Vec<Resource>, String> {
    let manifest: Manifest =
        serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))?;

    manifest
        .resources
        .into_iter()
        .map(|(name, block)| {
            if name.is_empty() {
                return Err("Resource names cannot be empty".to_string());
            }
            let attributes: HashMap<String, Value> = block
                .attributes
                .iter()
                .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                .collect();
            Ok(Resource {
                id: ResourceId::new(block.resource_type, name),
                attributes,
            })
        })
        .collect()
}

pub fn load(path: &Path) -> Result<Vec<Resource>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    parse(&content)
}

/// Check every resource against the schema of its type
pub fn validate_resources(
    schemas: &HashMap<String, ResourceSchema>,
    resources: &[Resource],
) -> Result<(), String> {
    let mut all_errors = Vec::new();

    for resource in resources {
        match schemas.get(&resource.id.resource_type) {
            Some(schema) => {
                if let Err(errors) = schema.validate(&resource.attributes) {
                    for error in errors {
                        all_errors.push(format!("{}: {}", resource.id, error));
                    }
                }
            }
            None => all_errors.push(format!(
                "{}: unknown resource type '{}'",
                resource.id, resource.id.resource_type
            )),
        }
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        all_errors.sort();
        Err(all_errors.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filess_core::schema::{AttributeSchema, AttributeType};

    const SAMPLE: &str = r#"{
        "resources": {
            "main": {
                "type": "filess_database",
                "name": "orders",
                "description": null,
                "engine_id": "3",
                "database_plan": {"billable_items": [{"billable_item_id": "bi1", "quantity": 2}]}
            },
            "analytics": {"type": "filess_database", "name": "events"}
        }
    }"#;

    #[test]
    fn parse_orders_by_name_and_drops_nulls() {
        let resources = parse(SAMPLE).unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].id.to_string(), "filess_database.analytics");

        let main = &resources[1];
        assert_eq!(main.get_str("engine_id"), Some("3"));
        assert!(!main.attributes.contains_key("description"));
        assert!(!main.attributes.contains_key("type"));
        let items = main.attributes["database_plan"].as_map().unwrap()["billable_items"]
            .as_list()
            .unwrap();
        assert_eq!(items[0].as_map().unwrap()["quantity"], Value::Int(2));
    }

    #[test]
    fn parse_rejects_missing_type() {
        let err = parse(r#"{"resources": {"main": {"name": "orders"}}}"#).unwrap_err();
        assert!(err.starts_with("Parse error"), "{}", err);
    }

    #[test]
    fn validate_reports_every_resource() {
        let schemas = HashMap::from([(
            "filess_database".to_string(),
            ResourceSchema::new("filess_database")
                .attribute(AttributeSchema::new("region_id", AttributeType::String).required()),
        )]);
        let resources = parse(SAMPLE).unwrap();

        let err = validate_resources(&schemas, &resources).unwrap_err();
        assert_eq!(err.lines().count(), 2);
        assert!(err.contains("filess_database.main"));

        let unknown = vec![Resource::new("filess_cache", "c")];
        let err = validate_resources(&schemas, &unknown).unwrap_err();
        assert!(err.contains("unknown resource type 'filess_cache'"));
    }
}
