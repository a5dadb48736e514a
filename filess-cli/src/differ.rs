//! Differ - Compare desired resources with their current state
//!
//! Produces the ordered list of changes `apply` executes. Resources recorded
//! in state but missing from the configuration are deleted.

use std::collections::HashMap;

use filess_core::resource::{Resource, ResourceId, State, Value};
use filess_core::schema::ResourceSchema;

/// Change required for a single resource
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// A force-new attribute changed -> delete, then create
    Replace {
        from: State,
        to: Resource,
        forced_by: Vec<String>,
    },
    /// Resource exists with in-place differences
    Update {
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource is in state but no longer configured
    Delete(State),
}

impl Diff {
    pub fn id(&self) -> &ResourceId {
        match self {
            Diff::Create(resource) => &resource.id,
            Diff::Replace { to, .. } | Diff::Update { to, .. } => &to.id,
            Diff::Delete(state) => &state.id,
        }
    }
}

impl std::fmt::Display for Diff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diff::Create(resource) => write!(f, "create {}", resource.id),
            Diff::Replace { to, forced_by, .. } => {
                write!(f, "replace {} (forced by {})", to.id, forced_by.join(", "))
            }
            Diff::Update {
                to,
                changed_attributes,
                ..
            } => write!(f, "update {} ({})", to.id, changed_attributes.join(", ")),
            Diff::Delete(state) => write!(f, "delete {}", state.id),
        }
    }
}

/// Compare one desired resource with its current state
///
/// Returns `None` when nothing needs to change.
pub fn diff(schema: &ResourceSchema, desired: &Resource, current: &State) -> Option<Diff> {
    if !current.exists {
        return Some(Diff::Create(desired.clone()));
    }

    let forced_by = schema.replacement_attributes(current, desired);
    if !forced_by.is_empty() {
        return Some(Diff::Replace {
            from: current.clone(),
            to: desired.clone(),
            forced_by,
        });
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes);
    if changed.is_empty() {
        None
    } else {
        Some(Diff::Update {
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        })
    }
}

/// Configured attributes whose value differs from the current state, sorted
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
) -> Vec<String> {
    let mut changed: Vec<String> = desired
        .iter()
        .filter(|(key, value)| current.get(*key) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect();
    changed.sort();
    changed
}

/// Ordered changes: configured resources first, then deletions of orphans
pub fn create_plan(
    schemas: &HashMap<String, ResourceSchema>,
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
) -> Result<Vec<Diff>, String> {
    let mut plan = Vec::new();

    for resource in desired {
        let schema = schemas
            .get(&resource.id.resource_type)
            .ok_or_else(|| format!("Unknown resource type: {}", resource.id.resource_type))?;
        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));
        plan.extend(diff(schema, resource, &current));
    }

    let mut orphans: Vec<&State> = current_states
        .values()
        .filter(|state| state.exists && !desired.iter().any(|r| r.id == state.id))
        .collect();
    orphans.sort_by(|a, b| a.id.name.cmp(&b.id.name));
    plan.extend(orphans.into_iter().cloned().map(Diff::Delete));

    Ok(plan)
}

/// Counts by kind of change
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
}

impl PlanSummary {
    pub fn of(plan: &[Diff]) -> Self {
        let mut summary = Self::default();
        for diff in plan {
            match diff {
                Diff::Create(_) => summary.create += 1,
                Diff::Update { .. } => summary.update += 1,
                Diff::Replace { .. } => summary.replace += 1,
                Diff::Delete(_) => summary.delete += 1,
            }
        }
        summary
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Plan: {} to create, {} to update, {} to replace, {} to delete",
            self.create, self.update, self.replace, self.delete
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filess_core::schema::{AttributeSchema, AttributeType};

    fn schema() -> ResourceSchema {
        ResourceSchema::new("filess_database")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("region_id", AttributeType::String).force_new())
    }

    fn existing(attrs: &[(&str, &str)]) -> State {
        State::existing(
            ResourceId::new("filess_database", "main"),
            attrs
                .iter()
                .map(|(k, v)| (k.to_string(), Value::from(*v)))
                .collect(),
        )
        .with_identifier("501")
    }

    fn desired(name: &str, region: &str) -> Resource {
        Resource::new("filess_database", "main")
            .with_attribute("name", Value::from(name))
            .with_attribute("region_id", Value::from(region))
    }

    #[test]
    fn diff_create_when_not_exists() {
        let current = State::not_found(ResourceId::new("filess_database", "main"));
        let result = diff(&schema(), &desired("orders", "1"), &current);
        assert!(matches!(result, Some(Diff::Create(_))));
    }

    #[test]
    fn diff_no_change_when_same() {
        let current = existing(&[("name", "orders"), ("region_id", "1"), ("status", "deployed")]);
        assert_eq!(diff(&schema(), &desired("orders", "1"), &current), None);
    }

    #[test]
    fn diff_replace_when_force_new_changes() {
        let current = existing(&[("name", "orders"), ("region_id", "1")]);
        match diff(&schema(), &desired("invoices", "2"), &current) {
            Some(Diff::Replace { forced_by, .. }) => assert_eq!(forced_by, vec!["region_id"]),
            other => panic!("Expected Replace, got {:?}", other),
        }
    }

    #[test]
    fn diff_update_when_in_place_attribute_changes() {
        let current = existing(&[("name", "orders"), ("region_id", "1")]);
        match diff(&schema(), &desired("invoices", "1"), &current) {
            Some(Diff::Update {
                changed_attributes, ..
            }) => assert_eq!(changed_attributes, vec!["name"]),
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn create_plan_deletes_orphans_last() {
        let schemas = HashMap::from([("filess_database".to_string(), schema())]);
        let orphan = State::existing(ResourceId::new("filess_database", "old"), HashMap::new())
            .with_identifier("9");
        let current_states = HashMap::from([(orphan.id.clone(), orphan)]);

        let plan = create_plan(&schemas, &[desired("orders", "1")], &current_states).unwrap();

        assert_eq!(plan.len(), 2);
        assert!(matches!(plan[0], Diff::Create(_)));
        assert!(matches!(&plan[1], Diff::Delete(state) if state.id.name == "old"));
        assert_eq!(
            PlanSummary::of(&plan).to_string(),
            "Plan: 1 to create, 0 to update, 0 to replace, 1 to delete"
        );
    }

    #[test]
    fn create_plan_rejects_unknown_types() {
        let err = create_plan(&HashMap::new(), &[desired("orders", "1")], &HashMap::new())
            .unwrap_err();
        assert_eq!(err, "Unknown resource type: filess_database");
    }
}
