//! Schema - Define type schemas for resources
//!
//! Providers define schemas for each resource type so that configuration can
//! be checked before any API call, and so callers know which attributes are
//! computed, sensitive, or force a replacement when changed.

use std::collections::HashMap;
use std::fmt;

use crate::resource::{Resource, State, Value};

/// Placeholder shown instead of sensitive attribute values
pub const SENSITIVE_PLACEHOLDER: &str = "(sensitive value)";

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    String,
    Int,
    Bool,
    List(Box<AttributeType>),
    /// Nested block with its own attributes
    Block(Vec<AttributeSchema>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Block(fields), Value::Map(map)) => {
                for field in fields {
                    match map.get(&field.name) {
                        Some(v) => field.attr_type.validate(v).map_err(|e| {
                            TypeError::BlockFieldError {
                                field: field.name.clone(),
                                inner: Box::new(e),
                            }
                        })?,
                        None if field.required => {
                            return Err(TypeError::MissingRequired {
                                name: field.name.clone(),
                            });
                        }
                        None => {}
                    }
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value_type_name(value).to_string(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Block(_) => "Block".to_string(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "String",
        Value::Int(_) => "Int",
        Value::Bool(_) => "Bool",
        Value::List(_) => "List",
        Value::Map(_) => "Map",
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Attribute '{name}' is computed and cannot be set")]
    ComputedAttribute { name: String },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Block field '{field}': {inner}")]
    BlockFieldError { field: String, inner: Box<TypeError> },
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// Set by the provider, never by configuration
    pub computed: bool,
    /// Never shown in plain output
    pub sensitive: bool,
    /// Changing this attribute requires replacing the resource
    pub force_new: bool,
    pub description: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            computed: false,
            sensitive: false,
            force_new: false,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        for (name, schema) in &self.attributes {
            if schema.required && !attributes.contains_key(name) {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        for (name, value) in attributes {
            let Some(schema) = self.attributes.get(name) else {
                // Unknown attributes are ignored
                continue;
            };
            if schema.computed {
                errors.push(TypeError::ComputedAttribute { name: name.clone() });
            } else if let Err(e) = schema.attr_type.validate(value) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Names of force-new attributes whose desired value differs from the
    /// current state, sorted by name
    pub fn replacement_attributes(&self, current: &State, desired: &Resource) -> Vec<String> {
        let mut changed: Vec<String> = self
            .attributes
            .values()
            .filter(|schema| schema.force_new)
            .filter(|schema| {
                current.attributes.get(&schema.name) != desired.attributes.get(&schema.name)
            })
            .map(|schema| schema.name.clone())
            .collect();
        changed.sort();
        changed
    }

    /// Copy of `attributes` with sensitive values masked
    pub fn redact(&self, attributes: &HashMap<String, Value>) -> HashMap<String, Value> {
        attributes
            .iter()
            .map(|(name, value)| {
                let sensitive = self.attributes.get(name).is_some_and(|s| s.sensitive);
                if sensitive {
                    (name.clone(), Value::String(SENSITIVE_PLACEHOLDER.to_string()))
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect()
    }
}
