//! Resource type definitions for the filess.io provider

use filess_core::provider::ResourceType;
use filess_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

pub const DATABASE_TYPE: &str = "filess_database";

// =============================================================================
// Attribute Names
// =============================================================================

pub const ORGANIZATION_SLUG: &str = "organization_slug";
pub const NAMESPACE_SLUG: &str = "namespace_slug";
pub const NAME: &str = "name";
pub const DESCRIPTION: &str = "description";
pub const ENGINE_ID: &str = "engine_id";
pub const REGION_ID: &str = "region_id";
pub const DATABASE_PLAN: &str = "database_plan";
pub const BILLABLE_ITEMS: &str = "billable_items";
pub const BILLABLE_ITEM_ID: &str = "billable_item_id";
pub const QUANTITY: &str = "quantity";
pub const IP_WHITELIST_IDS: &str = "ip_whitelist_ids";
pub const SSH_KEY_IDS: &str = "ssh_key_ids";
pub const TAILSCALE_CONFIG_ID: &str = "tailscale_config_id";

pub const STATUS: &str = "status";
pub const DATABASE_HOSTNAME: &str = "database_hostname";
pub const DATABASE_SERVICE_PORT: &str = "database_service_port";
pub const DATABASE_USERNAME: &str = "database_username";
pub const DATABASE_PASSWORD: &str = "database_password";
pub const STRIPE_CHECKOUT_URL: &str = "stripe_checkout_url";
pub const CREATED_AT: &str = "created_at";

// =============================================================================
// Resource Type Definitions
// =============================================================================

pub struct DatabaseType;

impl ResourceType for DatabaseType {
    fn name(&self) -> &'static str {
        DATABASE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        database_schema()
    }
}

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![Box::new(DatabaseType)]
}

fn string_list() -> AttributeType {
    AttributeType::List(Box::new(AttributeType::String))
}

fn computed_string(name: &str, description: &str) -> AttributeSchema {
    AttributeSchema::new(name, AttributeType::String)
        .computed()
        .with_description(description)
}

/// Schema of `filess_database`
pub fn database_schema() -> ResourceSchema {
    let billable_item = AttributeType::Block(vec![
        AttributeSchema::new(BILLABLE_ITEM_ID, AttributeType::String)
            .required()
            .with_description("Billable item ID"),
        AttributeSchema::new(QUANTITY, AttributeType::Int)
            .required()
            .with_description("Quantity of the billable item"),
    ]);

    ResourceSchema::new(DATABASE_TYPE)
        .with_description("Managed database instance on filess.io")
        .attribute(
            AttributeSchema::new(ORGANIZATION_SLUG, AttributeType::String)
                .required()
                .force_new()
                .with_description("Organization slug"),
        )
        .attribute(
            AttributeSchema::new(NAMESPACE_SLUG, AttributeType::String)
                .required()
                .force_new()
                .with_description("Namespace slug"),
        )
        .attribute(
            AttributeSchema::new(NAME, AttributeType::String)
                .required()
                .with_description("Database name"),
        )
        .attribute(
            AttributeSchema::new(DESCRIPTION, AttributeType::String)
                .with_description("Database description"),
        )
        .attribute(
            AttributeSchema::new(ENGINE_ID, AttributeType::String)
                .required()
                .force_new()
                .with_description("Database engine ID"),
        )
        .attribute(
            AttributeSchema::new(REGION_ID, AttributeType::String)
                .required()
                .force_new()
                .with_description("Region ID"),
        )
        .attribute(
            AttributeSchema::new(
                DATABASE_PLAN,
                AttributeType::Block(vec![
                    AttributeSchema::new(BILLABLE_ITEMS, AttributeType::List(Box::new(billable_item)))
                        .required()
                        .with_description("Set of billable items"),
                ]),
            )
            .required()
            .with_description("Database plan configuration"),
        )
        .attribute(
            AttributeSchema::new(IP_WHITELIST_IDS, string_list())
                .with_description("List of IP whitelist IDs"),
        )
        .attribute(
            AttributeSchema::new(SSH_KEY_IDS, string_list()).with_description("List of SSH key IDs"),
        )
        .attribute(
            AttributeSchema::new(TAILSCALE_CONFIG_ID, AttributeType::String)
                .with_description("Tailscale config ID"),
        )
        .attribute(computed_string(STATUS, "Database status"))
        .attribute(computed_string(
            DATABASE_HOSTNAME,
            "Hostname for connecting to the database",
        ))
        .attribute(computed_string(
            DATABASE_SERVICE_PORT,
            "Service port for connecting to the database",
        ))
        .attribute(computed_string(
            DATABASE_USERNAME,
            "Database username to use when connecting",
        ))
        .attribute(
            computed_string(DATABASE_PASSWORD, "Database password to use when connecting")
                .sensitive(),
        )
        .attribute(computed_string(
            STRIPE_CHECKOUT_URL,
            "Stripe checkout URL to complete billing when required",
        ))
        .attribute(computed_string(CREATED_AT, "Database creation timestamp"))
}
