//! `filess_database` lifecycle
//!
//! Create posts the desired database, waits for provisioning to finish and
//! then reads back the computed connection details. Read, update and delete
//! address the database by its backend id.

use std::collections::HashMap;
use std::sync::Arc;

use filess_core::diagnostic::Diagnostic;
use filess_core::provider::{Outcome, ProviderError, ProviderResult};
use filess_core::resource::{Resource, ResourceId, State, Value};
use serde::Serialize;
use serde_json::Value as Json;

use crate::client::{ApiClient, ClientError};
use crate::notify::notify_payment_required;
use crate::resources::*;
use crate::utils::{extract_stripe_checkout_url, id_to_string, map_database_params, select_database_user};
use crate::wait::{Cancellation, Clock, TokioClock, WaitConfig, WaitError, wait_for_credentials};

/// Collection endpoint for databases
pub const DATABASES_PATH: &str = "/api/v1/databases";

fn database_path(identifier: &str) -> String {
    format!("{}/{}", DATABASES_PATH, identifier)
}

// =============================================================================
// Desired Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillableItem {
    pub billable_item_id: String,
    pub quantity: i64,
}

/// Typed view of a `filess_database` configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredDatabase {
    pub organization_slug: String,
    pub namespace_slug: String,
    pub name: String,
    pub description: String,
    pub engine_id: String,
    pub region_id: String,
    pub billable_items: Vec<BillableItem>,
    pub ip_whitelist_ids: Option<Vec<String>>,
    pub ssh_key_ids: Option<Vec<String>>,
    pub tailscale_config_id: Option<String>,
}

fn required_str(resource: &Resource, key: &str) -> ProviderResult<String> {
    resource
        .get_str(key)
        .map(str::to_string)
        .ok_or_else(|| {
            ProviderError::invalid_config(format!("missing required attribute '{}'", key))
                .for_resource(resource.id.clone())
        })
}

/// Non-empty list of strings, `None` when unset or empty
fn optional_string_list(resource: &Resource, key: &str) -> ProviderResult<Option<Vec<String>>> {
    let Some(value) = resource.attributes.get(key) else {
        return Ok(None);
    };
    let items = value
        .as_list()
        .ok_or_else(|| invalid(resource, format!("'{}' must be a list of strings", key)))?;
    let ids = items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(resource, format!("'{}' must be a list of strings", key)))
        })
        .collect::<ProviderResult<Vec<_>>>()?;
    Ok((!ids.is_empty()).then_some(ids))
}

fn invalid(resource: &Resource, message: String) -> ProviderError {
    ProviderError::invalid_config(message).for_resource(resource.id.clone())
}

fn billable_items(resource: &Resource) -> ProviderResult<Vec<BillableItem>> {
    let items = resource
        .attributes
        .get(DATABASE_PLAN)
        .and_then(Value::as_map)
        .and_then(|plan| plan.get(BILLABLE_ITEMS))
        .and_then(Value::as_list)
        .ok_or_else(|| {
            invalid(
                resource,
                format!("'{}.{}' must be a list", DATABASE_PLAN, BILLABLE_ITEMS),
            )
        })?;

    let mut result: Vec<BillableItem> = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let fields = item.as_map();
        let id = fields
            .and_then(|f| f.get(BILLABLE_ITEM_ID))
            .and_then(Value::as_str);
        let quantity = fields.and_then(|f| f.get(QUANTITY)).and_then(Value::as_int);
        let (Some(id), Some(quantity)) = (id, quantity) else {
            return Err(invalid(
                resource,
                format!(
                    "billable item {} needs '{}' and '{}'",
                    index, BILLABLE_ITEM_ID, QUANTITY
                ),
            ));
        };
        let item = BillableItem {
            billable_item_id: id.to_string(),
            quantity,
        };
        // Billable items form a set
        if !result.contains(&item) {
            result.push(item);
        }
    }
    Ok(result)
}

impl DesiredDatabase {
    pub fn from_resource(resource: &Resource) -> ProviderResult<Self> {
        Ok(Self {
            organization_slug: required_str(resource, ORGANIZATION_SLUG)?,
            namespace_slug: required_str(resource, NAMESPACE_SLUG)?,
            name: required_str(resource, NAME)?,
            description: resource.get_str(DESCRIPTION).unwrap_or_default().to_string(),
            engine_id: required_str(resource, ENGINE_ID)?,
            region_id: required_str(resource, REGION_ID)?,
            billable_items: billable_items(resource)?,
            ip_whitelist_ids: optional_string_list(resource, IP_WHITELIST_IDS)?,
            ssh_key_ids: optional_string_list(resource, SSH_KEY_IDS)?,
            tailscale_config_id: resource
                .get_str(TAILSCALE_CONFIG_ID)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }

    /// Body of `POST /api/v1/databases`
    pub fn to_request(&self) -> CreateDatabaseRequest<'_> {
        CreateDatabaseRequest {
            organization_slug: &self.organization_slug,
            namespace_slug: &self.namespace_slug,
            engine_id: &self.engine_id,
            region_id: &self.region_id,
            details: DatabaseDetails {
                name: &self.name,
                description: &self.description,
            },
            database_plan_details: DatabasePlanDetails {
                database_plan_bi: self
                    .billable_items
                    .iter()
                    .map(|item| PlanItem {
                        billable_item_id: &item.billable_item_id,
                        quantity: item.quantity,
                    })
                    .collect(),
            },
            ip_whitelist_ids: self.ip_whitelist_ids.as_deref(),
            ssh_key_ids: self.ssh_key_ids.as_deref(),
            tailscale_config_id: self.tailscale_config_id.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatabaseRequest<'a> {
    organization_slug: &'a str,
    namespace_slug: &'a str,
    engine_id: &'a str,
    region_id: &'a str,
    details: DatabaseDetails<'a>,
    database_plan_details: DatabasePlanDetails<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ip_whitelist_ids: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ssh_key_ids: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tailscale_config_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DatabaseDetails<'a> {
    name: &'a str,
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct DatabasePlanDetails<'a> {
    #[serde(rename = "databasePlanBI")]
    database_plan_bi: Vec<PlanItem<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanItem<'a> {
    billable_item_id: &'a str,
    quantity: i64,
}

// =============================================================================
// Observed State
// =============================================================================

/// Attributes derived from a `GET /api/v1/databases/{id}` payload
pub fn database_attributes(data: &Json) -> HashMap<String, Value> {
    let text = |key: &str| {
        Value::String(
            data.get(key)
                .and_then(Json::as_str)
                .unwrap_or_default()
                .to_string(),
        )
    };
    let id = |key: &str| Value::String(id_to_string(data.get(key).unwrap_or(&Json::Null)));

    let mut attributes = HashMap::new();
    attributes.insert(NAME.to_string(), text("name"));
    attributes.insert(DESCRIPTION.to_string(), text("description"));
    attributes.insert(STATUS.to_string(), text("status"));
    attributes.insert(ENGINE_ID.to_string(), id("engineId"));
    attributes.insert(REGION_ID.to_string(), id("regionId"));

    if let Some(created_at) = data.get("createdAt").filter(|v| !v.is_null()) {
        let created_at = created_at
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| created_at.to_string());
        attributes.insert(CREATED_AT.to_string(), Value::String(created_at));
    }

    attributes.insert(
        STRIPE_CHECKOUT_URL.to_string(),
        Value::String(
            extract_stripe_checkout_url(data)
                .unwrap_or_default()
                .to_string(),
        ),
    );

    let params = map_database_params(data.get("databaseParams"));
    attributes.insert(DATABASE_HOSTNAME.to_string(), Value::String(params.hostname));
    attributes.insert(
        DATABASE_SERVICE_PORT.to_string(),
        Value::String(params.service_port),
    );

    let (username, password) = select_database_user(data.get("databaseUsers"));
    attributes.insert(DATABASE_USERNAME.to_string(), Value::String(username));
    attributes.insert(DATABASE_PASSWORD.to_string(), Value::String(password));

    attributes
}

/// Overlay observed attributes on top of the configured ones
fn merge_attributes(
    configured: &HashMap<String, Value>,
    observed: HashMap<String, Value>,
) -> HashMap<String, Value> {
    let mut merged = configured.clone();
    merged.extend(observed);
    merged
}

// =============================================================================
// Controller
// =============================================================================

fn api_error(id: &ResourceId, action: &str, e: ClientError) -> ProviderError {
    ProviderError::new(format!("{}: {}", action, e))
        .for_resource(id.clone())
        .with_cause(e)
}

fn wait_error(id: &ResourceId, identifier: &str, e: WaitError) -> ProviderError {
    let message = format!("error waiting for database {} to be provisioned: {}", identifier, e);
    let err = match e {
        WaitError::Timeout { .. } => ProviderError::timeout(message),
        WaitError::Cancelled { .. } => ProviderError::cancelled(message),
        _ => ProviderError::new(message),
    };
    err.for_resource(id.clone())
        .with_identifier(identifier)
        .with_cause(e)
}

/// Lifecycle operations for `filess_database`
#[derive(Clone)]
pub struct DatabaseController {
    client: ApiClient,
    wait: WaitConfig,
    clock: Arc<dyn Clock>,
    cancellation: Cancellation,
    terminal_notifications: bool,
}

impl DatabaseController {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            wait: WaitConfig::default(),
            clock: Arc::new(TokioClock),
            cancellation: Cancellation::never(),
            terminal_notifications: true,
        }
    }

    pub fn with_wait_config(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Stop provisioning waits when the signal fires
    ///
    /// A create interrupted after the backend assigned an id fails with a
    /// cancelled error that still carries the id.
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Toggle the payment banner written to the controlling terminal
    pub fn with_terminal_notifications(mut self, enabled: bool) -> Self {
        self.terminal_notifications = enabled;
        self
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Create the database and block until it is provisioned
    pub async fn create(&self, resource: &Resource) -> ProviderResult<Outcome<State>> {
        let id = &resource.id;
        let desired = DesiredDatabase::from_resource(resource)?;
        let mut diagnostics = Vec::new();

        if self.cancellation.is_cancelled() {
            return Err(ProviderError::cancelled("create cancelled before submission").for_resource(id.clone()));
        }

        tracing::info!("creating database {} ({})", desired.name, id);
        let response = self
            .client
            .post(DATABASES_PATH, &desired.to_request())
            .await
            .map_err(|e| api_error(id, "error creating database", e))?;

        let identifier = response
            .data
            .get("database")
            .and_then(|database| database.get("id"))
            .map(id_to_string)
            .filter(|identifier| !identifier.is_empty())
            .ok_or_else(|| {
                ProviderError::new("create response did not include data.database.id")
                    .for_resource(id.clone())
            })?;

        if let Some(url) = extract_stripe_checkout_url(&response.data) {
            if self.terminal_notifications {
                notify_payment_required(url);
            }
            tracing::info!(
                database_id = identifier.as_str(),
                stripe_checkout_url = url,
                "Database provisioning blocked until Stripe checkout completes"
            );
            diagnostics.push(Diagnostic::warning(
                "Payment required",
                format!(
                    "Open the checkout URL to complete billing and resume provisioning: {}",
                    url
                ),
            ));
        }

        let provisioned = wait_for_credentials(
            &self.wait,
            &*self.clock,
            &self.cancellation,
            &identifier,
            || self.fetch(&identifier),
        )
        .await
        .map_err(|e| wait_error(id, &identifier, e))?;
        tracing::info!(
            "database {} provisioned with status '{}'",
            identifier,
            provisioned.status
        );

        let state = self.read(id, &identifier).await.map_err(|e| e.with_identifier(&identifier))?;
        if !state.exists {
            return Err(ProviderError::new(format!(
                "database {} disappeared right after provisioning",
                identifier
            ))
            .for_resource(id.clone()));
        }

        let attributes = merge_attributes(&resource.attributes, state.attributes);
        Ok(
            Outcome::new(State::existing(id.clone(), attributes).with_identifier(identifier))
                .with_diagnostics(diagnostics),
        )
    }

    /// Read the database; a 404 yields a not-found state
    ///
    /// Only attributes reported by the backend are returned; callers overlay
    /// them on the configured attributes.
    pub async fn read(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let response = match self.client.get(&database_path(identifier)).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => {
                tracing::info!("database {} no longer exists", identifier);
                return Ok(State::not_found(id.clone()));
            }
            Err(e) => return Err(api_error(id, "error reading database", e)),
        };

        if !response.data.is_object() {
            return Err(
                ProviderError::new("unexpected database response format").for_resource(id.clone())
            );
        }

        Ok(State::existing(id.clone(), database_attributes(&response.data)).with_identifier(identifier))
    }

    /// No field can be changed server-side; the database is re-read
    pub async fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        to: &Resource,
    ) -> ProviderResult<Outcome<State>> {
        let state = self.read(id, identifier).await?;
        if !state.exists {
            return Ok(Outcome::new(state));
        }

        let diagnostics: Vec<Diagnostic> = [NAME, DESCRIPTION]
            .into_iter()
            .filter(|key| {
                to.attributes.contains_key(*key)
                    && to.attributes.get(*key) != state.attributes.get(*key)
            })
            .map(|key| {
                Diagnostic::warning(
                    "Update not supported",
                    format!("'{}' cannot be changed in place and was left as is", key),
                )
            })
            .collect();

        let attributes = merge_attributes(&to.attributes, state.attributes);
        Ok(
            Outcome::new(State::existing(id.clone(), attributes).with_identifier(identifier))
                .with_diagnostics(diagnostics),
        )
    }

    /// Delete the database; a 404 counts as already deleted
    pub async fn delete(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        match self.client.delete(&database_path(identifier)).await {
            Ok(_) => {
                tracing::info!("deleted database {}", identifier);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::info!("database {} was already deleted", identifier);
                Ok(())
            }
            Err(e) => Err(api_error(id, "error deleting database", e)),
        }
    }

    async fn fetch(&self, identifier: &str) -> Result<Json, ClientError> {
        self.client
            .get(&database_path(identifier))
            .await
            .map(|response| response.data)
    }
}
