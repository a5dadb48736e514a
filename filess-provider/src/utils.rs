//! Helpers for pulling typed fields out of untyped API payloads

use serde_json::Value;

/// Render an id that may arrive as a string or a number
///
/// Numbers are rendered without decimals (`42.0` becomes `"42"`), strings
/// pass through, `null` becomes empty and anything else falls back to its
/// JSON text.
pub fn id_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                format!("{:.0}", n.as_f64().unwrap_or_default())
            }
        }
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Connection endpoint advertised in `databaseParams`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionParams {
    pub hostname: String,
    pub service_port: String,
}

impl ConnectionParams {
    pub fn is_complete(&self) -> bool {
        !self.hostname.is_empty() && !self.service_port.is_empty()
    }
}

/// Map a list of `{key, value}` records onto the connection parameters
///
/// Both fields default to empty. Entries that are not objects or have no
/// string key are skipped; unrecognized keys are ignored.
pub fn map_database_params(raw: Option<&Value>) -> ConnectionParams {
    let mut params = ConnectionParams::default();

    let Some(entries) = raw.and_then(Value::as_array) else {
        return params;
    };

    for entry in entries {
        let Some(key) = entry.get("key").and_then(Value::as_str) else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        let value = match entry.get("value") {
            Some(Value::String(s)) => s.clone(),
            Some(n @ Value::Number(_)) => id_to_string(n),
            _ => String::new(),
        };

        match key {
            "database_hostname" => params.hostname = value,
            "database_service_port" => params.service_port = value,
            _ => {}
        }
    }

    params
}

/// Pick the credentials to expose from `databaseUsers`
///
/// Entries without both username and password are skipped. The first entry
/// whose role or username is `root` wins; otherwise the first valid entry is
/// used. Returns empty strings when nothing qualifies.
pub fn select_database_user(raw: Option<&Value>) -> (String, String) {
    let Some(users) = raw.and_then(Value::as_array) else {
        return (String::new(), String::new());
    };

    let mut fallback: Option<(&str, &str)> = None;
    for user in users {
        let username = str_field(user, "username");
        let password = str_field(user, "password");
        let role = str_field(user, "role");

        if username.is_empty() || password.is_empty() {
            continue;
        }

        if role == "root" || username == "root" {
            return (username.to_string(), password.to_string());
        }

        if fallback.is_none() {
            fallback = Some((username, password));
        }
    }

    fallback
        .map(|(u, p)| (u.to_string(), p.to_string()))
        .unwrap_or_default()
}

fn str_field<'a>(value: &'a Value, name: &str) -> &'a str {
    value.get(name).and_then(Value::as_str).unwrap_or_default()
}

/// URL of a pending Stripe checkout, if the backend reports one
pub fn extract_stripe_checkout_url(data: &Value) -> Option<&str> {
    data.get("stripeCheckoutSession")
        .and_then(|session| session.get("url"))
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
}

/// True once hostname, port, username and password are all populated
pub fn credentials_are_ready(data: &Value) -> bool {
    if !map_database_params(data.get("databaseParams")).is_complete() {
        return false;
    }
    let (username, password) = select_database_user(data.get("databaseUsers"));
    !username.is_empty() && !password.is_empty()
}
