//! JSON-RPC 1.0 wire types and parameter decoding.
//!
//! Callers send `params` as an array whose first element is the parameter
//! object. That object is either a single service or a `{"Services": [...]}`
//! batch; both are normalised to a sequence here so the dispatcher only ever
//! sees lists.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::registry::{RegistryError, ServiceEntry};
use crate::rpc::error::RpcError;

/// Key selecting the batch form.
const SERVICES_KEY: &str = "Services";
/// Per-call override of the configured apply mode.
const APPLY_KEY: &str = "Apply";

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// `error` is always present (`null` on success), as JSON-RPC 1.0 expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: Value,
    pub result: Value,
    pub error: Option<String>,
}

/// A single item or a list of items.
#[derive(Debug, Clone, PartialEq)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

/// Decoded parameters of a mutating call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallParams {
    pub services: OneOrMany<Value>,
    /// `Some` when the caller overrides the configured apply mode.
    pub apply: Option<bool>,
}

impl CallParams {
    pub fn decode(params: Value) -> Result<Self, RpcError> {
        let mut object = first_param(params)?;

        let apply = match object.remove(APPLY_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::Bool(flag)) => Some(flag),
            Some(other) => {
                return Err(RpcError::InvalidParams(format!(
                    "'{}' must be a boolean, got {}",
                    APPLY_KEY, other
                )))
            }
        };

        let services = match object.remove(SERVICES_KEY) {
            Some(Value::Array(items)) => OneOrMany::Many(items),
            Some(Value::Object(item)) => OneOrMany::One(Value::Object(item)),
            Some(other) => {
                return Err(RpcError::InvalidParams(format!(
                    "'{}' must be a list of services, got {}",
                    SERVICES_KEY, other
                )))
            }
            None if object.is_empty() => {
                return Err(RpcError::InvalidParams("no service given".to_string()))
            }
            None => OneOrMany::One(Value::Object(object)),
        };

        Ok(Self { services, apply })
    }
}

/// The parameter object of a call: `params[0]`, or `params` itself when a
/// caller sends a bare object. Missing params decode as an empty object.
pub fn first_param(params: Value) -> Result<Map<String, Value>, RpcError> {
    let first = match params {
        Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
        other => other,
    };

    match first {
        Value::Null => Ok(Map::new()),
        Value::Object(object) => Ok(object),
        other => Err(RpcError::InvalidParams(format!(
            "expected a parameter object, got {}",
            other
        ))),
    }
}

/// Port as sent by callers: a number, or a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceParams {
    #[serde(default)]
    name: String,
    port: Option<PortValue>,
    #[serde(default)]
    domain: String,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    default: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NameParams {
    #[serde(default)]
    name: String,
}

/// Decode one `Add` item into an entry. Field checks beyond the port are
/// left to the registry.
pub fn decode_service(item: Value) -> Result<ServiceEntry, RegistryError> {
    let name = item_name(&item);
    let params: ServiceParams = serde_json::from_value(item)
        .map_err(|e| RegistryError::invalid(&name, format!("malformed service: {}", e)))?;

    let port = match params.port {
        None => return Err(RegistryError::invalid(&params.name, "port is required")),
        Some(PortValue::Number(port)) => port,
        Some(PortValue::Text(text)) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| RegistryError::invalid(&params.name, format!("port '{}' is not an integer", text)))?,
    };
    let port = u16::try_from(port)
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| RegistryError::invalid(&params.name, "port must be within 1-65535"))?;

    Ok(ServiceEntry {
        name: params.name,
        port,
        domain: params.domain,
        host: params.host,
        default: params.default,
    })
}

/// Decode one `Remove` item into a service name.
pub fn decode_name(item: Value) -> Result<String, RegistryError> {
    let name = item_name(&item);
    let params: NameParams = serde_json::from_value(item)
        .map_err(|e| RegistryError::invalid(&name, format!("malformed service: {}", e)))?;
    if params.name.is_empty() {
        return Err(RegistryError::invalid("", "name must not be empty"));
    }
    Ok(params.name)
}

fn item_name(item: &Value) -> String {
    item.get("Name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Outcome for one service of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemReport {
    pub name: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What happened to the proxy after a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApplyReport {
    /// `Applied`, `Unchanged`, `Superseded`, `Staged`, `Skipped` or `Failed`.
    pub outcome: String,
    /// Registry version the outcome refers to.
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of `Add` and `Remove`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MutationReport {
    pub services: Vec<ItemReport>,
    pub apply: ApplyReport,
    /// Set when the registry changed in memory but could not be saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
}

/// Result of `Generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GenerateReport {
    pub outcome: String,
    pub version: u64,
    /// Number of services in the applied configuration.
    pub services: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_and_batch_forms_normalise() {
        let single = CallParams::decode(json!([{"Name": "a", "Port": 80, "Domain": ".a.com"}])).unwrap();
        assert_eq!(single.services.clone().into_vec().len(), 1);
        assert!(matches!(single.services, OneOrMany::One(_)));
        assert_eq!(single.apply, None);

        let batch = CallParams::decode(json!([{
            "Services": [{"Name": "a"}, {"Name": "b"}],
            "Apply": false
        }]))
        .unwrap();
        assert_eq!(batch.services.into_vec().len(), 2);
        assert_eq!(batch.apply, Some(false));
    }

    #[test]
    fn test_bad_params_are_rejected() {
        assert!(matches!(CallParams::decode(json!([])), Err(RpcError::InvalidParams(_))));
        assert!(matches!(CallParams::decode(json!([42])), Err(RpcError::InvalidParams(_))));
        assert!(matches!(
            CallParams::decode(json!([{"Services": "a"}])),
            Err(RpcError::InvalidParams(_))
        ));
        assert!(matches!(
            CallParams::decode(json!([{"Name": "a", "Apply": "yes"}])),
            Err(RpcError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_first_param_accepts_missing_and_bare_object() {
        assert!(first_param(Value::Null).unwrap().is_empty());
        assert!(first_param(json!([])).unwrap().is_empty());
        assert_eq!(first_param(json!({"Name": "a"})).unwrap()["Name"], "a");
    }

    #[test]
    fn test_port_as_string() {
        let entry = decode_service(json!({"Name": "myapp", "Port": "7777", "Domain": ".example.com"})).unwrap();
        assert_eq!(entry, ServiceEntry::new("myapp", 7777, ".example.com"));
    }

    #[test]
    fn test_port_out_of_range() {
        for port in [json!(0), json!(65536), json!(-1), json!("x")] {
            let err = decode_service(json!({"Name": "a", "Port": port, "Domain": "d"})).unwrap_err();
            assert_eq!(err.service(), "a");
            assert!(matches!(err, RegistryError::Validation { .. }));
        }
    }

    #[test]
    fn test_optional_fields() {
        let entry = decode_service(json!({
            "Name": "api", "Port": 9000, "Domain": "/api", "Host": "10.0.0.5", "Default": true
        }))
        .unwrap();
        assert_eq!(entry, ServiceEntry::new("api", 9000, "/api").with_host("10.0.0.5").as_default());
    }

    #[test]
    fn test_decode_name() {
        assert_eq!(decode_name(json!({"Name": "a"})).unwrap(), "a");
        assert!(decode_name(json!({})).is_err());
        assert!(decode_name(json!("a")).is_err());
    }

    #[test]
    fn test_report_field_names() {
        let report = MutationReport {
            services: vec![ItemReport {
                name: "a".into(),
                ok: true,
                error: None,
            }],
            apply: ApplyReport {
                outcome: "Staged".into(),
                version: 3,
                error: None,
            },
            persist_error: None,
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"Services": [{"Name": "a", "Ok": true}], "Apply": {"Outcome": "Staged", "Version": 3}})
        );
    }
}
