use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flattened key/value state. Ordered so that two cycles computing the same facts
/// produce the same iteration order.
pub type EntrySet = BTreeMap<String, String>;

/// An HTTP router as reported by a source instance's inspection API.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpRouter {
    pub entry_points: Vec<String>,
    pub middlewares: Vec<String>,
    pub service: String,
    pub rule: String,
    pub name: String,
    pub priority: i64,
    pub status: String,
    pub provider: String,
}

/// A TCP router as reported by a source instance's inspection API.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct TcpRouter {
    pub entry_points: Vec<String>,
    pub service: String,
    pub rule: String,
    pub name: String,
    pub priority: i64,
    pub status: String,
    pub provider: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Middleware {
    pub name: String,
    pub status: String,
    pub used_by: Vec<String>,
    pub provider: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Service {
    pub name: String,
    pub status: String,
    pub provider: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_http_router() {
        let body = r#"[{
            "entryPoints": ["websecure"],
            "middlewares": ["auth@file"],
            "service": "api@docker",
            "rule": "Host(`a.example.com`)",
            "priority": 42,
            "status": "enabled",
            "using": ["websecure"],
            "name": "api@docker",
            "provider": "docker"
        }]"#;

        let routers: Vec<HttpRouter> = serde_json::from_str(body).unwrap();
        assert_eq!(routers.len(), 1);
        assert_eq!(routers[0].entry_points, vec!["websecure"]);
        assert_eq!(routers[0].middlewares, vec!["auth@file"]);
        assert_eq!(routers[0].priority, 42);
    }

    #[test]
    fn test_missing_fields_default() {
        let routers: Vec<TcpRouter> =
            serde_json::from_str(r#"[{"name": "db@file", "service": "db"}]"#).unwrap();
        assert!(routers[0].entry_points.is_empty());
        assert_eq!(routers[0].rule, "");

        let middlewares: Vec<Middleware> =
            serde_json::from_str(r#"[{"name": "auth@file", "usedBy": ["api@docker"]}]"#).unwrap();
        assert_eq!(middlewares[0].used_by, vec!["api@docker"]);
    }
}
