//! Key schema for the flattened routing state.
//!
//! Every key lives under [`ROOT_KEY`] and has the shape
//! `traefik/<protocol>/<kind>/<name>/<field...>`. Keys are pure functions of their
//! inputs, so the same fact always maps to the same byte string.

use std::fmt;

pub const ROOT_KEY: &str = "traefik";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Tcp,
}

impl Protocol {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Tcp => "tcp",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Routers,
    Services,
}

impl Kind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Kind::Routers => "routers",
            Kind::Services => "services",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Rule,
    Service,
    EntryPoint(usize),
    Middleware(usize),
    ServerUrl(usize),
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Rule => write!(f, "rule"),
            Field::Service => write!(f, "service"),
            Field::EntryPoint(i) => write!(f, "entrypoints/{i}"),
            Field::Middleware(i) => write!(f, "middlewares/{i}"),
            Field::ServerUrl(i) => write!(f, "loadbalancer/servers/{i}/url"),
        }
    }
}

/// `traefik/` - every key this service writes starts with this.
pub fn namespace_prefix() -> String {
    format!("{ROOT_KEY}/")
}

pub fn key(protocol: Protocol, kind: Kind, name: &str, field: Field) -> String {
    format!(
        "{ROOT_KEY}/{}/{}/{name}/{field}",
        protocol.as_str(),
        kind.as_str()
    )
}

pub fn router_key(protocol: Protocol, name: &str, field: Field) -> String {
    key(protocol, Kind::Routers, name, field)
}

/// Key of the default destination service published for every instance.
pub fn anchor_key(protocol: Protocol, instance: &str) -> String {
    key(protocol, Kind::Services, instance, Field::ServerUrl(0))
}

/// Prefix shared by every router key of `protocol`.
pub fn routers_prefix(protocol: Protocol) -> String {
    format!(
        "{ROOT_KEY}/{}/{}/",
        protocol.as_str(),
        Kind::Routers.as_str()
    )
}

/// A router or service name as reported by a source, with or without a `@provider` suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouterName<'a> {
    Provided { name: &'a str, provider: &'a str },
    Plain(&'a str),
}

impl<'a> RouterName<'a> {
    pub fn parse(raw: &'a str) -> Self {
        match raw.split_once('@') {
            Some((name, provider)) => RouterName::Provided { name, provider },
            None => RouterName::Plain(raw),
        }
    }

    /// Name used in keys. Provider-qualified names are re-qualified with the instance
    /// name so that the same router on two instances does not collide.
    pub fn local_name(&self, instance: &str) -> String {
        match self {
            RouterName::Provided { name, .. } => format!("{name}_{instance}"),
            RouterName::Plain(name) => (*name).to_string(),
        }
    }
}

/// Per-instance override layered over a global default.
pub fn resolve(override_value: Option<bool>, default: bool) -> bool {
    override_value.unwrap_or(default)
}
