//! # Identity Newtypes
//!
//! Container identity is the triple `(type, namespace, identifier)`. Each
//! component is a distinct type that validates its format at construction,
//! so an assembled [`ContainerId`] is always well formed.
//!
//! ## External textual form
//!
//! ```text
//! 0711:{type}:{namespace}:{identifier}:{version}
//! ```
//!
//! where `{version}` is `latest` or `v{n}` (a bare `n` is accepted on input).
//! [`ContainerId`] renders without the version component; [`ContainerRef`]
//! renders with it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// Prefix of every textual container id.
pub const CONTAINER_ID_PREFIX: &str = "0711";

const NAMESPACE_MAX_LEN: usize = 64;
const IDENTIFIER_MAX_LEN: usize = 128;

// ---------------------------------------------------------------------------
// Container type
// ---------------------------------------------------------------------------

/// The closed set of container kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerType {
    /// Product passport data.
    Product,
    /// Marketing campaign.
    Campaign,
    /// Project record.
    Project,
    /// Agent memory.
    Memory,
    /// Knowledge base entry.
    Knowledge,
}

impl ContainerType {
    /// Every container type, in declaration order.
    pub const ALL: [ContainerType; 5] = [
        Self::Product,
        Self::Campaign,
        Self::Project,
        Self::Memory,
        Self::Knowledge,
    ];

    /// Lowercase name used in ids and on-disk paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Campaign => "campaign",
            Self::Project => "project",
            Self::Memory => "memory",
            Self::Knowledge => "knowledge",
        }
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidContainerType(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Namespace and identifier (validated strings)
// ---------------------------------------------------------------------------

/// A namespace name: `^[a-z0-9][a-z0-9-]{0,63}$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// Create a namespace, validating its format.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        let bytes = s.as_bytes();
        let valid = !bytes.is_empty()
            && bytes.len() <= NAMESPACE_MAX_LEN
            && matches!(bytes[0], b'a'..=b'z' | b'0'..=b'9')
            && bytes
                .iter()
                .all(|&b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'-'));
        if !valid {
            return Err(ValidationError::InvalidNamespace(s));
        }
        Ok(Self(s))
    }

    /// Access the namespace string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Namespace {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Namespace {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A container identifier within a namespace:
/// `^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$`, never containing `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Create an identifier, validating its format.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        let bytes = s.as_bytes();
        let valid = !bytes.is_empty()
            && bytes.len() <= IDENTIFIER_MAX_LEN
            && bytes[0].is_ascii_alphanumeric()
            && bytes
                .iter()
                .all(|&b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
            && !s.contains("..");
        if !valid {
            return Err(ValidationError::InvalidIdentifier(s));
        }
        Ok(Self(s))
    }

    /// Access the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identifier {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// Composite identities
// ---------------------------------------------------------------------------

/// The scoping unit of one version history: `(type, namespace)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespaceKey {
    /// Container type.
    #[serde(rename = "type")]
    pub container_type: ContainerType,
    /// Namespace name.
    pub namespace: Namespace,
}

impl NamespaceKey {
    /// Build a key from validated parts.
    pub fn new(container_type: ContainerType, namespace: Namespace) -> Self {
        Self {
            container_type,
            namespace,
        }
    }
}

impl fmt::Display for NamespaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container_type, self.namespace)
    }
}

/// Full identity of a container: `(type, namespace, identifier)`.
///
/// Serializes as its textual form `0711:{type}:{namespace}:{identifier}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId {
    /// Container type.
    pub container_type: ContainerType,
    /// Namespace the container lives in.
    pub namespace: Namespace,
    /// Identifier within the namespace.
    pub identifier: Identifier,
}

impl ContainerId {
    /// Build an id from validated parts.
    pub fn new(container_type: ContainerType, namespace: Namespace, identifier: Identifier) -> Self {
        Self {
            container_type,
            namespace,
            identifier,
        }
    }

    /// The namespace this container's history is scoped to.
    pub fn namespace_key(&self) -> NamespaceKey {
        NamespaceKey::new(self.container_type, self.namespace.clone())
    }

    /// Attach a version to produce a [`ContainerRef`].
    pub fn at(&self, version: VersionSpec) -> ContainerRef {
        ContainerRef {
            id: self.clone(),
            version,
        }
    }

    /// Parse `0711:{type}:{namespace}:{identifier}`.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 4 {
            return Err(ValidationError::InvalidContainerId(s.to_string()));
        }
        Self::from_parts(s, &parts)
    }

    fn from_parts(original: &str, parts: &[&str]) -> Result<Self, ValidationError> {
        if parts[0] != CONTAINER_ID_PREFIX {
            return Err(ValidationError::InvalidContainerId(original.to_string()));
        }
        Ok(Self {
            container_type: parts[1].parse()?,
            namespace: Namespace::new(parts[2])?,
            identifier: Identifier::new(parts[3])?,
        })
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{CONTAINER_ID_PREFIX}:{}:{}:{}",
            self.container_type, self.namespace, self.identifier
        )
    }
}

impl FromStr for ContainerId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ContainerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContainerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Which version of a container a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VersionSpec {
    /// Whatever the head commit holds.
    Latest,
    /// A specific version number, starting at 1.
    Exact(u64),
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Exact(n) => write!(f, "v{n}"),
        }
    }
}

impl FromStr for VersionSpec {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "latest" {
            return Ok(Self::Latest);
        }
        let digits = s.strip_prefix('v').unwrap_or(s);
        match digits.parse::<u64>() {
            Ok(n) if n >= 1 && !digits.starts_with('+') => Ok(Self::Exact(n)),
            _ => Err(ValidationError::InvalidVersion(s.to_string())),
        }
    }
}

/// A container id pinned to a version:
/// `0711:{type}:{namespace}:{identifier}:{version}`.
///
/// Parsing accepts the four-part form and treats it as `latest`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerRef {
    /// The container.
    pub id: ContainerId,
    /// The version referenced.
    pub version: VersionSpec,
}

impl ContainerRef {
    /// Parse the textual form.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.len() {
            4 => Ok(Self {
                id: ContainerId::from_parts(s, &parts)?,
                version: VersionSpec::Latest,
            }),
            5 => Ok(Self {
                id: ContainerId::from_parts(s, &parts[..4])?,
                version: parts[4].parse()?,
            }),
            _ => Err(ValidationError::InvalidContainerId(s.to_string())),
        }
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.version)
    }
}

impl FromStr for ContainerRef {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ContainerRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContainerRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_accepts_valid() {
        let longest = "a".repeat(64);
        for ok in ["acme", "a", "0711", "acme-gmbh", longest.as_str()] {
            assert!(Namespace::new(ok).is_ok(), "{ok}");
        }
    }

    #[test]
    fn namespace_rejects_invalid() {
        let too_long = "a".repeat(65);
        for bad in ["", "-acme", "Acme", "acme_gmbh", "acme.gmbh", too_long.as_str()] {
            assert!(Namespace::new(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn identifier_accepts_valid() {
        let longest = "A".repeat(128);
        for ok in ["SKU-1", "a", "drill.v2", "x_y-z.1", longest.as_str()] {
            assert!(Identifier::new(ok).is_ok(), "{ok}");
        }
    }

    #[test]
    fn identifier_rejects_invalid() {
        let too_long = "A".repeat(129);
        for bad in ["", ".hidden", "-x", "a..b", "a/b", "a b", too_long.as_str()] {
            assert!(Identifier::new(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn container_type_roundtrip() {
        for t in ContainerType::ALL {
            assert_eq!(t.as_str().parse::<ContainerType>().unwrap(), t);
        }
        assert!("widget".parse::<ContainerType>().is_err());
    }

    #[test]
    fn container_id_display_and_parse() {
        let id = ContainerId::parse("0711:product:acme:drill-500").unwrap();
        assert_eq!(id.container_type, ContainerType::Product);
        assert_eq!(id.namespace.as_str(), "acme");
        assert_eq!(id.identifier.as_str(), "drill-500");
        assert_eq!(id.to_string(), "0711:product:acme:drill-500");
    }

    #[test]
    fn container_id_rejects_wrong_prefix_and_arity() {
        assert!(ContainerId::parse("0712:product:acme:x").is_err());
        assert!(ContainerId::parse("0711:product:acme").is_err());
        assert!(ContainerId::parse("0711:product:acme:x:v1").is_err());
        assert!(ContainerId::parse("0711:gadget:acme:x").is_err());
    }

    #[test]
    fn container_ref_versions() {
        let r = ContainerRef::parse("0711:memory:agents:session.42:v3").unwrap();
        assert_eq!(r.version, VersionSpec::Exact(3));
        assert_eq!(r.to_string(), "0711:memory:agents:session.42:v3");

        let bare = ContainerRef::parse("0711:memory:agents:session.42:7").unwrap();
        assert_eq!(bare.version, VersionSpec::Exact(7));

        let latest = ContainerRef::parse("0711:memory:agents:session.42").unwrap();
        assert_eq!(latest.version, VersionSpec::Latest);
        assert_eq!(latest.to_string(), "0711:memory:agents:session.42:latest");
    }

    #[test]
    fn version_spec_rejects_zero_and_garbage() {
        for bad in ["v0", "0", "vx", "", "v", "-1", "+3"] {
            assert!(bad.parse::<VersionSpec>().is_err(), "{bad}");
        }
    }

    #[test]
    fn serde_uses_textual_form() {
        let r = ContainerRef::parse("0711:product:acme:sku-1:v2").unwrap();
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, "\"0711:product:acme:sku-1:v2\"");
        let back: ContainerRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);

        let bad: Result<Namespace, _> = serde_json::from_str("\"Not_Valid\"");
        assert!(bad.is_err());
    }

    #[test]
    fn namespace_key_serializes_type_field() {
        let key = NamespaceKey::new(ContainerType::Campaign, Namespace::new("acme").unwrap());
        let v = serde_json::to_value(&key).unwrap();
        assert_eq!(v, serde_json::json!({"type": "campaign", "namespace": "acme"}));
        assert_eq!(key.to_string(), "campaign/acme");
    }
}
