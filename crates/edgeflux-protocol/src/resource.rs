// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource addressing: group/version/resource coordinates, the canonical
//! resource key and the verb set.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Placeholder for an empty key segment (core group, cluster scope,
/// collection request).
const EMPTY_SEGMENT: &str = "-";

/// API coordinates of a resource kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionResource {
    /// API group; empty for the core group.
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GroupVersionResource {
    pub fn new(group: &str, version: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
        }
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.version, self.resource)
    }
}

/// Canonical address of one resource or collection:
/// `group/version/resource/namespace/name` with `-` marking empty segments.
///
/// The string form is what travels on the wire and what the fingerprint
/// hashes; [`ResourceKey::parse`] and [`fmt::Display`] round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ResourceKey {
    pub gvr: GroupVersionResource,
    pub namespace: Option<String>,
    pub name: Option<String>,
}

impl ResourceKey {
    pub fn new(
        gvr: GroupVersionResource,
        namespace: Option<&str>,
        name: Option<&str>,
    ) -> Self {
        Self {
            gvr,
            namespace: namespace.filter(|s| !s.is_empty()).map(str::to_string),
            name: name.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    /// Parse the canonical five-segment string form.
    pub fn parse(key: &str) -> Result<Self, ProtocolError> {
        let segments: Vec<&str> = key.split('/').collect();
        if segments.len() != 5 {
            return Err(ProtocolError::InvalidKey(key.to_string()));
        }
        let decode = |segment: &str| -> Option<String> {
            if segment == EMPTY_SEGMENT || segment.is_empty() {
                None
            } else {
                Some(segment.to_string())
            }
        };
        let group = decode(segments[0]).unwrap_or_default();
        let version = decode(segments[1]).ok_or_else(|| ProtocolError::InvalidKey(key.to_string()))?;
        let resource =
            decode(segments[2]).ok_or_else(|| ProtocolError::InvalidKey(key.to_string()))?;
        Ok(Self {
            gvr: GroupVersionResource {
                group,
                version,
                resource,
            },
            namespace: decode(segments[3]),
            name: decode(segments[4]),
        })
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn encode(segment: Option<&str>) -> &str {
            match segment {
                Some(s) if !s.is_empty() => s,
                _ => EMPTY_SEGMENT,
            }
        }
        write!(
            f,
            "{}/{}/{}/{}/{}",
            encode(Some(&self.gvr.group)),
            self.gvr.version,
            self.gvr.resource,
            encode(self.namespace.as_deref()),
            encode(self.name.as_deref()),
        )
    }
}

impl FromStr for ResourceKey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<ResourceKey> for String {
    fn from(key: ResourceKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for ResourceKey {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

/// Operation an application performs against the resource API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Get,
    List,
    Watch,
    Create,
    Delete,
    Update,
    UpdateStatus,
    Patch,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::List => "list",
            Verb::Watch => "watch",
            Verb::Create => "create",
            Verb::Delete => "delete",
            Verb::Update => "update",
            Verb::UpdateStatus => "updatestatus",
            Verb::Patch => "patch",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get" => Ok(Verb::Get),
            "list" => Ok(Verb::List),
            "watch" => Ok(Verb::Watch),
            "create" => Ok(Verb::Create),
            "delete" => Ok(Verb::Delete),
            "update" => Ok(Verb::Update),
            "updatestatus" => Ok(Verb::UpdateStatus),
            "patch" => Ok(Verb::Patch),
            other => Err(ProtocolError::InvalidVerb(other.to_string())),
        }
    }
}
