// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Schema-less resource bodies.
//!
//! The proxy never interprets resource content beyond standard metadata, so
//! bodies travel as raw JSON values with typed accessors over the common
//! fields.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// One structured resource of arbitrary kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DynamicObject(pub Value);

impl DynamicObject {
    /// Build a minimal object with apiVersion/kind and named metadata.
    pub fn new(api_version: &str, kind: &str, name: &str, namespace: Option<&str>) -> Self {
        let mut metadata = Map::new();
        metadata.insert("name".to_string(), Value::String(name.to_string()));
        if let Some(ns) = namespace {
            metadata.insert("namespace".to_string(), Value::String(ns.to_string()));
        }
        Self(json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": Value::Object(metadata),
        }))
    }

    fn str_field(&self, pointer: &str) -> Option<&str> {
        self.0.pointer(pointer).and_then(Value::as_str)
    }

    pub fn api_version(&self) -> Option<&str> {
        self.str_field("/apiVersion")
    }

    pub fn kind(&self) -> Option<&str> {
        self.str_field("/kind")
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field("/metadata/name")
    }

    pub fn namespace(&self) -> Option<&str> {
        self.str_field("/metadata/namespace")
    }

    /// Mutable access to the metadata map, if the object has one.
    pub fn metadata_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.0
            .get_mut("metadata")
            .and_then(Value::as_object_mut)
    }
}

/// A list of structured resources, as returned by a list call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default)]
    pub items: Vec<DynamicObject>,
}
