// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-verb request options, the patch descriptor and selectors.
//!
//! These are the typed shapes behind an application's opaque `option` bytes;
//! the center decodes the shape its verb expects and fails with a decode
//! error on mismatch.

use serde::{Deserialize, Serialize};

use crate::message::b64;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_token: Option<String>,
    /// Set when the options describe a watch rather than a one-shot list.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub watch: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_manager: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dry_run: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_manager: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dry_run: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_period_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub propagation_policy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_manager: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dry_run: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
}

/// Wire encoding of a patch kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchType {
    Json,
    Merge,
    Strategic,
}

/// Full description of one patch application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRequest {
    pub name: String,
    pub patch_type: PatchType,
    /// Raw patch document.
    #[serde(with = "b64")]
    pub data: Vec<u8>,
    #[serde(default)]
    pub options: PatchOptions,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subresources: Vec<String>,
}

/// Label/field selector pair scoping a listener.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Selector {
    /// Build a selector, normalizing empty strings to "unset".
    pub fn new(label: Option<&str>, field: Option<&str>) -> Self {
        Self {
            label: label.filter(|s| !s.is_empty()).map(str::to_string),
            field: field.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    /// Conjoin one more term onto the field selector.
    pub fn and_field(mut self, term: &str) -> Self {
        self.field = match self.field.take() {
            Some(existing) => Some(format!("{existing},{term}")),
            None => Some(term.to_string()),
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_options_skip_empty_fields() {
        let options = ListOptions::default();
        assert_eq!(serde_json::to_string(&options).unwrap(), "{}");
    }

    #[test]
    fn test_list_options_round_trip() {
        let options = ListOptions {
            label_selector: Some("app=web".to_string()),
            field_selector: Some("status.phase=Running".to_string()),
            resource_version: Some("12345".to_string()),
            limit: Some(500),
            continue_token: Some("tok".to_string()),
            watch: true,
        };
        let json = serde_json::to_string(&options).unwrap();
        assert!(json.contains("\"continue\":\"tok\""));
        let back: ListOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
    }

    #[test]
    fn test_patch_request_round_trip() {
        let request = PatchRequest {
            name: "web".to_string(),
            patch_type: PatchType::Merge,
            data: br#"{"spec":{"replicas":3}}"#.to_vec(),
            options: PatchOptions {
                field_manager: Some("edgeflux".to_string()),
                ..Default::default()
            },
            subresources: vec!["status".to_string()],
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"patch_type\":\"merge\""));
        let back: PatchRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_patch_type_strings() {
        assert_eq!(serde_json::to_string(&PatchType::Json).unwrap(), "\"json\"");
        assert_eq!(serde_json::to_string(&PatchType::Merge).unwrap(), "\"merge\"");
        assert_eq!(
            serde_json::to_string(&PatchType::Strategic).unwrap(),
            "\"strategic\""
        );
    }

    #[test]
    fn test_selector_normalizes_empty() {
        let selector = Selector::new(Some(""), Some(""));
        assert_eq!(selector, Selector::default());
        let selector = Selector::new(Some("app=web"), None);
        assert_eq!(selector.label.as_deref(), Some("app=web"));
        assert_eq!(selector.field, None);
    }

    #[test]
    fn test_selector_and_field_conjunction() {
        let selector = Selector::new(None, None).and_field("metadata.namespace=default");
        assert_eq!(selector.field.as_deref(), Some("metadata.namespace=default"));

        let selector = Selector::new(None, Some("status.phase=Running"))
            .and_field("metadata.namespace=default");
        assert_eq!(
            selector.field.as_deref(),
            Some("status.phase=Running,metadata.namespace=default")
        );
    }

    #[test]
    fn test_delete_options_round_trip() {
        let options = DeleteOptions {
            grace_period_seconds: Some(30),
            propagation_policy: Some("Foreground".to_string()),
        };
        let json = serde_json::to_string(&options).unwrap();
        let back: DeleteOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
    }
}
