//! Builder configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Options controlling module assembly and dispatch splitting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuilderOptions {
    /// Device limit on workgroups per dispatch dimension.
    pub max_workgroups_per_dimension: u32,
    /// Run naga over assembled modules that carry no `enable` directives.
    pub validate: bool,
    /// Indentation used for flow code inside entry points.
    pub indent: String,
    /// Bind group used for storage and uniform bindings.
    pub storage_group: u32,
    /// Directive requested by `enable_subgroups`.
    pub subgroup_directive: String,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            max_workgroups_per_dimension: 65535,
            validate: false,
            indent: "\t".to_string(),
            storage_group: 0,
            subgroup_directive: "subgroups".to_string(),
        }
    }
}

impl BuilderOptions {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("failed to parse builder options json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let options = BuilderOptions::from_json_str(r#"{ "validate": true }"#).unwrap();
        assert!(options.validate);
        assert_eq!(options.max_workgroups_per_dimension, 65535);
        assert_eq!(options.indent, "\t");
        assert_eq!(options.subgroup_directive, "subgroups");
    }

    #[test]
    fn camel_case_keys() {
        let options = BuilderOptions::from_json_str(
            r#"{ "maxWorkgroupsPerDimension": 256, "storageGroup": 1 }"#,
        )
        .unwrap();
        assert_eq!(options.max_workgroups_per_dimension, 256);
        assert_eq!(options.storage_group, 1);
    }

    #[test]
    fn malformed_json_reports_context() {
        let err = BuilderOptions::from_json_str("{").unwrap_err();
        assert!(format!("{err:#}").contains("builder options"));
    }
}
