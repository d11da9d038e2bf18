//! Case-type table: roles, fields, subtypes and the reminder anchor per type.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use serde::Deserialize;

use crate::error::ConfigError;

/// Configuration for a single case type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseTypeConfig {
    pub name: String,
    pub roles: Vec<String>,
    pub fields: Vec<String>,
    pub subtypes: Vec<String>,
    pub subtype_fields: BTreeMap<String, Vec<String>>,
    pub date_time_fields: Vec<String>,
    pub anchor_field: Option<String>,
}

impl CaseTypeConfig {
    /// The subtype a fresh case of this type starts with.
    pub fn default_subtype(&self) -> Option<&str> {
        self.subtypes.first().map(String::as_str)
    }

    /// Fields that only exist while `subtype` is selected.
    pub fn subtype_extra_fields(&self, subtype: &str) -> &[String] {
        self.subtype_fields
            .get(subtype)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_date_time_field(&self, field: &str) -> bool {
        self.date_time_fields.iter().any(|f| f == field)
    }

    /// Base fields followed by the extras of `subtype`, in display order.
    pub fn fields_for_subtype(&self, subtype: &str) -> Vec<String> {
        let mut out = self.fields.clone();
        for extra in self.subtype_extra_fields(subtype) {
            if !out.contains(extra) {
                out.push(extra.clone());
            }
        }
        out
    }

    fn declares_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
            || self
                .subtype_fields
                .values()
                .any(|extras| extras.iter().any(|f| f == field))
    }
}

/// Key under which the time component of a date-time field is stored.
///
/// `"Hearing Date"` becomes `"HearingDateTime"`.
pub fn time_field_key(field: &str) -> String {
    let mut key: String = field.chars().filter(|c| !c.is_whitespace()).collect();
    key.push_str("Time");
    key
}

/// Whether a field key renders as a date input.
pub fn is_date_field(field: &str) -> bool {
    field.to_lowercase().contains("date")
}

/// Ordered set of case types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseTypeRegistry {
    types: Vec<CaseTypeConfig>,
}

#[derive(Debug, Deserialize)]
struct CaseTypeFile {
    case_types: Vec<RawCaseType>,
}

#[derive(Debug, Deserialize)]
struct RawCaseType {
    name: String,
    roles: Vec<String>,
    fields: Vec<String>,
    #[serde(default)]
    subtypes: Vec<String>,
    #[serde(default)]
    subtype_fields: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    date_time_fields: Vec<String>,
    #[serde(default)]
    anchor_field: Option<String>,
}

static BUNDLED: LazyLock<Result<CaseTypeRegistry, String>> = LazyLock::new(|| {
    CaseTypeRegistry::from_toml(include_str!("case_types.toml")).map_err(|e| e.to_string())
});

fn invalid(message: String) -> ConfigError {
    ConfigError::InvalidValue {
        key: "case_types".to_string(),
        message,
    }
}

impl CaseTypeRegistry {
    /// The table shipped with the crate.
    pub fn bundled() -> Result<&'static CaseTypeRegistry, ConfigError> {
        match &*BUNDLED {
            Ok(registry) => Ok(registry),
            Err(err) => Err(ConfigError::ParseError(err.clone())),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let parsed: CaseTypeFile = toml::from_str(raw)
            .map_err(|e| ConfigError::ParseError(format!("invalid case types TOML: {e}")))?;

        if parsed.case_types.is_empty() {
            return Err(invalid("at least one case type is required".to_string()));
        }

        let mut seen = HashSet::new();
        let mut types = Vec::with_capacity(parsed.case_types.len());
        for raw in parsed.case_types {
            let name = raw.name.trim().to_string();
            if name.is_empty() {
                return Err(invalid("case type name must not be empty".to_string()));
            }
            if !seen.insert(name.clone()) {
                return Err(invalid(format!("duplicate case type '{name}'")));
            }
            for subtype in raw.subtype_fields.keys() {
                if !raw.subtypes.contains(subtype) {
                    return Err(invalid(format!(
                        "'{name}' declares fields for unknown subtype '{subtype}'"
                    )));
                }
            }
            let config = CaseTypeConfig {
                name,
                roles: raw.roles,
                fields: raw.fields,
                subtypes: raw.subtypes,
                subtype_fields: raw.subtype_fields,
                date_time_fields: raw.date_time_fields,
                anchor_field: raw.anchor_field,
            };
            for field in &config.date_time_fields {
                if !config.declares_field(field) {
                    return Err(invalid(format!(
                        "'{}' lists undeclared date-time field '{field}'",
                        config.name
                    )));
                }
            }
            if let Some(anchor) = &config.anchor_field
                && !config.declares_field(anchor)
            {
                return Err(invalid(format!(
                    "'{}' anchors on undeclared field '{anchor}'",
                    config.name
                )));
            }
            types.push(config);
        }

        Ok(Self { types })
    }

    pub fn get(&self, name: &str) -> Option<&CaseTypeConfig> {
        self.types.iter().find(|t| t.name == name)
    }

    /// The type a new case starts with.
    pub fn first(&self) -> &CaseTypeConfig {
        // Non-empty is enforced by `from_toml`.
        &self.types[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &CaseTypeConfig> {
        self.types.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.types.iter().map(|t| t.name.as_str()).collect()
    }
}
