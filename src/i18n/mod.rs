//! Bilingual display labels.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Language {
    En,
    #[default]
    Zh,
}

impl Language {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" | "en-us" | "en-gb" => Some(Self::En),
            "zh" | "zh-hk" | "zh-tw" | "zh-hant" => Some(Self::Zh),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
        }
    }
}

#[derive(Debug, Deserialize)]
struct LabelTable {
    en: HashMap<String, String>,
    zh: HashMap<String, String>,
}

static LABELS: LazyLock<Result<LabelTable, String>> = LazyLock::new(|| {
    toml::from_str(include_str!("labels.toml")).map_err(|e| format!("invalid labels TOML: {e}"))
});

/// Look up `key`; unknown keys render as themselves.
pub fn t(lang: Language, key: &str) -> String {
    let table = match &*LABELS {
        Ok(table) => table,
        Err(err) => {
            tracing::error!("{}", err);
            return key.to_string();
        }
    };
    let labels = match lang {
        Language::En => &table.en,
        Language::Zh => &table.zh,
    };
    labels.get(key).cloned().unwrap_or_else(|| key.to_string())
}

/// Look up `key` and substitute `{name}` placeholders.
pub fn t_with(lang: Language, key: &str, args: &[(&str, &str)]) -> String {
    let mut out = t(lang, key);
    for (name, value) in args {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}
