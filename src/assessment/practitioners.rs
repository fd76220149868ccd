use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Practitioner {
    pub code: String,
    pub email: String,
    pub label: String,
}

/// Static practitioner code → contact mapping, loaded once at startup.
#[derive(Debug, Default)]
pub struct PractitionerRegistry {
    by_code: HashMap<String, Practitioner>,
}

impl PractitionerRegistry {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading practitioner registry {}", path.display()))?;
        let entries: Vec<Practitioner> = serde_json::from_str(&data)
            .with_context(|| format!("parsing practitioner registry {}", path.display()))?;
        let registry = Self::from_entries(entries)?;

        tracing::info!(
            practitioners = registry.len(),
            path = %path.display(),
            "Practitioner registry loaded"
        );

        Ok(registry)
    }

    pub fn from_entries(entries: Vec<Practitioner>) -> anyhow::Result<Self> {
        let mut by_code = HashMap::with_capacity(entries.len());
        for entry in entries {
            let key = normalize_code(&entry.code);
            if key.is_empty() {
                anyhow::bail!("practitioner {:?} has an empty code", entry.label);
            }
            if by_code.insert(key, entry.clone()).is_some() {
                anyhow::bail!("duplicate practitioner code {:?}", entry.code);
            }
        }
        Ok(Self { by_code })
    }

    /// Codes compare case-insensitively and ignore surrounding whitespace.
    pub fn lookup(&self, code: &str) -> Option<&Practitioner> {
        self.by_code.get(&normalize_code(code))
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_lowercase()
}
