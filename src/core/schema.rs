use crate::core::error::SchemaError;
use crate::core::model::FormatContext;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub const DEFAULT_SECTIONS: [&str; 2] = ["hook", "body"];
pub const UNSTRUCTURED_SECTION: &str = "script";

/// Ordered, unique, non-empty section names a script must have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct SectionSchema(Vec<String>);

impl SectionSchema {
    pub fn new<I, S>(names: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut sections = Vec::new();
        for (i, name) in names.into_iter().enumerate() {
            let name: String = name.into();
            if name.trim().is_empty() {
                return Err(SchemaError::BlankName(i));
            }
            if !seen.insert(name.clone()) {
                return Err(SchemaError::DuplicateName(name));
            }
            sections.push(name);
        }
        if sections.is_empty() {
            return Err(SchemaError::Empty);
        }
        Ok(Self(sections))
    }

    /// Single implicit `script` section used when no format is supplied.
    pub fn unstructured() -> Self {
        Self(vec![UNSTRUCTURED_SECTION.to_string()])
    }

    /// Resolves a format's serialized section list.
    ///
    /// Never fails: anything that is not a JSON list of strings, or that
    /// leaves no usable names, yields `["hook", "body"]`. Names are trimmed
    /// and blank or repeated names are dropped.
    pub fn resolve(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };

        let names: Vec<String> = match serde_json::from_str(raw) {
            Ok(names) => names,
            Err(e) => {
                debug!("Unparseable section list {:?} ({}), using default schema", raw, e);
                return Self::default();
            }
        };

        let mut seen = HashSet::new();
        let sections: Vec<String> = names
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty() && seen.insert(n.clone()))
            .collect();

        if sections.is_empty() {
            debug!("Empty section list, using default schema");
            return Self::default();
        }
        Self(sections)
    }

    /// Schema for a request: the format's sections, or unstructured mode
    /// when there is no format at all.
    pub fn for_format(format: Option<&FormatContext>) -> Self {
        match format {
            Some(format) => Self::resolve(format.sections.as_deref()),
            None => Self::unstructured(),
        }
    }

    pub fn sections(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|s| s == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|s| s == name)
    }

    pub fn is_unstructured(&self) -> bool {
        self.0.len() == 1 && self.0[0] == UNSTRUCTURED_SECTION
    }
}

impl Default for SectionSchema {
    fn default() -> Self {
        Self(DEFAULT_SECTIONS.iter().map(|s| s.to_string()).collect())
    }
}

impl TryFrom<Vec<String>> for SectionSchema {
    type Error = SchemaError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(names)
    }
}

impl From<SectionSchema> for Vec<String> {
    fn from(schema: SectionSchema) -> Self {
        schema.0
    }
}

impl fmt::Display for SectionSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}
