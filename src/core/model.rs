use crate::core::schema::SectionSchema;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContext {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub tone: Option<String>,
    /// Example scripts, in the order the user supplied them.
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatContext {
    #[serde(default)]
    pub structure: String,
    #[serde(default)]
    pub visual_description: String,
    #[serde(default)]
    pub examples: Vec<String>,
    /// Serialized section list as stored with the format, e.g. `["hook","body"]`.
    #[serde(default)]
    pub sections: Option<String>,
}

/// A named copywriting principle, rendered verbatim into prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mechanism {
    pub title: String,
    pub content: String,
}

impl Mechanism {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Context shared by every operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub project: ProjectContext,
    #[serde(default)]
    pub format: Option<FormatContext>,
    #[serde(default)]
    pub mechanisms: Vec<Mechanism>,
    #[serde(default)]
    pub batch_instructions: Option<String>,
}

impl RequestContext {
    pub fn new(project: ProjectContext) -> Self {
        Self {
            project,
            ..Default::default()
        }
    }

    pub fn schema(&self) -> SectionSchema {
        SectionSchema::for_format(self.format.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGenerateRequest {
    #[serde(flatten)]
    pub context: RequestContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateSectionRequest {
    #[serde(flatten)]
    pub context: RequestContext,
    pub target_section: String,
    #[serde(default)]
    pub neighbor_content: ScriptVariation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepromptRequest {
    #[serde(flatten)]
    pub context: RequestContext,
    pub current_variation: ScriptVariation,
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum GenerationRequest {
    BatchGenerate(BatchGenerateRequest),
    RegenerateSection(RegenerateSectionRequest),
    Reprompt(RepromptRequest),
}

impl GenerationRequest {
    pub fn context(&self) -> &RequestContext {
        match self {
            Self::BatchGenerate(r) => &r.context,
            Self::RegenerateSection(r) => &r.context,
            Self::Reprompt(r) => &r.context,
        }
    }

    pub fn operation_name(&self) -> &'static str {
        match self {
            Self::BatchGenerate(_) => "batch_generate",
            Self::RegenerateSection(_) => "regenerate_section",
            Self::Reprompt(_) => "reprompt",
        }
    }
}

/// Ordered mapping from section name to text.
///
/// A full variation holds exactly the active schema's keys. The same
/// container carries the partial neighbor content of a section regeneration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptVariation {
    entries: Vec<(String, String)>,
}

impl ScriptVariation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a variation holding exactly the schema's sections, in order.
    pub fn from_schema(schema: &SectionSchema, mut text_for: impl FnMut(&str) -> String) -> Self {
        Self {
            entries: schema
                .iter()
                .map(|section| (section.to_string(), text_for(section)))
                .collect(),
        }
    }

    pub fn get(&self, section: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == section)
            .map(|(_, text)| text.as_str())
    }

    /// Sets a section's text in place, appending it when absent.
    pub fn insert(&mut self, section: impl Into<String>, text: impl Into<String>) -> Option<String> {
        let section = section.into();
        let text = text.into();
        match self.entries.iter_mut().find(|(name, _)| *name == section) {
            Some((_, existing)) => Some(std::mem::replace(existing, text)),
            None => {
                self.entries.push((section, text));
                None
            }
        }
    }

    /// Copy with one section replaced; every other section is left as is.
    pub fn with_section(&self, section: &str, text: impl Into<String>) -> Self {
        let mut spliced = self.clone();
        spliced.insert(section, text);
        spliced
    }

    /// The sections directly before and after `target` in schema order,
    /// as far as this variation holds them.
    pub fn neighbors_of(&self, schema: &SectionSchema, target: &str) -> Self {
        let mut neighbors = Self::new();
        let Some(pos) = schema.position(target) else {
            return neighbors;
        };
        let sections = schema.sections();
        let before = pos.checked_sub(1).map(|i| sections[i].as_str());
        let after = sections.get(pos + 1).map(|s| s.as_str());
        for name in before.into_iter().chain(after) {
            if let Some(text) = self.get(name) {
                neighbors.insert(name, text);
            }
        }
        neighbors
    }

    /// True when the key set equals the schema's sections.
    pub fn conforms_to(&self, schema: &SectionSchema) -> bool {
        self.entries.len() == schema.len() && schema.iter().all(|s| self.get(s).is_some())
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ScriptVariation {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut variation = Self::new();
        for (k, v) in iter {
            variation.insert(k, v);
        }
        variation
    }
}

impl Serialize for ScriptVariation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, text) in &self.entries {
            map.serialize_entry(name, text)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ScriptVariation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VariationVisitor;

        impl<'de> Visitor<'de> for VariationVisitor {
            type Value = ScriptVariation;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of section names to text")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut variation = ScriptVariation::new();
                while let Some((name, text)) = access.next_entry::<String, String>()? {
                    variation.insert(name, text);
                }
                Ok(variation)
            }
        }

        deserializer.deserialize_map(VariationVisitor)
    }
}

/// The variations produced by one batch call, in the model's order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedBatch {
    schema: SectionSchema,
    variations: Vec<ScriptVariation>,
}

impl ParsedBatch {
    pub(crate) fn new(schema: SectionSchema, variations: Vec<ScriptVariation>) -> Self {
        Self { schema, variations }
    }

    pub fn schema(&self) -> &SectionSchema {
        &self.schema
    }

    pub fn variations(&self) -> &[ScriptVariation] {
        &self.variations
    }

    pub fn len(&self) -> usize {
        self.variations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variations.is_empty()
    }

    pub fn into_variations(self) -> Vec<ScriptVariation> {
        self.variations
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Batch(ParsedBatch),
    Section { section: String, text: String },
    Variation { variation: ScriptVariation },
}
