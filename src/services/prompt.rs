//! Prompt text for the three generation operations.
//!
//! Everything here is plain string construction. Caller-supplied text is
//! substituted verbatim; nothing is escaped.

use crate::core::model::{RequestContext, ScriptVariation};
use crate::core::schema::SectionSchema;
use std::fmt::Write;

/// Number of variations a batch call asks for.
pub const BATCH_SIZE: usize = 10;

const COPYWRITER_ROLE: &str = "You are an expert direct-response copywriter who writes short-form video ad scripts.";

/// A system/user prompt pair for one model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

pub struct PromptComposer<'a> {
    context: &'a RequestContext,
    schema: &'a SectionSchema,
}

impl<'a> PromptComposer<'a> {
    pub fn new(context: &'a RequestContext, schema: &'a SectionSchema) -> Self {
        Self { context, schema }
    }

    pub fn batch_prompt(&self) -> Prompt {
        let mut p = self.render_context();

        p.push_str("## Task\n");
        let _ = writeln!(
            p,
            "Write exactly {} distinct ad script variations for this project. \
             Each variation must take a different angle, so no two variations share the same opening idea.",
            BATCH_SIZE
        );
        if self.schema.is_unstructured() {
            p.push_str(
                "Each variation is one complete, self-contained script delivered in a single section:\n",
            );
        } else {
            p.push_str("Every variation has the following sections, in this order:\n");
        }
        p.push_str(&self.numbered_sections());
        p.push('\n');

        p.push_str("## Coherence\n");
        p.push_str("- Treat each variation as one script read from start to finish.\n");
        if !self.schema.is_unstructured() {
            p.push_str("- Each section must flow from the previous one's tone and angle.\n");
            p.push_str("- Do not repeat the same claim or phrase across sections of one variation.\n");
        }
        p.push_str("- Stay consistent with the project, format and mechanisms above.\n\n");

        p.push_str("## Output format\n");
        let _ = writeln!(
            p,
            "Respond with ONLY a JSON array of exactly {} objects and nothing else. \
             Every object must use exactly these keys:",
            BATCH_SIZE
        );
        p.push_str("[\n");
        p.push_str(&self.object_template("  "));
        p.push_str(",\n  ...\n]\n");

        Prompt {
            system: json_system_prompt(),
            user: p,
        }
    }

    pub fn regenerate_section_prompt(&self, target: &str, neighbors: &ScriptVariation) -> Prompt {
        let mut p = self.render_context();

        if !self.schema.is_unstructured() {
            let _ = writeln!(
                p,
                "## Script structure\nThe script's sections, in order: {}\n",
                self.schema
            );
        }

        if !neighbors.is_empty() {
            p.push_str("## Surrounding sections\n");
            p.push_str("These sections stay exactly as they are:\n\n");
            for (section, text) in neighbors.iter() {
                let _ = writeln!(p, "[{}]\n{}\n", section, text);
            }
        }

        p.push_str("## Task\n");
        let _ = writeln!(
            p,
            "Write a new version of the \"{}\" section only. Do not rewrite any other section.",
            target
        );
        if !neighbors.is_empty() {
            p.push_str(
                "The new text must read naturally next to the surrounding sections above, \
                 matching their tone and angle so the script still flows as one piece.\n",
            );
        }
        p.push('\n');

        p.push_str("## Output format\n");
        let _ = writeln!(
            p,
            "Respond with ONLY the new text for the \"{}\" section as plain text. \
             Do not use JSON, quotes, labels or markdown.",
            target
        );

        Prompt {
            system: COPYWRITER_ROLE.to_string(),
            user: p,
        }
    }

    pub fn reprompt_prompt(&self, current: &ScriptVariation, feedback: &str) -> Prompt {
        let mut p = self.render_context();

        p.push_str("## Current script\n");
        for section in self.schema.iter() {
            let _ = writeln!(p, "{}: \"{}\"", section, current.get(section).unwrap_or(""));
        }
        p.push('\n');

        p.push_str("## Feedback\n");
        p.push_str(feedback.trim());
        p.push_str("\n\n");

        p.push_str("## Task\n");
        p.push_str(
            "Rewrite the whole script, applying the feedback. Regenerate every section together \
             as one cohesive unit rather than patching individual sections:\n",
        );
        p.push_str(&self.numbered_sections());
        if !self.schema.is_unstructured() {
            p.push_str("Each section must flow from the previous one's tone and angle.\n");
        }
        p.push('\n');

        p.push_str("## Output format\n");
        p.push_str("Respond with ONLY a JSON object with exactly these keys and nothing else:\n");
        p.push_str(&self.object_template(""));
        p.push('\n');

        Prompt {
            system: json_system_prompt(),
            user: p,
        }
    }

    /// Project, format, mechanisms and batch instructions, in that order.
    fn render_context(&self) -> String {
        let mut p = String::new();
        let project = &self.context.project;

        p.push_str("## Project\n");
        let _ = writeln!(p, "Name: {}", project.name);
        let _ = writeln!(p, "Description: {}", project.description);
        let _ = writeln!(p, "Target audience: {}", project.target_audience);
        if let Some(tone) = non_blank(project.tone.as_deref()) {
            let _ = writeln!(p, "Tone: {}", tone);
        }
        if !project.examples.is_empty() {
            p.push_str("\n### Example scripts\n");
            write_examples(&mut p, &project.examples);
        }
        p.push('\n');

        if let Some(format) = &self.context.format {
            p.push_str("## Format\n");
            let _ = writeln!(p, "Structure: {}", format.structure);
            let _ = writeln!(p, "Visual description: {}", format.visual_description);
            if !format.examples.is_empty() {
                p.push_str("\n### Format examples\n");
                write_examples(&mut p, &format.examples);
            }
            p.push('\n');
        }

        if !self.context.mechanisms.is_empty() {
            p.push_str("## Mechanisms\n");
            p.push_str("Apply the following copywriting mechanisms:\n\n");
            for mechanism in &self.context.mechanisms {
                let _ = writeln!(p, "### {}\n{}\n", mechanism.title, mechanism.content);
            }
        }

        if let Some(instructions) = non_blank(self.context.batch_instructions.as_deref()) {
            p.push_str("## Additional instructions\n");
            p.push_str(instructions);
            p.push_str("\n\n");
        }

        p
    }

    fn numbered_sections(&self) -> String {
        self.schema
            .iter()
            .enumerate()
            .map(|(i, section)| format!("{}. {}\n", i + 1, section))
            .collect()
    }

    /// One `"<section>": "text here"` line per schema section.
    fn object_template(&self, indent: &str) -> String {
        let fields: Vec<String> = self
            .schema
            .iter()
            .map(|section| format!("{}  {}: \"text here\"", indent, json_key(section)))
            .collect();
        format!("{indent}{{\n{}\n{indent}}}", fields.join(",\n"))
    }
}

fn json_system_prompt() -> String {
    format!("{} Respond with valid JSON only.", COPYWRITER_ROLE)
}

fn json_key(section: &str) -> String {
    serde_json::to_string(section).unwrap_or_else(|_| format!("\"{}\"", section))
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn write_examples(p: &mut String, examples: &[String]) {
    for (i, example) in examples.iter().enumerate() {
        let _ = writeln!(p, "Example {}:\n{}\n", i + 1, example.trim());
    }
}
