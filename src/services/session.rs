use crate::core::error::GenerationError;
use crate::core::model::{ParsedBatch, RequestContext, ScriptVariation};
use crate::services::regeneration::RegenerationController;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Select, Text};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ACTION_REGENERATE: &str = "Regenerate one section";
const ACTION_REPROMPT: &str = "Rewrite everything with feedback";
const ACTION_SAVE: &str = "Save and exit";
const ACTION_DISCARD: &str = "Exit without saving";

/// Interactive refinement of one variation picked from a batch.
///
/// Returns the path the variation was saved to, if the user saved it.
pub async fn run_session(
    controller: &RegenerationController,
    context: &RequestContext,
    batch: ParsedBatch,
    output_folder: &str,
) -> Result<Option<PathBuf>> {
    let schema = batch.schema().clone();
    let mut variations = batch.into_variations();
    if variations.is_empty() {
        return Ok(None);
    }

    let options: Vec<String> = variations
        .iter()
        .enumerate()
        .map(|(i, v)| format!("{:>2}. {}", i + 1, preview(v)))
        .collect();
    let choice = Select::new("Pick a variation to refine:", options).raw_prompt()?;
    let mut held = variations.swap_remove(choice.index);

    loop {
        print_variation(&held);

        let actions = vec![ACTION_REGENERATE, ACTION_REPROMPT, ACTION_SAVE, ACTION_DISCARD];
        match Select::new("What next?", actions).prompt()? {
            ACTION_REGENERATE => {
                let sections: Vec<String> = schema.sections().to_vec();
                let target = Select::new("Section to regenerate:", sections).prompt()?;
                let neighbors = held.neighbors_of(&schema, &target);

                let pb = spinner(&format!("Regenerating {}...", target))?;
                let result = controller.regenerate_section(context, &target, &neighbors).await;
                pb.finish_and_clear();

                match result {
                    Ok(text) => held = held.with_section(&target, text),
                    Err(e) => report_failure("Regeneration", &e),
                }
            }
            ACTION_REPROMPT => {
                let feedback = Text::new("Feedback:").prompt()?;
                if feedback.trim().is_empty() {
                    println!("No feedback given, keeping the current script.");
                    continue;
                }

                let pb = spinner("Rewriting script...")?;
                let result = controller.reprompt(context, &held, &feedback).await;
                pb.finish_and_clear();

                match result {
                    Ok(variation) => held = variation,
                    Err(e) => report_failure("Rewrite", &e),
                }
            }
            ACTION_SAVE => {
                let path = save_variation(&held, output_folder, &context.project.name).await?;
                println!("Saved to {}", path.display());
                return Ok(Some(path));
            }
            _ => return Ok(None),
        }
    }
}

pub async fn save_variation(variation: &ScriptVariation, output_folder: &str, project_name: &str) -> Result<PathBuf> {
    let path = Path::new(output_folder).join(format!("{}.json", slug(project_name)));
    tokio::fs::create_dir_all(output_folder).await?;
    let content = serde_json::to_string_pretty(variation)?;
    tokio::fs::write(&path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn report_failure(action: &str, err: &GenerationError) {
    println!("{}", failure_message(action, err));
}

fn failure_message(action: &str, err: &GenerationError) -> String {
    if err.is_rate_limited() {
        format!("{} was rate limited by the provider. Wait a moment and try again.", action)
    } else {
        format!("{} failed: {}. Try again.", action, err)
    }
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn print_variation(variation: &ScriptVariation) {
    println!();
    for (section, text) in variation.iter() {
        println!("[{}]\n{}\n", section, text);
    }
}

fn preview(variation: &ScriptVariation) -> String {
    let first = variation.iter().next().map(|(_, text)| text).unwrap_or("");
    let line = first.lines().next().unwrap_or("");
    if line.chars().count() > 70 {
        format!("{}...", line.chars().take(70).collect::<String>())
    } else {
        line.to_string()
    }
}

fn slug(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "script".to_string()
    } else {
        slug
    }
}
