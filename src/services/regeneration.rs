use crate::core::config::{Config, GenerationConfig};
use crate::core::error::{GenerationError, ParseFailure};
use crate::core::model::{
    GenerationOutcome, GenerationRequest, ParsedBatch, RequestContext, ScriptVariation,
};
use crate::core::schema::SectionSchema;
use crate::services::llm::{create_client, GenerationClient, ModelCall};
use crate::services::prompt::{Prompt, PromptComposer, BATCH_SIZE};
use crate::services::script::{self, ExpectedShape, ParsedResponse};
use log::{error, info, warn};

/// Runs the three generation operations against an injected client.
///
/// Holds no per-call state: each operation composes one prompt, makes
/// exactly one model call and parses the reply.
#[derive(Debug)]
pub struct RegenerationController {
    client: Box<dyn GenerationClient>,
    model_id: String,
    budgets: GenerationConfig,
}

impl RegenerationController {
    pub fn new(
        client: Box<dyn GenerationClient>,
        model_id: impl Into<String>,
        budgets: GenerationConfig,
    ) -> Self {
        Self {
            client,
            model_id: model_id.into(),
            budgets,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = create_client(&config.llm)?;
        Ok(Self::new(client, &config.llm.model, config.generation.clone()))
    }

    pub async fn execute(&self, request: &GenerationRequest) -> Result<GenerationOutcome, GenerationError> {
        match request {
            GenerationRequest::BatchGenerate(r) => {
                let batch = self.batch_generate(&r.context).await?;
                Ok(GenerationOutcome::Batch(batch))
            }
            GenerationRequest::RegenerateSection(r) => {
                let text = self
                    .regenerate_section(&r.context, &r.target_section, &r.neighbor_content)
                    .await?;
                Ok(GenerationOutcome::Section {
                    section: r.target_section.clone(),
                    text,
                })
            }
            GenerationRequest::Reprompt(r) => {
                let variation = self
                    .reprompt(&r.context, &r.current_variation, &r.feedback)
                    .await?;
                Ok(GenerationOutcome::Variation { variation })
            }
        }
    }

    pub async fn batch_generate(&self, context: &RequestContext) -> Result<ParsedBatch, GenerationError> {
        let schema = context.schema();
        info!(
            "Generating {} variations for '{}' (sections: {})",
            BATCH_SIZE, context.project.name, schema
        );

        let prompt = PromptComposer::new(context, &schema).batch_prompt();
        let raw = self.call(prompt, self.budgets.batch_max_tokens).await?;
        let shape = ExpectedShape::Array {
            count: BATCH_SIZE,
            schema: schema.clone(),
        };
        let batch = match parse("batch_generate", &raw, &shape)? {
            ParsedResponse::Batch(batch) => batch,
            other => return Err(mismatch(&shape, &other)),
        };

        info!("Parsed {} variations", batch.len());
        Ok(batch)
    }

    /// Returns only the new text for `target`. Splicing it into the held
    /// variation is up to the caller.
    pub async fn regenerate_section(
        &self,
        context: &RequestContext,
        target: &str,
        neighbors: &ScriptVariation,
    ) -> Result<String, GenerationError> {
        let schema = context.schema();
        if !schema.contains(target) {
            warn!("Section '{}' is not part of the schema ({})", target, schema);
        }
        info!("Regenerating section '{}' for '{}'", target, context.project.name);

        let prompt = PromptComposer::new(context, &schema).regenerate_section_prompt(target, neighbors);
        let raw = self.call(prompt, self.budgets.section_max_tokens).await?;
        let shape = ExpectedShape::PlainString;
        match parse("regenerate_section", &raw, &shape)? {
            ParsedResponse::Text(text) => Ok(text),
            other => Err(mismatch(&shape, &other)),
        }
    }

    /// Replaces every section; feedback is assumed to affect the whole script.
    pub async fn reprompt(
        &self,
        context: &RequestContext,
        current: &ScriptVariation,
        feedback: &str,
    ) -> Result<ScriptVariation, GenerationError> {
        let schema: SectionSchema = context.schema();
        info!("Reprompting '{}' with feedback", context.project.name);
        if !current.conforms_to(&schema) {
            warn!(
                "Current variation does not match the schema ({}); missing sections are sent empty",
                schema
            );
        }

        let prompt = PromptComposer::new(context, &schema).reprompt_prompt(current, feedback);
        let raw = self.call(prompt, self.budgets.batch_max_tokens).await?;
        let shape = ExpectedShape::Object { schema };
        match parse("reprompt", &raw, &shape)? {
            ParsedResponse::Variation(variation) => Ok(variation),
            other => Err(mismatch(&shape, &other)),
        }
    }

    async fn call(&self, prompt: Prompt, max_output_tokens: u32) -> Result<String, GenerationError> {
        let call = ModelCall {
            system: prompt.system,
            prompt: prompt.user,
            max_output_tokens,
            model_id: self.model_id.clone(),
        };
        self.client.generate(&call).await
    }
}

fn parse(operation: &str, raw: &str, shape: &ExpectedShape) -> Result<ParsedResponse, GenerationError> {
    diagnose(operation, script::parse_response(raw, shape))
}

fn mismatch(shape: &ExpectedShape, got: &ParsedResponse) -> GenerationError {
    GenerationError::UnexpectedResponseShape(format!("expected {:?}, parser returned {}", shape, got.kind()))
}

/// Logs the raw reply of a failed parse and strips it from the error.
fn diagnose<T>(operation: &str, result: Result<T, ParseFailure>) -> Result<T, GenerationError> {
    result.map_err(|failure| {
        error!(
            "{}: {}. Raw response: {}",
            operation,
            failure.reason,
            failure.raw_text()
        );
        failure.into_generation_error()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{
        BatchGenerateRequest, FormatContext, Mechanism, ProjectContext, RegenerateSectionRequest,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    // Mock client: replays canned replies and records every call.
    #[derive(Debug, Default)]
    struct MockGenerationClient {
        replies: Mutex<VecDeque<Result<String, GenerationError>>>,
        calls: Arc<Mutex<Vec<ModelCall>>>,
    }

    impl MockGenerationClient {
        fn replying(replies: Vec<Result<String, GenerationError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl GenerationClient for MockGenerationClient {
        async fn generate(&self, call: &ModelCall) -> Result<String, GenerationError> {
            self.calls.lock().unwrap().push(call.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GenerationError::transport("no reply queued")))
        }
    }

    fn controller(
        replies: Vec<Result<String, GenerationError>>,
    ) -> (RegenerationController, Arc<Mutex<Vec<ModelCall>>>) {
        let client = MockGenerationClient::replying(replies);
        let calls = client.calls.clone();
        let budgets = GenerationConfig {
            batch_max_tokens: 4000,
            section_max_tokens: 500,
        };
        (
            RegenerationController::new(Box::new(client), "test-model", budgets),
            calls,
        )
    }

    fn project() -> ProjectContext {
        ProjectContext {
            name: "Acme".to_string(),
            description: "Trail shoes".to_string(),
            target_audience: "Runners".to_string(),
            tone: None,
            examples: vec!["Example one".to_string(), "Example two".to_string()],
        }
    }

    fn formatted(sections: &str) -> RequestContext {
        RequestContext {
            project: project(),
            format: Some(FormatContext {
                structure: "Hook then body".to_string(),
                sections: Some(sections.to_string()),
                ..Default::default()
            }),
            mechanisms: vec![],
            batch_instructions: None,
        }
    }

    fn batch_reply(keys: &[&str], n: usize) -> String {
        let items: Vec<String> = (0..n)
            .map(|i| {
                let fields: Vec<String> = keys
                    .iter()
                    .map(|k| format!("\"{}\": \"{} {}\"", k, k, i))
                    .collect();
                format!("{{{}}}", fields.join(", "))
            })
            .collect();
        format!("[{}]", items.join(",\n"))
    }

    #[tokio::test]
    async fn test_unstructured_batch() -> anyhow::Result<()> {
        let (controller, calls) = controller(vec![Ok(batch_reply(&["script"], 10))]);
        let context = RequestContext::new(project());

        let batch = controller.batch_generate(&context).await?;

        assert_eq!(batch.len(), 10);
        assert_eq!(batch.schema().sections(), &["script"]);
        for (i, v) in batch.variations().iter().enumerate() {
            assert_eq!(v.len(), 1);
            assert_eq!(v.get("script"), Some(format!("script {}", i).as_str()));
        }

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1, "one model call per batch");
        assert!(calls[0].prompt.contains("\"script\": \"text here\""));
        assert!(calls[0].prompt.contains("Example 2:\nExample two"));
        assert_eq!(calls[0].max_output_tokens, 4000);
        assert_eq!(calls[0].model_id, "test-model");
        Ok(())
    }

    #[tokio::test]
    async fn test_batch_with_mechanism() -> anyhow::Result<()> {
        let (controller, calls) = controller(vec![Ok(batch_reply(&["hook", "body"], 10))]);
        let mut context = formatted(r#"["hook","body"]"#);
        context.mechanisms = vec![Mechanism::new("PAS", "Problem, agitate, solve.")];

        let batch = controller.batch_generate(&context).await?;
        assert_eq!(batch.variations()[0].get("body"), Some("body 0"));

        let prompt = &calls.lock().unwrap()[0].prompt;
        assert!(prompt.contains("## Mechanisms"));
        assert!(prompt.contains("### PAS\nProblem, agitate, solve."));
        Ok(())
    }

    #[tokio::test]
    async fn test_batch_fenced_reply_with_commentary() -> anyhow::Result<()> {
        let reply = format!("Here you go:\n```json\n{}\n```", batch_reply(&["hook", "body"], 10));
        let (controller, _) = controller(vec![Ok(reply)]);

        let batch = controller.batch_generate(&formatted(r#"["hook","body"]"#)).await?;
        assert_eq!(batch.len(), 10);
        Ok(())
    }

    #[tokio::test]
    async fn test_batch_wrong_length_is_generic_parse_error() {
        let (controller, _) = controller(vec![Ok(batch_reply(&["hook", "body"], 9))]);

        let err = controller
            .batch_generate(&formatted(r#"["hook","body"]"#))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "failed to parse AI response");
        match err {
            GenerationError::Parse { reason } => assert!(reason.contains("got 9")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_regenerate_section_returns_plain_text() -> anyhow::Result<()> {
        let (controller, calls) = controller(vec![Ok("  Tired of blisters?\n".to_string())]);
        let context = formatted(r#"["hook","body"]"#);
        let neighbors: ScriptVariation = [("body", "Buy now")].into_iter().collect();

        let text = controller.regenerate_section(&context, "hook", &neighbors).await?;
        assert_eq!(text, "Tired of blisters?");

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].max_output_tokens, 500);
        assert!(calls[0].prompt.contains("\"hook\" section only"));
        assert!(calls[0].prompt.contains("Buy now"));
        Ok(())
    }

    #[tokio::test]
    async fn test_regenerate_section_does_not_parse_json() -> anyhow::Result<()> {
        let (controller, _) = controller(vec![Ok(r#"{"hook": "x"}"#.to_string())]);
        let text = controller
            .regenerate_section(&formatted(r#"["hook","body"]"#), "hook", &ScriptVariation::new())
            .await?;
        assert_eq!(text, r#"{"hook": "x"}"#);
        Ok(())
    }

    #[tokio::test]
    async fn test_regenerate_section_keeps_fenced_copy_and_empty_reply() -> anyhow::Result<()> {
        let (controller, calls) = controller(vec![
            Ok("```Tired\nof blisters?\n```".to_string()),
            Ok("  \n".to_string()),
        ]);
        let context = formatted(r#"["hook","body"]"#);

        let text = controller
            .regenerate_section(&context, "hook", &ScriptVariation::new())
            .await?;
        assert_eq!(text, "Tired\nof blisters?");

        let text = controller
            .regenerate_section(&context, "hook", &ScriptVariation::new())
            .await?;
        assert_eq!(text, "");
        assert_eq!(calls.lock().unwrap().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_splicing_regenerated_section() -> anyhow::Result<()> {
        let (controller, _) = controller(vec![Ok("New hook".to_string())]);
        let context = formatted(r#"["hook","body","cta"]"#);
        let held: ScriptVariation = [("hook", "Old hook"), ("body", "Body"), ("cta", "Buy now")]
            .into_iter()
            .collect();

        let neighbors = held.neighbors_of(&context.schema(), "hook");
        let text = controller.regenerate_section(&context, "hook", &neighbors).await?;
        let updated = held.with_section("hook", text);

        assert_eq!(updated.get("hook"), Some("New hook"));
        assert_eq!(updated.get("body"), held.get("body"));
        assert_eq!(updated.get("cta"), held.get("cta"));
        Ok(())
    }

    #[tokio::test]
    async fn test_reprompt_replaces_every_section() -> anyhow::Result<()> {
        let reply = "```json\n{\"hook\": \"H2\", \"body\": \"B2\", \"cta\": \"C2\", \"notes\": \"ignored\"}\n```";
        let (controller, calls) = controller(vec![Ok(reply.to_string())]);
        let context = formatted(r#"["hook","body","cta"]"#);
        let current: ScriptVariation = [("hook", "H1"), ("body", "B1"), ("cta", "C1")]
            .into_iter()
            .collect();

        let variation = controller.reprompt(&context, &current, "Shorter please").await?;

        assert_eq!(variation.sections().collect::<Vec<_>>(), vec!["hook", "body", "cta"]);
        assert_eq!(variation.get("hook"), Some("H2"));
        assert_eq!(variation.get("cta"), Some("C2"));

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].max_output_tokens, 4000);
        assert!(calls[0].prompt.contains("hook: \"H1\""));
        assert!(calls[0].prompt.contains("Shorter please"));
        Ok(())
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let (controller, calls) = controller(vec![Err(GenerationError::transport_status(
            429,
            "rate limited",
        ))]);

        let err = controller
            .batch_generate(&formatted(r#"["hook","body"]"#))
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(calls.lock().unwrap().len(), 1, "no internal retry");
    }

    #[tokio::test]
    async fn test_unexpected_shape_propagates() {
        let (controller, _) = controller(vec![Err(GenerationError::UnexpectedResponseShape(
            "tool_use block".to_string(),
        ))]);

        let err = controller
            .reprompt(&formatted(r#"["hook"]"#), &ScriptVariation::new(), "again")
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::UnexpectedResponseShape(_)));
    }

    #[tokio::test]
    async fn test_execute_dispatches_by_operation() -> anyhow::Result<()> {
        let (controller, _) = controller(vec![
            Ok(batch_reply(&["hook", "body"], 10)),
            Ok("Fresh hook".to_string()),
        ]);
        let context = formatted(r#"["hook","body"]"#);

        let batch = controller
            .execute(&GenerationRequest::BatchGenerate(BatchGenerateRequest {
                context: context.clone(),
            }))
            .await?;
        assert!(matches!(batch, GenerationOutcome::Batch(ref b) if b.len() == 10));

        let section = controller
            .execute(&GenerationRequest::RegenerateSection(RegenerateSectionRequest {
                context,
                target_section: "hook".to_string(),
                neighbor_content: ScriptVariation::new(),
            }))
            .await?;
        assert_eq!(
            section,
            GenerationOutcome::Section {
                section: "hook".to_string(),
                text: "Fresh hook".to_string(),
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_independent() -> anyhow::Result<()> {
        let (controller, calls) = controller(vec![
            Ok("First".to_string()),
            Ok("Second".to_string()),
        ]);
        let controller = Arc::new(controller);
        let context = formatted(r#"["hook","body"]"#);
        let empty = ScriptVariation::new();

        let (a, b) = tokio::join!(
            controller.regenerate_section(&context, "hook", &empty),
            controller.regenerate_section(&context, "body", &empty),
        );

        let mut texts = vec![a?, b?];
        texts.sort();
        assert_eq!(texts, vec!["First", "Second"]);
        assert_eq!(calls.lock().unwrap().len(), 2);
        Ok(())
    }
}
