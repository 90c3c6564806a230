//! Prompt assembly for grounded cardiology answers.


use anyhow::Context;
use itertools::Itertools;
use tracing::debug;

use crate::Result;
use crate::chunking::Chunk;
use crate::generation::GenerationClient;

/// Reply the model is told to give for questions outside cardiology.
pub const REFUSAL_LINE: &str = "I can just answer about Heart Related queries.";

/// Booking call-to-action the model is told to append to every answer.
pub const CLOSING_LINE: &str = "Would you like to book appointment with our Cardiologist Dr Ahmed? Please click on the link below to book your appointment.";

const ANSWER_TEMPLATE: &str = "
You are an intelligent cardiology research assistant.

Use ONLY the provided context to answer.

Rules:
- DO NOT answer anything unrelated to heart diseases.
- If question is unrelated say: \"{refusal}\"
- Respond in clear and professional paragraphs.
- At the end ALWAYS add this line exactly:

{closing}

Context:
{context}

Question:
{question}

Answer:
";

/// The instruction scaffolding wrapped around every question.
///
/// Placeholders `{refusal}`, `{closing}`, `{context}` and `{question}` are
/// substituted at render time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPolicy {
    pub template: String,
    pub refusal: String,
    pub closing: String,
}

impl Default for PromptPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            template: ANSWER_TEMPLATE.to_string(),
            refusal: REFUSAL_LINE.to_string(),
            closing: CLOSING_LINE.to_string(),
        }
    }
}

impl PromptPolicy {
    /// Fill the template with the retrieved context and the user question.
    ///
    /// Markers are substituted where they occur in the template; braces
    /// inside the substituted values are left untouched.
    #[expect(
        clippy::string_slice,
        reason = "offsets come from str::find and always land on match boundaries"
    )]
    #[inline]
    pub fn render(&self, question: &str, context: &str) -> String {
        let substitutions = [
            ("{refusal}", self.refusal.as_str()),
            ("{closing}", self.closing.as_str()),
            ("{context}", context),
            ("{question}", question),
        ];

        let mut rendered =
            String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();
        while let Some((at, marker, value)) = substitutions
            .iter()
            .filter_map(|&(marker, value)| rest.find(marker).map(|at| (at, marker, value)))
            .min_by_key(|&(at, _, _)| at)
        {
            rendered.push_str(&rest[..at]);
            rendered.push_str(value);
            rest = &rest[at + marker.len()..];
        }
        rendered.push_str(rest);

        rendered
    }
}

/// Renders the prompt and asks the generation model for an answer.
#[derive(Debug, Clone)]
pub struct AnswerComposer {
    policy: PromptPolicy,
    generation: GenerationClient,
}

impl AnswerComposer {
    #[inline]
    pub fn new(policy: PromptPolicy, generation: GenerationClient) -> Self {
        Self { policy, generation }
    }

    /// Join retrieved chunks into the context section of the prompt.
    #[inline]
    pub fn context_block(chunks: &[Chunk]) -> String {
        chunks.iter().map(|chunk| chunk.content.as_str()).join("\n\n")
    }

    /// Produce an answer for `question` grounded in `context`.
    ///
    /// Exactly one completion request is made per call.
    #[inline]
    pub async fn compose(&self, question: &str, context: &[Chunk]) -> Result<String> {
        let prompt = self.policy.render(question, &Self::context_block(context));
        debug!("Composed prompt ({} chars)", prompt.chars().count());

        let generation = self.generation.clone();
        let answer = tokio::task::spawn_blocking(move || generation.complete(&prompt))
            .await
            .context("Generation task failed")??;

        Ok(answer)
    }
}
