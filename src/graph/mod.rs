//! Linear retrieve-then-generate flow behind the chat endpoint.


use tracing::debug;

use crate::chunking::Chunk;
use crate::compose::AnswerComposer;
use crate::pipeline::RetrievalPipeline;
use crate::{RagError, Result};

/// State threaded through the answer graph.
#[derive(Debug, Clone, Default)]
pub struct ChatState {
    pub question: String,
    pub context: Vec<Chunk>,
    pub answer: Option<String>,
}

impl ChatState {
    #[inline]
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            context: Vec::new(),
            answer: None,
        }
    }

    /// Consume the state, returning the generated answer.
    #[inline]
    pub fn into_answer(self) -> Result<String> {
        self.answer
            .ok_or_else(|| RagError::Generation("graph produced no answer".to_string()))
    }
}

/// Runs the retriever and generator steps in order.
#[derive(Clone)]
pub struct ChatGraph {
    retrieval: RetrievalPipeline,
    composer: AnswerComposer,
}

impl ChatGraph {
    #[inline]
    pub fn new(retrieval: RetrievalPipeline, composer: AnswerComposer) -> Self {
        Self {
            retrieval,
            composer,
        }
    }

    /// Run both steps for `question` and return the completed state.
    #[inline]
    pub async fn run(&self, question: &str) -> Result<ChatState> {
        let mut state = ChatState::new(question);
        self.retrieve(&mut state).await?;
        self.generate(&mut state).await?;
        Ok(state)
    }

    /// Run the graph and return just the answer text.
    #[inline]
    pub async fn answer(&self, question: &str) -> Result<String> {
        self.run(question).await?.into_answer()
    }

    async fn retrieve(&self, state: &mut ChatState) -> Result<()> {
        state.context = self.retrieval.retrieve(&state.question).await?;
        debug!("Retriever step collected {} chunks", state.context.len());
        Ok(())
    }

    async fn generate(&self, state: &mut ChatState) -> Result<()> {
        let answer = self
            .composer
            .compose(&state.question, &state.context)
            .await?;
        state.answer = Some(answer);
        debug!("Generator step produced an answer");
        Ok(())
    }
}
