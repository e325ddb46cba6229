//! Per-turn orchestration.
//!
//! A turn moves strictly forward through `Received → (Transcribed) → Embedded
//! → Retrieved → Generated → (Synthesized) → Replied` and ends in `Replied` or
//! `Failed`. Every turn yields exactly one [`AnswerMessage`]; stage errors
//! never escape [`ConversationHandler::handle`].

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::stages::{
    AnswerGenerator, Embedder, KnowledgeStore, SpeechSynthesizer, Stage, Transcriber,
};
use super::types::{
    rank_passages, AnswerMessage, IncomingMessage, MessageContent, Modality, QueryVector,
    RetrievedPassage,
};
use crate::config::{StageTimeouts, DEFAULT_TOP_K};
use crate::metrics;
use crate::Result;

/// Generic failure reply (embedding or generation failed).
pub const FAILURE_REPLY: &str = "Sorry, I couldn't process that.";
/// Reply when the voice message could not be transcribed.
pub const TRANSCRIPTION_FAILURE_REPLY: &str = "Sorry, I couldn't understand the voice message.";
/// Reply when the question is empty (silence or blank text).
pub const REPEAT_REPLY: &str = "Sorry, I didn't catch that. Could you please repeat your question?";

/// Observable position of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Received,
    Transcribed,
    Embedded,
    Retrieved,
    Generated,
    Synthesized,
    Replied,
    Failed,
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Generated answer delivered in the requested modality.
    Answered,
    /// Answer delivered, but retrieval or synthesis was skipped.
    Degraded,
    /// Nothing to answer; asked the user to repeat.
    EmptyQuery,
    /// Unrecoverable stage failure; apology sent.
    Failed(Stage),
}

impl TurnOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnOutcome::Answered => "answered",
            TurnOutcome::Degraded => "degraded",
            TurnOutcome::EmptyQuery => "empty_query",
            TurnOutcome::Failed(_) => "failed",
        }
    }
}

/// Result of one turn plus what happened along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub answer: AnswerMessage,
    pub outcome: TurnOutcome,
    /// States visited, in order.
    pub trace: Vec<TurnState>,
    /// Stages whose failure was absorbed by degradation.
    pub degraded: Vec<Stage>,
}

/// Typed intermediate results of the state machine.
enum Turn {
    Received(MessageContent),
    Transcribed(String),
    Embedded {
        question: String,
        vector: QueryVector,
    },
    Retrieved {
        question: String,
        passages: Vec<RetrievedPassage>,
    },
    Generated(String),
    Synthesized(AnswerMessage),
    Replied(AnswerMessage, TurnOutcome),
    Failed(Stage, &'static str),
}

impl Turn {
    fn state(&self) -> TurnState {
        match self {
            Turn::Received(_) => TurnState::Received,
            Turn::Transcribed(_) => TurnState::Transcribed,
            Turn::Embedded { .. } => TurnState::Embedded,
            Turn::Retrieved { .. } => TurnState::Retrieved,
            Turn::Generated(_) => TurnState::Generated,
            Turn::Synthesized(_) => TurnState::Synthesized,
            Turn::Replied(..) => TurnState::Replied,
            Turn::Failed(..) => TurnState::Failed,
        }
    }
}

/// Mutable bookkeeping owned by a single turn.
struct TurnContext {
    sender_id: i64,
    modality: Modality,
    trace: Vec<TurnState>,
    degraded: Vec<Stage>,
}

/// Coordinates the stage services for each incoming message.
///
/// Holds only shared, immutable collaborators: one instance serves any number
/// of concurrent turns.
pub struct ConversationHandler {
    transcriber: Arc<dyn Transcriber>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn KnowledgeStore>,
    generator: Arc<dyn AnswerGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    top_k: usize,
    timeouts: StageTimeouts,
}

impl ConversationHandler {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn KnowledgeStore>,
        generator: Arc<dyn AnswerGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            transcriber,
            embedder,
            store,
            generator,
            synthesizer,
            top_k: DEFAULT_TOP_K,
            timeouts: StageTimeouts::default(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Run one turn and return its single reply.
    pub async fn handle(&self, message: IncomingMessage) -> AnswerMessage {
        self.handle_traced(message).await.answer
    }

    /// Run one turn and return the reply with its trace.
    pub async fn handle_traced(&self, message: IncomingMessage) -> TurnReport {
        let started = Instant::now();
        let mut ctx = TurnContext {
            sender_id: message.sender_id,
            modality: message.modality(),
            trace: Vec::with_capacity(8),
            degraded: Vec::new(),
        };
        metrics::record_turn_start(ctx.modality);
        debug!(sender_id = ctx.sender_id, modality = ctx.modality.as_str(), "Turn received");

        let mut turn = Turn::Received(message.content);
        let (answer, outcome) = loop {
            ctx.trace.push(turn.state());
            turn = match turn {
                Turn::Replied(answer, outcome) => break (answer, outcome),
                Turn::Failed(stage, reply) => {
                    break (AnswerMessage::text_only(reply), TurnOutcome::Failed(stage))
                }
                other => self.advance(other, &mut ctx).await,
            };
        };

        let elapsed = started.elapsed();
        metrics::record_turn_result(ctx.modality, outcome, elapsed);
        info!(
            sender_id = ctx.sender_id,
            modality = ctx.modality.as_str(),
            outcome = outcome.as_str(),
            audio = answer.has_audio(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Turn finished"
        );

        TurnReport {
            answer,
            outcome,
            trace: ctx.trace,
            degraded: ctx.degraded,
        }
    }

    /// One transition. Terminal states are handled by the caller.
    async fn advance(&self, turn: Turn, ctx: &mut TurnContext) -> Turn {
        let timeouts = self.timeouts;
        match turn {
            Turn::Received(MessageContent::Text(text)) => self.embed_question(text, ctx).await,
            Turn::Received(MessageContent::Voice(audio)) => {
                let transcript = self.transcriber.transcribe(&audio);
                match self
                    .call(Stage::Transcription, timeouts.transcription, ctx, transcript)
                    .await
                {
                    Ok(transcript) => Turn::Transcribed(transcript),
                    Err(_) => Turn::Failed(Stage::Transcription, TRANSCRIPTION_FAILURE_REPLY),
                }
            }
            Turn::Transcribed(transcript) => self.embed_question(transcript, ctx).await,
            Turn::Embedded { question, vector } => {
                let search = self.store.search(&vector, self.top_k);
                let passages = match self
                    .call(Stage::Retrieval, timeouts.retrieval, ctx, search)
                    .await
                {
                    Ok(passages) => rank_passages(passages, self.top_k),
                    Err(_) => {
                        ctx.degraded.push(Stage::Retrieval);
                        Vec::new()
                    }
                };
                debug!(sender_id = ctx.sender_id, passages = passages.len(), "Context retrieved");
                Turn::Retrieved { question, passages }
            }
            Turn::Retrieved { question, passages } => {
                let generate = self.generator.generate(&question, &passages);
                match self
                    .call(Stage::Generation, timeouts.generation, ctx, generate)
                    .await
                {
                    Ok(answer) if !answer.trim().is_empty() => Turn::Generated(answer),
                    Ok(_) => {
                        warn!(sender_id = ctx.sender_id, "Generator returned a blank answer");
                        Turn::Failed(Stage::Generation, FAILURE_REPLY)
                    }
                    Err(_) => Turn::Failed(Stage::Generation, FAILURE_REPLY),
                }
            }
            Turn::Generated(answer) => match ctx.modality {
                Modality::Text => {
                    Turn::Replied(AnswerMessage::text_only(answer), self.outcome(ctx))
                }
                Modality::Voice => {
                    let synthesize = self.synthesizer.synthesize(&answer);
                    match self.call(Stage::Synthesis, timeouts.synthesis, ctx, synthesize).await {
                        Ok(audio) if !audio.is_empty() => {
                            Turn::Synthesized(AnswerMessage::with_audio(answer, audio))
                        }
                        _ => {
                            ctx.degraded.push(Stage::Synthesis);
                            Turn::Replied(AnswerMessage::text_only(answer), self.outcome(ctx))
                        }
                    }
                }
            },
            Turn::Synthesized(answer) => Turn::Replied(answer, self.outcome(ctx)),
            terminal @ (Turn::Replied(..) | Turn::Failed(..)) => terminal,
        }
    }

    async fn embed_question(&self, question: String, ctx: &mut TurnContext) -> Turn {
        let question = question.trim().to_string();
        if question.is_empty() {
            debug!(sender_id = ctx.sender_id, "Empty question, asking to repeat");
            return Turn::Replied(AnswerMessage::text_only(REPEAT_REPLY), TurnOutcome::EmptyQuery);
        }

        let embed = self.embedder.embed(&question);
        match self.call(Stage::Embedding, self.timeouts.embedding, ctx, embed).await {
            Ok(vector) => Turn::Embedded { question, vector },
            Err(_) => Turn::Failed(Stage::Embedding, FAILURE_REPLY),
        }
    }

    fn outcome(&self, ctx: &TurnContext) -> TurnOutcome {
        if ctx.degraded.is_empty() {
            TurnOutcome::Answered
        } else {
            TurnOutcome::Degraded
        }
    }

    /// Run one external call under its timeout. Elapsed time is reported as
    /// the stage's own error.
    async fn call<T>(
        &self,
        stage: Stage,
        limit: Duration,
        ctx: &TurnContext,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let started = Instant::now();
        let result = match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(stage.timed_out(limit)),
        };
        let elapsed = started.elapsed();
        metrics::record_stage(stage, elapsed, result.is_ok());

        if let Err(ref err) = result {
            warn!(
                sender_id = ctx.sender_id,
                stage = stage.as_str(),
                elapsed_ms = elapsed.as_millis() as u64,
                error = %err,
                "Stage failed"
            );
        }
        result
    }
}
