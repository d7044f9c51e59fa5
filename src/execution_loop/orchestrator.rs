//! Conversation Orchestrator
//!
//! Bounded retry loop: question → prompt → model → formatter → executor, with
//! each failure folded into the next prompt. The loop is an explicit state
//! machine driven by a single transition function; cancellation is checked
//! before every transition and raced against every external call.

use crate::answer::AnswerComposer;
use crate::error::{AskError, AttemptFailure, FailureKind, Result, SqlAiError};
use crate::execution::engine::QueryExecutor;
use crate::execution::result::{ExecutionOutcome, ResultSet};
use crate::execution_loop::history::{Attempt, AttemptHistory};
use crate::formatter::{ExecutableSql, SqlFormatter};
use crate::llm::ModelClient;
use crate::prompt::{DefaultPromptBuilder, PromptRecord, SqlPromptBuilder};
use crate::schema::SchemaContext;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Total attempts per question, including the first.
    pub max_retries: usize,
    pub model_timeout: Duration,
    pub execution_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            model_timeout: Duration::from_secs(60),
            execution_timeout: Duration::from_secs(300),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_retries < 1 {
            return Err(SqlAiError::Config("max_retries must be at least 1".to_string()));
        }
        if self.model_timeout.is_zero() || self.execution_timeout.is_zero() {
            return Err(SqlAiError::Config("timeouts must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Where one question currently is in the generate → format → execute cycle.
#[derive(Debug, Clone)]
pub enum LoopState {
    Start,
    Generating,
    Formatting {
        prompt: PromptRecord,
        generated: String,
    },
    Executing {
        prompt: PromptRecord,
        generated: String,
        sql: ExecutableSql,
    },
    Retrying,
    Succeeded {
        sql: ExecutableSql,
        rows: ResultSet,
    },
    Exhausted,
    Cancelled,
}

impl LoopState {
    pub fn name(&self) -> &'static str {
        match self {
            LoopState::Start => "start",
            LoopState::Generating => "generating",
            LoopState::Formatting { .. } => "formatting",
            LoopState::Executing { .. } => "executing",
            LoopState::Retrying => "retrying",
            LoopState::Succeeded { .. } => "succeeded",
            LoopState::Exhausted => "exhausted",
            LoopState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoopState::Succeeded { .. } | LoopState::Exhausted | LoopState::Cancelled
        )
    }
}

/// The query that answered a question, with the attempts it took.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub sql: ExecutableSql,
    pub rows: ResultSet,
    pub attempts: usize,
    pub history: AttemptHistory,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub query: QueryOutcome,
}

impl Answer {
    pub fn sql(&self) -> &str {
        &self.query.sql.sql
    }

    pub fn attempts(&self) -> usize {
        self.query.attempts
    }
}

/// Per-question mutable state. Discarded when the question finishes.
struct Turn<'a> {
    question: &'a str,
    history: AttemptHistory,
    cancel: &'a CancellationToken,
}

enum Guarded<T> {
    Done(T),
    TimedOut,
    Cancelled,
}

/// Run `fut` under a deadline, abandoning it if the token fires first.
async fn guarded<T>(cancel: &CancellationToken, limit: Duration, fut: impl Future<Output = T>) -> Guarded<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Guarded::Cancelled,
        result = tokio::time::timeout(limit, fut) => match result {
            Ok(value) => Guarded::Done(value),
            Err(_) => Guarded::TimedOut,
        },
    }
}

pub struct ConversationOrchestrator {
    schema: Arc<SchemaContext>,
    prompt_builder: Arc<dyn SqlPromptBuilder>,
    model: Arc<dyn ModelClient>,
    formatter: SqlFormatter,
    executor: Arc<dyn QueryExecutor>,
    composer: AnswerComposer,
    config: OrchestratorConfig,
}

impl ConversationOrchestrator {
    /// Defaults: Athena prompt, answers composed by the same model, 3 attempts.
    pub fn new(
        schema: Arc<SchemaContext>,
        model: Arc<dyn ModelClient>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self {
            formatter: SqlFormatter::new(Arc::clone(&schema)),
            composer: AnswerComposer::new(Arc::clone(&model)),
            prompt_builder: Arc::new(DefaultPromptBuilder),
            schema,
            model,
            executor,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_prompt_builder(mut self, builder: Arc<dyn SqlPromptBuilder>) -> Self {
        self.prompt_builder = builder;
        self
    }

    pub fn with_composer(mut self, composer: AnswerComposer) -> Self {
        self.composer = composer;
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub async fn ask(&self, question: &str) -> std::result::Result<Answer, AskError> {
        self.ask_with_cancellation(question, &CancellationToken::new()).await
    }

    /// Generate, execute and answer. Cancelling `cancel` stops the question at
    /// the next transition or abandons the in-flight call.
    #[instrument(skip(self, cancel), fields(question_id = %uuid::Uuid::new_v4()))]
    pub async fn ask_with_cancellation(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<Answer, AskError> {
        let query = self.run_loop(question, cancel).await?;
        let text = self.compose(question, &query, cancel).await?;
        Ok(Answer { text, query })
    }

    /// The retry loop without the answer step.
    #[instrument(skip(self), fields(question_id = %uuid::Uuid::new_v4()))]
    pub async fn generate_sql(&self, question: &str) -> std::result::Result<QueryOutcome, AskError> {
        self.run_loop(question, &CancellationToken::new()).await
    }

    /// Format and execute caller-supplied SQL exactly once, then answer.
    #[instrument(skip(self, sql), fields(question_id = %uuid::Uuid::new_v4()))]
    pub async fn answer_supplied_sql(
        &self,
        question: &str,
        sql: &str,
    ) -> std::result::Result<Answer, AskError> {
        validate_question(question)?;
        let cancel = CancellationToken::new();
        let mut turn = Turn {
            question,
            history: AttemptHistory::new(),
            cancel: &cancel,
        };

        let prompt = PromptRecord {
            attempt: 1,
            text: String::new(),
        };
        let state = LoopState::Formatting {
            prompt,
            generated: sql.to_string(),
        };
        let state = self.transition(state, &mut turn, 1).await;
        let state = if matches!(state, LoopState::Executing { .. }) {
            self.transition(state, &mut turn, 1).await
        } else {
            state
        };

        let query = self.finish(state, turn)?;
        let text = self.compose(question, &query, &cancel).await?;
        Ok(Answer { text, query })
    }

    async fn run_loop(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<QueryOutcome, AskError> {
        validate_question(question)?;
        info!("❓ Question: {}", question);

        let mut turn = Turn {
            question,
            history: AttemptHistory::new(),
            cancel,
        };
        let mut state = LoopState::Start;

        while !state.is_terminal() {
            if cancel.is_cancelled() {
                state = LoopState::Cancelled;
                break;
            }
            let from = state.name();
            state = self.transition(state, &mut turn, self.config.max_retries).await;
            debug!("State {} → {}", from, state.name());
        }

        self.finish(state, turn)
    }

    /// The one place a state moves forward.
    async fn transition(&self, state: LoopState, turn: &mut Turn<'_>, max_attempts: usize) -> LoopState {
        match state {
            LoopState::Start | LoopState::Retrying => LoopState::Generating,

            LoopState::Generating => {
                let prompt = self
                    .prompt_builder
                    .build(turn.question, &self.schema, &turn.history);
                info!("✍️ Generating SQL, attempt #{}", prompt.attempt);

                let limit = self.config.model_timeout;
                let outcome = guarded(turn.cancel, limit, self.model.generate(&prompt.text)).await;
                match outcome {
                    Guarded::Cancelled => LoopState::Cancelled,
                    Guarded::TimedOut => {
                        let failure = AttemptFailure::new(
                            FailureKind::ModelTimeout,
                            format!("model did not respond within {}s", limit.as_secs()),
                        );
                        self.fail(turn, prompt, String::new(), None, failure, max_attempts)
                    }
                    Guarded::Done(Err(e)) => {
                        self.fail(turn, prompt, String::new(), None, e.into(), max_attempts)
                    }
                    Guarded::Done(Ok(generated)) => LoopState::Formatting { prompt, generated },
                }
            }

            LoopState::Formatting { prompt, generated } => match self.formatter.format(&generated) {
                Ok(sql) => {
                    for line in &sql.log {
                        info!("🧹 {}", line);
                    }
                    LoopState::Executing {
                        prompt,
                        generated,
                        sql,
                    }
                }
                Err(failure) => self.fail(turn, prompt, generated, None, failure, max_attempts),
            },

            LoopState::Executing {
                prompt,
                generated,
                sql,
            } => {
                info!("🏃 Executing on {}:\n{}", self.executor.name(), sql.sql);
                let limit = self.config.execution_timeout;
                let outcome = guarded(turn.cancel, limit, self.executor.execute(&sql.sql)).await;
                match outcome {
                    Guarded::Cancelled => LoopState::Cancelled,
                    Guarded::TimedOut => {
                        let failure = AttemptFailure::new(
                            FailureKind::Timeout,
                            format!("query did not finish within {}s", limit.as_secs()),
                        );
                        self.fail(turn, prompt, generated, Some(sql), failure, max_attempts)
                    }
                    Guarded::Done(Err(failure)) => {
                        self.fail(turn, prompt, generated, Some(sql), failure, max_attempts)
                    }
                    Guarded::Done(Ok(rows)) => {
                        info!("✅ Attempt #{} returned {} rows", prompt.attempt, rows.row_count());
                        turn.history.push(Attempt {
                            prompt,
                            generated_sql: generated,
                            executable_sql: Some(sql.clone()),
                            outcome: ExecutionOutcome::Success { rows: rows.clone() },
                        });
                        LoopState::Succeeded { sql, rows }
                    }
                }
            }

            terminal => terminal,
        }
    }

    fn fail(
        &self,
        turn: &mut Turn<'_>,
        prompt: PromptRecord,
        generated: String,
        sql: Option<ExecutableSql>,
        failure: AttemptFailure,
        max_attempts: usize,
    ) -> LoopState {
        warn!("⚠️ Attempt #{} failed with {}", prompt.attempt, failure);
        turn.history.push(Attempt {
            prompt,
            generated_sql: generated,
            executable_sql: sql,
            outcome: ExecutionOutcome::Failure(failure),
        });

        if turn.history.len() < max_attempts {
            LoopState::Retrying
        } else {
            LoopState::Exhausted
        }
    }

    fn finish(&self, state: LoopState, turn: Turn<'_>) -> std::result::Result<QueryOutcome, AskError> {
        let attempts = turn.history.len();
        match state {
            LoopState::Succeeded { sql, rows } => Ok(QueryOutcome {
                sql,
                rows,
                attempts,
                history: turn.history,
            }),
            LoopState::Cancelled => {
                warn!("🛑 Question cancelled after {} attempts", attempts);
                Err(AskError::Cancelled { attempts })
            }
            _ => {
                let (last_kind, message) = turn
                    .history
                    .last()
                    .and_then(|a| a.outcome.failure())
                    .map(|f| (f.kind, f.message.clone()))
                    .unwrap_or((FailureKind::Unparseable, "no attempt was made".to_string()));
                warn!("❌ Giving up after {} attempts: {}: {}", attempts, last_kind, message);
                Err(AskError::RetriesExhausted {
                    attempts,
                    last_kind,
                    message,
                })
            }
        }
    }

    /// One model call; failure is terminal and never retried.
    async fn compose(
        &self,
        question: &str,
        query: &QueryOutcome,
        cancel: &CancellationToken,
    ) -> std::result::Result<String, AskError> {
        let attempts = query.attempts;
        let limit = self.config.model_timeout;
        let outcome = guarded(
            cancel,
            limit,
            self.composer.compose(question, Some(&query.sql.sql), &query.rows),
        )
        .await;

        match outcome {
            Guarded::Done(Ok(text)) => Ok(text),
            Guarded::Done(Err(e)) => {
                warn!("❌ Answer composition failed: {}", e);
                Err(AskError::AnswerCompositionFailed {
                    attempts,
                    message: e.to_string(),
                })
            }
            Guarded::TimedOut => Err(AskError::AnswerCompositionFailed {
                attempts,
                message: format!("model did not respond within {}s", limit.as_secs()),
            }),
            Guarded::Cancelled => Err(AskError::Cancelled { attempts }),
        }
    }
}

fn validate_question(question: &str) -> std::result::Result<(), AskError> {
    if question.trim().is_empty() {
        return Err(AskError::InvalidQuestion("question must not be empty".to_string()));
    }
    Ok(())
}
