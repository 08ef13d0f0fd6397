//! Multi-phase operations and deadline-bounded runs.

use super::engine::{Engine, RunOptions, RunOutcome, Task};
use super::events::{EventEmitter, EventSink};
use super::profiles::TaskProfile;
use super::tooling::ToolRegistry;
use crate::domain::{EngineEvent, UsageAccumulator, UsageTotals};
use crate::infrastructure::model::ModelBackend;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

type TaskBuilder = Box<dyn Fn(&[PhaseOutcome]) -> Task + Send + Sync>;

/// One step of a pipeline. Its task is built from the outcomes of the
/// phases before it.
pub struct Phase {
    name: String,
    profile: TaskProfile,
    build: TaskBuilder,
}

impl Phase {
    /// Events of this phase are prefixed with `name`.
    pub fn new<F>(name: impl Into<String>, profile: TaskProfile, build: F) -> Self
    where
        F: Fn(&[PhaseOutcome]) -> Task + Send + Sync + 'static,
    {
        let name = name.into();
        Self {
            profile: profile.with_event_prefix(name.clone()),
            name,
            build: Box::new(build),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    pub name: String,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    /// Completed phases in order, including a failed last one.
    pub phases: Vec<PhaseOutcome>,
    pub success: bool,
    pub usage: UsageTotals,
}

impl PipelineOutcome {
    pub fn phase(&self, name: &str) -> Option<&RunOutcome> {
        self.phases
            .iter()
            .find(|phase| phase.name == name)
            .map(|phase| &phase.outcome)
    }
}

/// Ordered phases sharing one usage accumulator, e.g. prosecution, then
/// defense reading the prosecution brief, then a judge reading both.
pub struct Pipeline {
    name: String,
    phases: Vec<Phase>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phases: Vec::new(),
        }
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.phases.push(phase);
        self
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Run phases in order, stopping after the first one that fails.
    pub async fn run<B>(
        &self,
        engine: &Engine<B>,
        tools: &ToolRegistry,
        sink: Option<Arc<dyn EventSink>>,
        accumulator: &UsageAccumulator,
    ) -> PipelineOutcome
    where
        B: ModelBackend + ?Sized,
    {
        let emitter = match sink {
            Some(sink) => EventEmitter::new(sink, self.name.clone()),
            None => EventEmitter::disabled(),
        };
        let mut completed: Vec<PhaseOutcome> = Vec::with_capacity(self.phases.len());
        let mut success = true;

        for (index, phase) in self.phases.iter().enumerate() {
            info!(pipeline = %self.name, phase = %phase.name, "Pipeline phase started");
            emitter
                .emit(EngineEvent::PhaseStarted {
                    phase: phase.name.clone(),
                    phase_number: index + 1,
                })
                .await;

            let task = (phase.build)(&completed);
            let options = RunOptions::new(phase.profile.clone())
                .with_emitter(emitter.with_prefix(phase.profile.event_prefix.clone()))
                .with_accumulator(accumulator.clone());
            let outcome = engine.run(task, tools, options).await;
            let failed = !outcome.success;
            completed.push(PhaseOutcome {
                name: phase.name.clone(),
                outcome,
            });
            if failed {
                warn!(pipeline = %self.name, phase = %phase.name, "Pipeline stopped at failed phase");
                success = false;
                break;
            }
        }

        PipelineOutcome {
            phases: completed,
            success,
            usage: accumulator.snapshot(),
        }
    }
}

/// Run one operation on its own task. When `deadline` passes first, a failed
/// outcome is returned and the in-flight operation is left to finish
/// unobserved.
pub async fn spawn_with_deadline<B>(
    engine: Engine<B>,
    task: Task,
    tools: ToolRegistry,
    options: RunOptions,
    deadline: Duration,
) -> RunOutcome
where
    B: ModelBackend + ?Sized + 'static,
{
    let emitter = options.emitter.clone();
    let handle = tokio::spawn(async move { engine.run(task, &tools, options).await });
    match timeout(deadline, handle).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_error)) => {
            warn!(error = %join_error, "Operation task ended abnormally");
            RunOutcome::failed(format!("operation task ended abnormally: {join_error}"))
        }
        Err(_) => {
            let message = format!(
                "operation exceeded its deadline of {} ms",
                deadline.as_millis()
            );
            warn!(deadline_ms = deadline.as_millis() as u64, "Operation deadline expired");
            emitter
                .emit(EngineEvent::Error {
                    error: message.clone(),
                })
                .await;
            RunOutcome::failed(message)
        }
    }
}
