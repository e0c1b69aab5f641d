//! Domain models for the engram core.

pub mod attempt;
pub mod judge;
pub mod knowledge;
pub mod memory;
pub mod task;
pub mod trace;

pub use attempt::{Attempt, AttemptPatch, AttemptStatus, AttemptStep, StepKind};
pub use judge::{JudgeOutcome, JudgePair};
pub use knowledge::{Insight, KnowledgeItem, KnowledgeKind};
pub use memory::{MemoryEvent, ShortTermMemory, WorkingMemory, WorkingMemoryKind};
pub use task::{Run, Task, TaskSpec};
pub use trace::{
    Execution, ExecutionDiagnostic, ExecutionStatus, Severity, Trace, TraceInput, TraceOutcome,
};
