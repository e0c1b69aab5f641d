//! Pipeline services and orchestration.

pub mod apply;
pub mod bbon;
pub mod capture;
pub mod config;
pub mod curate;
pub mod judge;
pub mod learn;
pub mod narrative;
pub mod promote;
pub mod reflect;

pub use apply::{ApplyReport, ApplyService, BEGIN_MARKER, END_MARKER};
pub use bbon::{AdoptionReport, BbonOrchestrator, RunOptions, RunSummary};
pub use capture::{parse_trace_payload, CaptureReport, CaptureService};
pub use config::{Config, LlmConfig, ProjectPaths};
pub use curate::{CurateReport, CurateService, PromotedKnowledge};
pub use judge::{JudgeOptions, JudgeService, PROMPT_VERSION_V1};
pub use learn::{LearnReport, LearnService};
pub use narrative::{build_narrative_diff, NarrativeDiff};
pub use promote::{MemoryPromotionService, PromotionReport};
pub use reflect::{ReflectReport, ReflectService};
