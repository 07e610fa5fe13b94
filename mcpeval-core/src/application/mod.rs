pub mod cancel;
pub mod engine;
pub mod evaluation;
pub mod runner;
pub mod tooling;

pub use cancel::CancellationSignal;
pub use evaluation::{EvaluationError, EvaluationPlan, RunReport, run_evaluation, run_evaluation_with};
