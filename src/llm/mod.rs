pub mod eval;
pub mod qa;

pub use eval::{EvalReport, EvalResult, Evaluator, Grade, QaPair};
pub use qa::{QaAnswer, RetrievalQA};
