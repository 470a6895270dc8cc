//! Runtime execution for synthesized template programs

mod environment;
mod template_evaluator;
mod value;

pub use environment::Environment;
pub use template_evaluator::{
    TemplateEvaluator, DEFAULT_ITERATION_LIMIT, EMIT_TEXT, EMIT_VALUE,
};
pub use value::Value;
