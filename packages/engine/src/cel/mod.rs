mod evaluator;
mod value;

pub(crate) use evaluator::CelEvaluator;
