mod pipeline;

#[cfg(test)]
mod tests;

pub use pipeline::{PipelineContext, SynthesisPipeline};
