//! Ordered, validated transformer runs.

mod registry;
mod schema;

pub use registry::TransformerRegistry;
pub use schema::{OptionKind, OptionSpec, OptionValue, OptionValues};

use crate::context::Context;
use crate::options::TransformerConfig;
use crate::{DeobfuscateError, Result};

/// A named pass over the whole program.
pub trait Transformer {
    /// Registry name, unique ignoring case.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn options(&self) -> &'static [OptionSpec];

    /// Rewrites `cx.program`. Local failures are logged and swallowed; an
    /// `Err` aborts the rest of the pipeline.
    fn run(&self, cx: &mut Context<'_>, options: &OptionValues) -> Result<TransformStats>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    /// Rewrites applied.
    pub changes: usize,
    /// Matches abandoned: bounds hit, unsafe rewrites refused, hook failures.
    pub skipped: usize,
}

impl TransformStats {
    pub const fn changed(changes: usize) -> Self {
        Self { changes, skipped: 0 }
    }

    pub fn merge(&mut self, other: Self) {
        self.changes += other.changes;
        self.skipped += other.skipped;
    }
}

impl std::ops::AddAssign for TransformStats {
    fn add_assign(&mut self, other: Self) {
        self.merge(other);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub name: String,
    pub stats: TransformStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub passes: Vec<PassReport>,
}

impl PipelineReport {
    pub fn total_changes(&self) -> usize {
        self.passes.iter().map(|p| p.stats.changes).sum()
    }
}

/// Passes resolved against a registry, options already checked.
pub struct Pipeline<'r> {
    steps: Vec<(&'r dyn Transformer, OptionValues)>,
}

impl<'r> Pipeline<'r> {
    /// Resolves and validates every entry. Nothing runs when any entry is
    /// wrong.
    pub fn build(registry: &'r TransformerRegistry, configs: &[TransformerConfig]) -> Result<Self> {
        let steps = configs
            .iter()
            .map(|config| {
                let transformer = registry
                    .get(&config.name)
                    .ok_or_else(|| DeobfuscateError::UnknownTransformer(config.name.clone()))?;
                let values = OptionValues::validate(transformer.name(), transformer.options(), &config.options)?;
                Ok((transformer, values))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { steps })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|(t, _)| t.name()).collect()
    }

    /// Runs every pass in order over the same tree.
    pub fn run(&self, cx: &mut Context<'_>) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();

        for (transformer, options) in &self.steps {
            log::debug!("running {}", transformer.name());
            let stats = transformer.run(cx, options)?;
            if stats.skipped > 0 {
                log::info!(
                    "{}: {} changes, {} skipped",
                    transformer.name(),
                    stats.changes,
                    stats.skipped
                );
            } else {
                log::info!("{}: {} changes", transformer.name(), stats.changes);
            }
            report.passes.push(PassReport {
                name: transformer.name().to_string(),
                stats,
            });
        }

        Ok(report)
    }
}
