//! What a run measures.

use crate::component::ComponentUnderTest;
use crate::config::{validate_components, AppConfig};
use crate::error::{AppResult, DaqError};
use crate::sweep::SweepConfig;

/// Immutable description of a multi-component, multi-repeat run.
///
/// Built once from the loaded configuration; overrides produce a new plan
/// instead of mutating shared defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    sweep: SweepConfig,
    components: Vec<ComponentUnderTest>,
    repeats: usize,
}

impl RunPlan {
    /// Validate and assemble a plan.
    pub fn new(sweep: SweepConfig, components: Vec<String>, repeats: usize) -> AppResult<Self> {
        sweep.validate()?;
        if repeats == 0 {
            return Err(DaqError::Configuration(
                "repeats must be at least 1".to_string(),
            ));
        }
        validate_components(&components)?;
        let components = components
            .into_iter()
            .map(ComponentUnderTest::new)
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Self {
            sweep,
            components,
            repeats,
        })
    }

    /// Plan described by the `[sweep]` and `[run]` sections.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        Self::new(
            config.sweep.clone(),
            config.run.components.clone(),
            config.run.repeats,
        )
    }

    /// Same plan over a different component list.
    pub fn with_components(self, components: Vec<String>) -> AppResult<Self> {
        Self::new(self.sweep, components, self.repeats)
    }

    /// Same plan with a different repeat count.
    pub fn with_repeats(self, repeats: usize) -> AppResult<Self> {
        let components = self.components.iter().map(|c| c.name().to_string()).collect();
        Self::new(self.sweep, components, repeats)
    }

    /// Sweep shared by every repeat.
    pub fn sweep(&self) -> &SweepConfig {
        &self.sweep
    }

    /// Components in measurement order.
    pub fn components(&self) -> &[ComponentUnderTest] {
        &self.components
    }

    /// Sweeps per component.
    pub fn repeats(&self) -> usize {
        self.repeats
    }
}
