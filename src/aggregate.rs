use crate::errors::{MetricsError, Result};
use serde::Serialize;

/// Reduction applied by an aggregated metric view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    Average,
    Minimum,
    Maximum,
}

impl Aggregate {
    pub const ALL: [Aggregate; 3] = [Aggregate::Average, Aggregate::Minimum, Aggregate::Maximum];

    /// suffix used after ':' in metric names
    pub fn name(&self) -> &'static str {
        match self {
            Aggregate::Average => "avg",
            Aggregate::Minimum => "min",
            Aggregate::Maximum => "max",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    pub fn compute(&self, samples: &[u32]) -> Result<u32> {
        if samples.is_empty() {
            return Err(MetricsError::PreconditionViolation(format!(
                "{} over an empty sample window",
                self.name()
            )));
        }
        let value = match self {
            Aggregate::Average => {
                let sum: u64 = samples.iter().map(|&v| u64::from(v)).sum();
                (sum / samples.len() as u64) as u32
            }
            Aggregate::Minimum => samples.iter().copied().min().unwrap_or_default(),
            Aggregate::Maximum => samples.iter().copied().max().unwrap_or_default(),
        };
        Ok(value)
    }
}
