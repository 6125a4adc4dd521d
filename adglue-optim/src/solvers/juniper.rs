use std::str::FromStr;

use tracing::warn;

use crate::backend::{ignore, IgnoredOption, OptimizerBackend, Translated};
use crate::options::{OptionValue, SolverOptions};

/// Variable selection rule for branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BranchStrategy {
    #[default]
    StrongPass,
    MostInfeasible,
    PseudoCost,
    Reliability,
}

/// Order in which open nodes of the branch-and-bound tree are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TraverseStrategy {
    #[default]
    Bfs,
    Dfs,
    Dbfs,
}

/// Error returned when a strategy name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown strategy: {0}")]
pub struct UnknownStrategy(pub String);

impl FromStr for BranchStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strong_pass" | "strongpass" => Ok(BranchStrategy::StrongPass),
            "most_infeasible" | "mostinfeasible" => Ok(BranchStrategy::MostInfeasible),
            "pseudo_cost" | "pseudocost" => Ok(BranchStrategy::PseudoCost),
            "reliability" => Ok(BranchStrategy::Reliability),
            _ => Err(UnknownStrategy(s.to_owned())),
        }
    }
}

impl FromStr for TraverseStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bfs" => Ok(TraverseStrategy::Bfs),
            "dfs" => Ok(TraverseStrategy::Dfs),
            "dbfs" => Ok(TraverseStrategy::Dbfs),
            _ => Err(UnknownStrategy(s.to_owned())),
        }
    }
}

/// Juniper branch-and-bound option record.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JuniperOptions {
    /// Integrality tolerance (default: 1e-6).
    pub atol: f64,
    /// Time limit in seconds (default: unlimited).
    pub time_limit: f64,
    /// Relative optimality gap at which the search stops (default: 1e-4).
    pub mip_gap: f64,
    pub branch_strategy: BranchStrategy,
    pub traverse_strategy: TraverseStrategy,
    /// Number of worker processes (default: 1).
    pub processors: i32,
    /// Run the feasibility pump before branching (default: false).
    pub feasibility_pump: bool,
}

impl Default for JuniperOptions {
    fn default() -> Self {
        JuniperOptions {
            atol: 1e-6,
            time_limit: f64::INFINITY,
            mip_gap: 1e-4,
            branch_strategy: BranchStrategy::StrongPass,
            traverse_strategy: TraverseStrategy::Bfs,
            processors: 1,
            feasibility_pump: false,
        }
    }
}

impl JuniperOptions {
    /// Apply a raw option by name. Returns `false` if the name is unknown or
    /// the value has the wrong type, leaving the record unchanged.
    pub fn set(&mut self, name: &str, value: &OptionValue) -> bool {
        match name {
            "atol" => value.as_f64().map(|v| self.atol = v).is_some(),
            "time_limit" => value.as_f64().map(|v| self.time_limit = v).is_some(),
            "mip_gap" => value.as_f64().map(|v| self.mip_gap = v).is_some(),
            "processors" => value
                .as_int()
                .filter(|&v| v >= 1)
                .map(|v| self.processors = v)
                .is_some(),
            "feasibility_pump" => value
                .as_bool()
                .map(|v| self.feasibility_pump = v)
                .is_some(),
            "branch_strategy" => value
                .as_str()
                .and_then(|s| s.parse().ok())
                .map(|v| self.branch_strategy = v)
                .is_some(),
            "traverse_strategy" => value
                .as_str()
                .and_then(|s| s.parse().ok())
                .map(|v| self.traverse_strategy = v)
                .is_some(),
            _ => false,
        }
    }
}

/// The Juniper mixed-integer nonlinear branch-and-bound backend.
///
/// Only its option record is modelled here; it has no solve entry point.
#[derive(Debug, Clone, Default)]
pub struct Juniper {
    pub options: JuniperOptions,
}

impl Juniper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: JuniperOptions) -> Self {
        Juniper { options }
    }
}

impl OptimizerBackend for Juniper {
    const NAME: &'static str = "Juniper";
    type Options = JuniperOptions;

    fn map_options(&self, common: &SolverOptions) -> Translated<JuniperOptions> {
        let mut options = self.options.clone();
        let mut ignored: Vec<IgnoredOption> = Vec::new();

        if common.maxiters.is_some() {
            ignore(Self::NAME, "maxiters", &mut ignored);
        }
        if let Some(maxtime) = common.maxtime {
            options.time_limit = maxtime;
        }
        if let Some(abstol) = common.abstol {
            options.atol = abstol;
        }
        if common.reltol.is_some() {
            ignore(Self::NAME, "reltol", &mut ignored);
        }
        if common.callback.is_some() {
            ignore(Self::NAME, "callback", &mut ignored);
        }

        for (name, value) in &common.extra {
            if !options.set(name, value) {
                warn!(
                    backend = Self::NAME,
                    option = %name,
                    ?value,
                    "unrecognized or mistyped Juniper option"
                );
                ignored.push(IgnoredOption {
                    backend: Self::NAME.to_owned(),
                    option: name.clone(),
                });
            }
        }

        Translated { options, ignored }
    }
}
