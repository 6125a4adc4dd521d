use crate::backend::{ignore, OptimizerBackend, Translated};
use crate::options::{OptionValue, SolverOptions};

/// Ipopt option record.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IpoptOptions {
    /// Maximum number of iterations (default: 3000).
    pub max_iter: i32,
    /// CPU time limit in seconds (default: 1e20).
    pub max_cpu_time: f64,
    /// Relative convergence tolerance (default: 1e-8).
    pub tol: f64,
    /// Output verbosity, 0 to 12 (default: 5).
    pub print_level: i32,
    /// Further options passed to Ipopt by name.
    pub raw: Vec<(String, OptionValue)>,
}

impl Default for IpoptOptions {
    fn default() -> Self {
        IpoptOptions {
            max_iter: 3000,
            max_cpu_time: 1e20,
            tol: 1e-8,
            print_level: 5,
            raw: Vec::new(),
        }
    }
}

/// The Ipopt interior-point backend.
#[derive(Debug, Clone, Default)]
pub struct Ipopt {
    /// Starting record that translation fills in.
    pub options: IpoptOptions,
}

impl Ipopt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: IpoptOptions) -> Self {
        Ipopt { options }
    }
}

impl OptimizerBackend for Ipopt {
    const NAME: &'static str = "Ipopt";
    type Options = IpoptOptions;

    fn map_options(&self, common: &SolverOptions) -> Translated<IpoptOptions> {
        let mut options = self.options.clone();
        let mut ignored = Vec::new();

        if let Some(maxiters) = common.maxiters {
            options.max_iter = i32::try_from(maxiters).unwrap_or(i32::MAX);
        }
        if let Some(maxtime) = common.maxtime {
            options.max_cpu_time = maxtime;
        }
        if common.abstol.is_some() {
            ignore(Self::NAME, "abstol", &mut ignored);
        }
        if let Some(reltol) = common.reltol {
            options.tol = reltol;
        }
        if common.callback.is_some() {
            ignore(Self::NAME, "callback", &mut ignored);
        }
        options.raw.extend(common.extra.iter().cloned());

        Translated { options, ignored }
    }
}
