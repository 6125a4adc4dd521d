use std::fmt;
use std::sync::Arc;

/// Progress callback invoked by solvers that support one.
///
/// Receives the current point and objective value. Returning `true` asks the
/// solver to stop.
#[derive(Clone)]
pub struct Callback(Arc<dyn Fn(&[f64], f64) -> bool + Send + Sync>);

impl Callback {
    pub fn new(f: impl Fn(&[f64], f64) -> bool + Send + Sync + 'static) -> Self {
        Callback(Arc::new(f))
    }

    /// Invoke the callback, returning whether the solver should halt.
    pub fn call(&self, x: &[f64], value: f64) -> bool {
        (self.0)(x, value)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback(..)")
    }
}

/// A raw backend option value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OptionValue {
    Int(i32),
    Num(f64),
    Str(String),
    Bool(bool),
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Int(v)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Num(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_owned())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Str(v)
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl OptionValue {
    /// Numeric view. Integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            OptionValue::Num(v) => Some(v),
            OptionValue::Int(v) => Some(f64::from(v)),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match *self {
            OptionValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            OptionValue::Bool(v) => Some(v),
            _ => None,
        }
    }
}

/// Solver-agnostic options.
///
/// Every field is optional: `None` means "use the backend default". Each
/// backend translates the fields it understands into its own record and
/// warns about the rest (see [`OptimizerBackend`](crate::OptimizerBackend)).
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolverOptions {
    /// Maximum number of iterations.
    pub maxiters: Option<usize>,
    /// Wall or CPU time limit in seconds, depending on the backend.
    pub maxtime: Option<f64>,
    /// Absolute tolerance.
    pub abstol: Option<f64>,
    /// Relative tolerance.
    pub reltol: Option<f64>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub callback: Option<Callback>,
    /// Backend-specific options passed through by name.
    pub extra: Vec<(String, OptionValue)>,
}

impl SolverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_maxiters(mut self, maxiters: usize) -> Self {
        self.maxiters = Some(maxiters);
        self
    }

    pub fn with_maxtime(mut self, seconds: f64) -> Self {
        self.maxtime = Some(seconds);
        self
    }

    pub fn with_abstol(mut self, abstol: f64) -> Self {
        self.abstol = Some(abstol);
        self
    }

    pub fn with_reltol(mut self, reltol: f64) -> Self {
        self.reltol = Some(reltol);
        self
    }

    pub fn with_callback(
        mut self,
        callback: impl Fn(&[f64], f64) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.callback = Some(Callback::new(callback));
        self
    }

    /// Append a raw backend option.
    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }
}
