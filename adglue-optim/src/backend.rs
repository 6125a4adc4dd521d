use tracing::warn;

use crate::options::SolverOptions;

/// A generic option the backend could not honor.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IgnoredOption {
    pub backend: String,
    pub option: String,
}

/// A backend option record together with the options that were dropped.
#[derive(Debug, Clone)]
pub struct Translated<T> {
    pub options: T,
    pub ignored: Vec<IgnoredOption>,
}

impl<T> Translated<T> {
    /// Whether the option named `option` was dropped.
    pub fn was_ignored(&self, option: &str) -> bool {
        self.ignored.iter().any(|i| i.option == option)
    }
}

/// An optimizer that accepts solver-agnostic options.
///
/// Translation never fails: options a backend has no equivalent for are
/// logged at `warn` level, recorded in [`Translated::ignored`], and leave the
/// backend record at its default.
pub trait OptimizerBackend {
    /// Name used in warnings.
    const NAME: &'static str;

    /// Backend-specific option record.
    type Options: Clone;

    fn map_options(&self, common: &SolverOptions) -> Translated<Self::Options>;
}

/// Log and record an option the backend drops.
pub(crate) fn ignore(backend: &str, option: &str, ignored: &mut Vec<IgnoredOption>) {
    warn!(
        backend,
        option, "common solver argument {} is not used by {}", option, backend
    );
    ignored.push(IgnoredOption {
        backend: backend.to_owned(),
        option: option.to_owned(),
    });
}
