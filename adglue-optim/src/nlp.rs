//! Ipopt glue for an [`InstantiatedFunction`].

use adglue::{InstantiatedFunction, SparsityPattern};
use ipopt::{BasicProblem, ConstrainedProblem, Index, Number, SolveStatus};
use tracing::{debug, info};

use crate::error::SolveError;
use crate::options::OptionValue;
use crate::result::{OptimResult, TerminationReason};
use crate::solvers::ipopt::IpoptOptions;

/// A nonlinear program ready to hand to Ipopt.
///
/// Bounds default to unbounded. Jacobian and Hessian triplets come from the
/// sparsity patterns resolved at instantiation, or cover the full matrix
/// (lower triangle for the Hessian) when the function was built densely.
pub struct IpoptProblem {
    func: InstantiatedFunction,
    x0: Vec<f64>,
    lb: Vec<f64>,
    ub: Vec<f64>,
    lcons: Vec<f64>,
    ucons: Vec<f64>,
    jac_pattern: SparsityPattern,
    hess_pattern: SparsityPattern,
}

impl IpoptProblem {
    pub fn new(func: InstantiatedFunction, x0: &[f64]) -> Result<Self, SolveError> {
        let n = func.dim;
        let m = func.num_cons;
        if x0.len() != n {
            return Err(SolveError::InitialPoint {
                expected: n,
                got: x0.len(),
            });
        }
        let jac_pattern = func.cons_jac_prototype.clone().unwrap_or_else(|| {
            SparsityPattern::new(m, n, (0..m).flat_map(|i| (0..n).map(move |j| (i, j))))
        });
        let hess_pattern = func
            .lag_hess_prototype
            .clone()
            .unwrap_or_else(|| SparsityPattern::dense_symmetric(n));
        debug!(
            dim = n,
            num_cons = m,
            jac_nnz = jac_pattern.nnz(),
            hess_nnz = hess_pattern.nnz(),
            "built Ipopt problem"
        );
        Ok(IpoptProblem {
            func,
            x0: x0.to_vec(),
            lb: vec![f64::NEG_INFINITY; n],
            ub: vec![f64::INFINITY; n],
            lcons: vec![0.0; m],
            ucons: vec![0.0; m],
            jac_pattern,
            hess_pattern,
        })
    }

    /// Set variable bounds `lb <= x <= ub`.
    pub fn with_bounds(mut self, lb: &[f64], ub: &[f64]) -> Result<Self, SolveError> {
        check_len("lb", self.func.dim, lb)?;
        check_len("ub", self.func.dim, ub)?;
        self.lb = lb.to_vec();
        self.ub = ub.to_vec();
        Ok(self)
    }

    /// Set constraint bounds `lcons <= c(x) <= ucons`. Equality constraints
    /// use equal bounds; the default is `c(x) = 0`.
    pub fn with_constraint_bounds(
        mut self,
        lcons: &[f64],
        ucons: &[f64],
    ) -> Result<Self, SolveError> {
        check_len("lcons", self.func.num_cons, lcons)?;
        check_len("ucons", self.func.num_cons, ucons)?;
        self.lcons = lcons.to_vec();
        self.ucons = ucons.to_vec();
        Ok(self)
    }

    pub fn function(&self) -> &InstantiatedFunction {
        &self.func
    }
}

fn check_len(name: &'static str, expected: usize, v: &[f64]) -> Result<(), SolveError> {
    if v.len() == expected {
        Ok(())
    } else {
        Err(SolveError::BoundLength {
            name,
            expected,
            got: v.len(),
        })
    }
}

fn fill_indices(pattern: &SparsityPattern, rows: &mut [Index], cols: &mut [Index]) -> bool {
    for (k, (r, c)) in pattern.entries().enumerate() {
        rows[k] = r as Index;
        cols[k] = c as Index;
    }
    true
}

impl BasicProblem for IpoptProblem {
    fn num_variables(&self) -> usize {
        self.func.dim
    }

    fn bounds(&self, x_l: &mut [Number], x_u: &mut [Number]) -> bool {
        x_l.copy_from_slice(&self.lb);
        x_u.copy_from_slice(&self.ub);
        true
    }

    fn initial_point(&self, x: &mut [Number]) -> bool {
        x.copy_from_slice(&self.x0);
        true
    }

    fn objective(&self, x: &[Number], obj: &mut Number) -> bool {
        *obj = (self.func.f)(x);
        obj.is_finite()
    }

    fn objective_grad(&self, x: &[Number], grad_f: &mut [Number]) -> bool {
        (self.func.grad)(grad_f, x);
        true
    }
}

impl ConstrainedProblem for IpoptProblem {
    fn num_constraints(&self) -> usize {
        self.func.num_cons
    }

    fn num_constraint_jacobian_non_zeros(&self) -> usize {
        self.jac_pattern.nnz()
    }

    fn constraint(&self, x: &[Number], g: &mut [Number]) -> bool {
        if let Some(cons) = &self.func.cons {
            cons(g, x);
        }
        true
    }

    fn constraint_bounds(&self, g_l: &mut [Number], g_u: &mut [Number]) -> bool {
        g_l.copy_from_slice(&self.lcons);
        g_u.copy_from_slice(&self.ucons);
        true
    }

    fn constraint_jacobian_indices(&self, rows: &mut [Index], cols: &mut [Index]) -> bool {
        fill_indices(&self.jac_pattern, rows, cols)
    }

    fn constraint_jacobian_values(&self, x: &[Number], vals: &mut [Number]) -> bool {
        let Some(cons_j) = &self.func.cons_j else {
            return true;
        };
        let mut jac = self.func.jac_buffer();
        cons_j(&mut jac, x);
        self.jac_pattern.gather(&jac, vals);
        true
    }

    fn num_hessian_non_zeros(&self) -> usize {
        self.hess_pattern.nnz()
    }

    fn hessian_indices(&self, rows: &mut [Index], cols: &mut [Index]) -> bool {
        fill_indices(&self.hess_pattern, rows, cols)
    }

    fn hessian_values(
        &self,
        x: &[Number],
        obj_factor: Number,
        lambda: &[Number],
        vals: &mut [Number],
    ) -> bool {
        let mut h = self.func.hess_buffer();
        (self.func.lag_h)(&mut h, x, obj_factor, lambda);
        self.hess_pattern.gather(&h, vals);
        true
    }
}

impl From<SolveStatus> for TerminationReason {
    fn from(status: SolveStatus) -> Self {
        match status {
            SolveStatus::SolveSucceeded => TerminationReason::Optimal,
            SolveStatus::SolvedToAcceptableLevel => TerminationReason::AcceptableLevel,
            SolveStatus::FeasiblePointFound => TerminationReason::FeasiblePoint,
            SolveStatus::InfeasibleProblemDetected => TerminationReason::Infeasible,
            SolveStatus::SearchDirectionBecomesTooSmall => TerminationReason::StepSize,
            SolveStatus::DivergingIterates => TerminationReason::Diverging,
            SolveStatus::UserRequestedStop => TerminationReason::UserStop,
            SolveStatus::MaximumIterationsExceeded => TerminationReason::MaxIterations,
            SolveStatus::MaximumCpuTimeExceeded => TerminationReason::MaxTime,
            SolveStatus::RestorationFailed
            | SolveStatus::ErrorInStepComputation
            | SolveStatus::InvalidNumberDetected => TerminationReason::NumericalError,
            SolveStatus::NotEnoughDegreesOfFreedom
            | SolveStatus::InvalidProblemDefinition
            | SolveStatus::InvalidOption => TerminationReason::InvalidProblem,
            _ => TerminationReason::InternalError,
        }
    }
}

fn apply<P: BasicProblem>(
    solver: &mut ipopt::Ipopt<P>,
    name: &str,
    value: &OptionValue,
) -> Result<(), SolveError> {
    let accepted = match value {
        OptionValue::Int(v) => solver.set_option(name, *v).is_some(),
        OptionValue::Num(v) => solver.set_option(name, *v).is_some(),
        OptionValue::Str(s) => solver.set_option(name, s.as_str()).is_some(),
        OptionValue::Bool(b) => solver
            .set_option(name, if *b { "yes" } else { "no" })
            .is_some(),
    };
    if accepted {
        Ok(())
    } else {
        Err(SolveError::InvalidOption {
            name: name.to_owned(),
        })
    }
}

/// Solve `problem` with Ipopt under `options`.
///
/// Non-convergence is reported through [`OptimResult::termination`], not as
/// an error.
pub fn solve(problem: IpoptProblem, options: &IpoptOptions) -> Result<OptimResult, SolveError> {
    let mut solver = ipopt::Ipopt::new(problem)?;

    apply(&mut solver, "max_iter", &OptionValue::Int(options.max_iter))?;
    apply(&mut solver, "max_cpu_time", &OptionValue::Num(options.max_cpu_time))?;
    apply(&mut solver, "tol", &OptionValue::Num(options.tol))?;
    apply(&mut solver, "print_level", &OptionValue::Int(options.print_level))?;
    for (name, value) in &options.raw {
        apply(&mut solver, name, value)?;
    }

    info!(
        max_iter = options.max_iter,
        tol = options.tol,
        "starting Ipopt solve"
    );
    let result = solver.solve();
    let termination = TerminationReason::from(result.status);
    info!(
        %termination,
        objective = result.objective_value,
        "Ipopt finished"
    );

    Ok(OptimResult {
        x: result.solver_data.solution.primal_variables.to_vec(),
        value: result.objective_value,
        constraints: result.constraint_values.to_vec(),
        multipliers: result.solver_data.solution.constraint_multipliers.to_vec(),
        termination,
    })
}
