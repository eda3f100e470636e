use std::time::{Duration, Instant};

use good_lp::{
    constraint, solvers::microlp::microlp, variable, Expression, ProblemVariables,
    ResolutionError, Solution, SolutionStatus, SolverModel, Variable, WithTimeLimit,
};
use log::{debug, warn};
use typed_index_collections::TiVec;

use super::{finite_bounds, linearize, round_values, Row};
use crate::{
    error::SolverError,
    model::{LinExpr, Model, Relation, VarId},
    solver::{Engine, EngineOutput, IncumbentRecord, OptimisationStatus, SolveHistory},
};

/// Budgets at or above this run without a limit.
const UNLIMITED: Duration = Duration::from_secs(u32::MAX as u64);

/// Raw outcome of the pure-Rust branch and bound.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MicroLpStatus {
    Optimal,
    /// The time limit stopped the search with an incumbent.
    Stopped,
    Infeasible,
    Unbounded,
    /// The time limit hit before any feasible solution.
    TimedOut,
    Error,
}

/// Default engine: MILP through `good_lp` on the `microlp` solver, which
/// stops by itself once the time limit is spent.
#[derive(Clone, Copy, Debug, Default)]
pub struct MicroLpEngine;

impl Engine for MicroLpEngine {
    type Status = MicroLpStatus;

    fn name(&self) -> &'static str {
        "microlp"
    }

    fn solve(
        &self,
        model: &Model,
        time_limit: Duration,
        record_history: bool,
    ) -> Result<EngineOutput<MicroLpStatus>, SolverError> {
        let _p = hprof::enter("microlp");
        let start = Instant::now();
        let (status, values) = run(
            &finite_bounds(model),
            &linearize(model),
            &model.objective,
            time_limit,
        );

        let mut history = SolveHistory::new();
        let objective_value = values.as_ref().map(|v| model.objective.eval(v) as f64);
        if let (true, Some(obj)) = (record_history, objective_value) {
            history.push(IncumbentRecord {
                elapsed_secs: start.elapsed().as_secs_f64(),
                objective: obj,
                best_bound: obj,
            });
        }
        debug!("microlp finished in {:?} with {:?}", start.elapsed(), status);

        Ok(EngineOutput {
            status,
            values,
            best_bound: objective_value.filter(|_| status == MicroLpStatus::Optimal),
            history,
        })
    }

    fn classify(&self, status: MicroLpStatus) -> Option<OptimisationStatus> {
        match status {
            MicroLpStatus::Optimal => Some(OptimisationStatus::Optimal),
            MicroLpStatus::Stopped => Some(OptimisationStatus::Suboptimal),
            MicroLpStatus::Infeasible | MicroLpStatus::Unbounded | MicroLpStatus::TimedOut => {
                Some(OptimisationStatus::Failed)
            }
            MicroLpStatus::Error => None,
        }
    }
}

fn run(
    bounds: &TiVec<VarId, (i64, i64)>,
    rows: &[Row],
    objective: &LinExpr,
    time_limit: Duration,
) -> (MicroLpStatus, Option<TiVec<VarId, i64>>) {
    let mut problem_vars = ProblemVariables::new();
    let vars: TiVec<VarId, Variable> = bounds
        .iter_enumerated()
        .map(|(var, &(lb, ub))| {
            problem_vars.add(
                variable()
                    .integer()
                    .min(lb as f64)
                    .max(ub as f64)
                    .name(var.to_string()),
            )
        })
        .collect();

    let mut obj = Expression::from(objective.constant as f64);
    for &(var, coef) in objective.terms.iter() {
        obj.add_mul(coef as f64, vars[var]);
    }

    let problem = problem_vars.minimise(obj).using(microlp);
    let mut problem = if time_limit < UNLIMITED {
        problem.with_time_limit(time_limit.as_secs_f64())
    } else {
        problem
    };

    for row in rows {
        let mut lhs = Expression::from(0.0);
        for &(var, coef) in row.terms.iter() {
            lhs.add_mul(coef, vars[var]);
        }
        problem.add_constraint(match row.relation {
            Relation::Le => constraint::leq(lhs, row.rhs),
            Relation::Eq => constraint::eq(lhs, row.rhs),
            Relation::Ge => constraint::geq(lhs, row.rhs),
        });
    }

    match problem.solve() {
        Ok(solution) => {
            let status = match solution.status() {
                SolutionStatus::Optimal => MicroLpStatus::Optimal,
                SolutionStatus::TimeLimit | SolutionStatus::GapLimit => {
                    warn!("microlp stopped at the time limit of {:?}", time_limit);
                    MicroLpStatus::Stopped
                }
            };
            let values = round_values(vars.iter().map(|v| solution.value(*v)));
            (status, Some(values))
        }
        Err(ResolutionError::Infeasible) => (MicroLpStatus::Infeasible, None),
        Err(ResolutionError::Unbounded) => (MicroLpStatus::Unbounded, None),
        // The only way microlp reports a budget spent without incumbent.
        Err(ResolutionError::Other(reason)) if reason.starts_with("Time limit") => {
            warn!("microlp found nothing within {:?}", time_limit);
            (MicroLpStatus::TimedOut, None)
        }
        Err(e) => {
            warn!("microlp error: {}", e);
            (MicroLpStatus::Error, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Domain, Literal};

    #[test]
    fn solves_small_milp() {
        let mut model = Model::new();
        model.horizon = 100;
        let x = model.new_int_var("x", Domain::at_least(0));
        let y = model.new_int_var("y", Domain::at_least(0));
        let b = model.new_bool_var("b");
        // Either x ≥ 7 or y ≥ 4; y is cheaper.
        model.add(LinExpr::from(x).geq(7).only_enforce_if([Literal::from(b)]));
        model.add(LinExpr::from(y).geq(4).only_enforce_if([!Literal::from(b)]));
        model.minimize(x * 2 + y * 3);

        let engine = MicroLpEngine;
        let output = engine.solve(&model, Duration::from_secs(10), true).unwrap();
        assert_eq!(output.status, MicroLpStatus::Optimal);
        let values = output.values.unwrap();
        assert_eq!(model.objective.eval(&values), 12);
        assert_eq!(values[b], 0);
        assert_eq!(output.history.records().len(), 1);
    }

    #[test]
    fn spent_budget_is_a_failure() {
        let mut model = Model::new();
        model.horizon = 100;
        let x = model.new_int_var("x", Domain::at_least(0));
        let y = model.new_int_var("y", Domain::at_least(0));
        model.add((x * 2 + y).leq(40));
        model.add((x + y * 3).geq(7));
        model.minimize(x * 3 + y * 2);

        let engine = MicroLpEngine;
        let output = engine.solve(&model, Duration::ZERO, true).unwrap();
        assert_eq!(output.status, MicroLpStatus::TimedOut);
        assert!(output.values.is_none());
        assert!(output.history.is_empty());
        assert_eq!(
            engine.classify(output.status),
            Some(OptimisationStatus::Failed)
        );

        let output = engine.solve(&model, Duration::MAX, false).unwrap();
        assert_eq!(output.status, MicroLpStatus::Optimal);
    }

    #[test]
    fn stopped_search_keeps_its_incumbent() {
        let engine = MicroLpEngine;
        assert_eq!(
            engine.classify(MicroLpStatus::Stopped),
            Some(OptimisationStatus::Suboptimal)
        );
        assert_eq!(engine.classify(MicroLpStatus::Error), None);
    }

    #[test]
    fn reports_infeasibility() {
        let mut model = Model::new();
        model.horizon = 10;
        let x = model.new_int_var("x", Domain::new(0, 5));
        model.add(LinExpr::from(x).geq(6));
        model.minimize(LinExpr::from(x));

        let engine = MicroLpEngine;
        let output = engine.solve(&model, Duration::from_secs(10), false).unwrap();
        assert_eq!(output.status, MicroLpStatus::Infeasible);
        assert!(output.values.is_none());
        assert_eq!(
            engine.classify(output.status),
            Some(OptimisationStatus::Failed)
        );
    }
}
