use std::time::{Duration, Instant};

use grb::{callback::CbResult, callback::Where, prelude::*};
use log::debug;

use super::{finite_bounds, linearize, round_values};
use crate::{
    error::SolverError,
    model::Relation,
    solver::{Engine, EngineOutput, IncumbentRecord, OptimisationStatus, SolveHistory},
};

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct GurobiStatus {
    pub status: Status,
    pub solution_count: i32,
}

impl GurobiStatus {
    /// Stopped searches count as suboptimal only with an incumbent.
    pub fn classify(self) -> Option<OptimisationStatus> {
        match self.status {
            Status::Optimal => Some(OptimisationStatus::Optimal),
            Status::TimeLimit
            | Status::Interrupted
            | Status::NodeLimit
            | Status::SolutionLimit
            | Status::IterationLimit
            | Status::SubOptimal
                if self.solution_count > 0 =>
            {
                Some(OptimisationStatus::Suboptimal)
            }
            Status::Infeasible
            | Status::InfUnbd
            | Status::Unbounded
            | Status::TimeLimit
            | Status::Interrupted => Some(OptimisationStatus::Failed),
            _ => None,
        }
    }
}

/// MILP through Gurobi. Needs a licensed installation.
pub struct GurobiEngine {
    env: Env,
}

impl GurobiEngine {
    pub fn new() -> Result<Self, SolverError> {
        let mut env = Env::new("").map_err(SolverError::Gurobi)?;
        env.set(param::OutputFlag, 0).map_err(SolverError::Gurobi)?;
        Ok(GurobiEngine { env })
    }
}

impl Engine for GurobiEngine {
    type Status = GurobiStatus;

    fn name(&self) -> &'static str {
        "gurobi"
    }

    fn solve(
        &self,
        model: &crate::model::Model,
        time_limit: Duration,
        record_history: bool,
    ) -> Result<EngineOutput<GurobiStatus>, SolverError> {
        let _p = hprof::enter("gurobi");
        let mut grb_model =
            grb::Model::with_env("regulation", &self.env).map_err(SolverError::Gurobi)?;

        let vars = finite_bounds(model)
            .iter_enumerated()
            .map(|(var, &(lb, ub))| {
                let name = model.vars[var].name.as_str();
                let (lo, hi) = (lb as f64, ub as f64);
                add_intvar!(grb_model, name: name, bounds: lo..hi).map_err(SolverError::Gurobi)
            })
            .collect::<Result<Vec<_>, SolverError>>()?;

        for row in linearize(model) {
            let lhs = row
                .terms
                .iter()
                .map(|&(v, coef)| coef * vars[usize::from(v)])
                .sum::<Expr>();
            let constr = match row.relation {
                Relation::Le => c!(lhs <= row.rhs),
                Relation::Eq => c!(lhs == row.rhs),
                Relation::Ge => c!(lhs >= row.rhs),
            };
            grb_model
                .add_constr(&row.name, constr)
                .map_err(SolverError::Gurobi)?;
        }

        let objective = model
            .objective
            .terms
            .iter()
            .map(|&(v, coef)| coef as f64 * vars[usize::from(v)])
            .sum::<Expr>()
            + model.objective.constant as f64;
        grb_model
            .set_objective(objective, Minimize)
            .map_err(SolverError::Gurobi)?;
        grb_model
            .set_param(param::TimeLimit, time_limit.as_secs_f64())
            .map_err(SolverError::Gurobi)?;

        let start = Instant::now();
        let mut history = SolveHistory::new();
        if record_history {
            let mut callback = |w: Where| -> CbResult {
                if let Where::MIPSol(ctx) = w {
                    history.push(IncumbentRecord {
                        elapsed_secs: start.elapsed().as_secs_f64(),
                        objective: ctx.obj()?,
                        best_bound: ctx.obj_bnd()?,
                    });
                }
                Ok(())
            };
            grb_model
                .optimize_with_callback(&mut callback)
                .map_err(SolverError::Gurobi)?;
        } else {
            grb_model.optimize().map_err(SolverError::Gurobi)?;
        }

        let status = grb_model.status().map_err(SolverError::Gurobi)?;
        let solution_count = grb_model
            .get_attr(attr::SolCount)
            .map_err(SolverError::Gurobi)?;
        debug!(
            "gurobi finished in {:?} with {:?}, {} solutions",
            start.elapsed(),
            status,
            solution_count
        );

        let (values, best_bound) = if solution_count > 0 {
            let x = grb_model
                .get_obj_attr_batch(attr::X, vars.iter().copied())
                .map_err(SolverError::Gurobi)?;
            let bound = grb_model
                .get_attr(attr::ObjBound)
                .map_err(SolverError::Gurobi)?;
            (Some(round_values(x)), Some(bound))
        } else {
            (None, None)
        };

        Ok(EngineOutput {
            status: GurobiStatus {
                status,
                solution_count,
            },
            values,
            best_bound,
            history,
        })
    }

    fn classify(&self, status: GurobiStatus) -> Option<OptimisationStatus> {
        status.classify()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(status: Status, solution_count: i32) -> GurobiStatus {
        GurobiStatus {
            status,
            solution_count,
        }
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            s(Status::Optimal, 1).classify(),
            Some(OptimisationStatus::Optimal)
        );
        assert_eq!(
            s(Status::TimeLimit, 2).classify(),
            Some(OptimisationStatus::Suboptimal)
        );
        assert_eq!(
            s(Status::SubOptimal, 1).classify(),
            Some(OptimisationStatus::Suboptimal)
        );
        assert_eq!(
            s(Status::TimeLimit, 0).classify(),
            Some(OptimisationStatus::Failed)
        );
        assert_eq!(
            s(Status::Infeasible, 0).classify(),
            Some(OptimisationStatus::Failed)
        );
        assert_eq!(s(Status::NodeLimit, 0).classify(), None);
        assert_eq!(s(Status::Loaded, 0).classify(), None);
    }
}
