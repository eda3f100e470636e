//! Train regulation over capacity-one track zones: builds a constraint model
//! from a reference and a delayed timetable, solves it, and turns the answer
//! back into a regulated timetable.

pub mod builder;
pub mod config;
pub mod constraints;
pub mod error;
pub mod model;
pub mod objective;
pub mod problem;
pub mod schedule;
pub mod solution;
pub mod solver;
pub mod solvers;
pub mod validate;
pub mod variables;

use log::info;

pub use builder::{steps_from_schedule, ProblemBuilder, StepSpec, TimingSource};
pub use config::{RegulationConfig, SpacingFormulation};
pub use error::{MalformedScheduleError, ProblemError, RegulationError, SolverError};
pub use problem::Problem;
pub use schedule::{FixedDurations, Occupation, Schedule, StepTable, Weights};
pub use solution::{decode, extra_delays_from_regulated, Regulated, Solution};
pub use solver::{Engine, OptimisationStatus, SolveHistory};
pub use solvers::microlp::MicroLpEngine;

use crate::{
    model::Model, problem::Time, solver::SolverAdapter, validate::validate_solution,
    variables::Variables,
};

/// The model of a problem with its variable handles.
pub struct RegulationModel {
    pub model: Model,
    pub vars: Variables,
}

pub fn build_model(problem: &Problem, config: &RegulationConfig) -> RegulationModel {
    let _p = hprof::enter("build model");
    let mut model = Model::new();
    let vars = Variables::declare(&mut model, problem, config);
    constraints::add_constraints(&mut model, problem, &vars, config);
    objective::set_objective(&mut model, problem, &vars, config);
    RegulationModel { model, vars }
}

#[derive(Clone, Debug)]
pub struct Solved {
    pub solution: Solution,
    pub history: SolveHistory,
}

/// One solve of `problem`. A solution that breaks the problem is an error,
/// infeasibility and timeouts are a [`OptimisationStatus::Failed`] solution.
pub fn solve_problem<E: Engine>(
    problem: &Problem,
    config: &RegulationConfig,
    engine: &E,
) -> Result<Solved, RegulationError> {
    let RegulationModel { model, vars } = build_model(problem, config);
    let outcome = SolverAdapter::new(engine, config).solve(&model)?;
    let solution = Solution::from_outcome(&outcome, &vars);

    if config.validate_solution {
        validate_solution(problem, &solution, config)?;
    }

    Ok(Solved {
        solution,
        history: outcome.history,
    })
}

/// Result of regulating a delayed timetable.
#[derive(Clone, Debug)]
pub struct Regulation {
    pub status: OptimisationStatus,
    pub solution: Solution,
    /// `None` when the solve failed; the delayed timetable then stands.
    pub regulated: Option<Regulated>,
    pub history: SolveHistory,
}

impl Regulation {
    pub fn cost(&self) -> Option<i64> {
        self.solution.cost
    }

    pub fn schedule_or<'a>(&'a self, delayed: &'a Schedule) -> &'a Schedule {
        self.regulated
            .as_ref()
            .map(|r| &r.schedule)
            .unwrap_or(delayed)
    }

    /// Extra dwell per (zone, train), empty without a regulated schedule.
    pub fn extra_delays(&self) -> StepTable<Time> {
        self.regulated
            .as_ref()
            .map(|r| r.extra_delays.clone())
            .unwrap_or_default()
    }
}

pub fn regulate<E: Engine>(
    reference: &Schedule,
    delayed: &Schedule,
    fixed_durations: Option<&FixedDurations>,
    weights: Option<&Weights>,
    config: &RegulationConfig,
    engine: &E,
) -> Result<Regulation, RegulationError> {
    let _p = hprof::enter("regulate");
    let problem = steps_from_schedule(
        reference,
        delayed,
        fixed_durations,
        weights,
        config.timing_source,
    )?;
    info!(
        "Regulating {} steps of {} trains over {} zones",
        problem.nb_steps(),
        problem.nb_trains(),
        problem.nb_zones()
    );

    let Solved { solution, history } = solve_problem(&problem, config, engine)?;
    let regulated = decode(&problem, &solution, reference);
    Ok(Regulation {
        status: solution.status,
        solution,
        regulated,
        history,
    })
}

/// One independent regulation request of a batch.
#[derive(Clone, Debug)]
pub struct RegulationRequest {
    pub reference: Schedule,
    pub delayed: Schedule,
    pub fixed_durations: Option<FixedDurations>,
    pub weights: Option<Weights>,
    pub config: RegulationConfig,
}

impl RegulationRequest {
    fn run<E: Engine>(
        &self,
        make_engine: &(impl Fn() -> Result<E, SolverError> + Sync),
    ) -> Result<Regulation, RegulationError> {
        let engine = make_engine()?;
        regulate(
            &self.reference,
            &self.delayed,
            self.fixed_durations.as_ref(),
            self.weights.as_ref(),
            &self.config,
            &engine,
        )
    }
}

/// Regulates every request with its own engine from `make_engine`, on the
/// rayon pool when the `parallel` feature is on.
pub fn regulate_batch<E, F>(
    requests: &[RegulationRequest],
    make_engine: F,
) -> Vec<Result<Regulation, RegulationError>>
where
    E: Engine,
    F: Fn() -> Result<E, SolverError> + Sync,
{
    let _p = hprof::enter("regulate batch");
    #[cfg(feature = "parallel")]
    let results: Vec<_> = {
        use rayon::prelude::*;
        requests.par_iter().map(|r| r.run(&make_engine)).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let results: Vec<_> = requests.iter().map(|r| r.run(&make_engine)).collect();
    results
}
