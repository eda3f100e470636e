use std::collections::BTreeSet;

use log::{debug, info};
use typed_index_collections::TiVec;

use crate::{
    problem::{Problem, StepId, Time},
    schedule::{Occupation, Schedule, StepTable},
    solver::{OptimisationStatus, SolveOutcome},
    variables::Variables,
};

/// Step timings chosen by the engine. Empty when the solve failed.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Solution {
    pub status: OptimisationStatus,
    pub t_in: TiVec<StepId, Time>,
    pub t_out: TiVec<StepId, Time>,
    pub active: TiVec<StepId, bool>,
    pub cost: Option<i64>,
}

impl Solution {
    pub fn failed() -> Self {
        Solution {
            status: OptimisationStatus::Failed,
            t_in: TiVec::new(),
            t_out: TiVec::new(),
            active: TiVec::new(),
            cost: None,
        }
    }

    pub fn from_outcome(outcome: &SolveOutcome, vars: &Variables) -> Self {
        let values = match (&outcome.values, outcome.status.has_solution()) {
            (Some(values), true) => values,
            _ => return Solution::failed(),
        };
        Solution {
            status: outcome.status,
            t_in: vars.t_in.iter().map(|v| values[*v]).collect(),
            t_out: vars.t_out.iter().map(|v| values[*v]).collect(),
            active: vars.active.iter().map(|v| values[*v] != 0).collect(),
            cost: outcome.objective,
        }
    }

    pub fn has_solution(&self) -> bool {
        self.status.has_solution()
    }

    pub fn is_active(&self, step: StepId) -> bool {
        self.active.get(step).copied().unwrap_or(false)
    }

    /// Active steps with their (t_in, t_out).
    pub fn occupations(&self) -> impl Iterator<Item = (StepId, Time, Time)> + '_ {
        self.active
            .iter_enumerated()
            .filter(|(_, active)| **active)
            .map(move |(step, _)| (step, self.t_in[step], self.t_out[step]))
    }
}

/// Time each active step spends in its zone beyond its minimum duration,
/// for the steps where it is positive.
pub fn extra_delays(problem: &Problem, solution: &Solution) -> StepTable<Time> {
    solution
        .occupations()
        .filter_map(|(i, t_in, t_out)| {
            let step = problem.step(i);
            let delay = (t_out - t_in) - step.min_duration;
            (delay > 0).then_some(((step.zone, step.train), delay))
        })
        .collect()
}

/// A regulated timetable and the extra dwell it imposes.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Regulated {
    pub schedule: Schedule,
    pub extra_delays: StepTable<Time>,
}

/// Writes the solution into a copy of `reference`. Occupations of inactive
/// steps are dropped; entries without a step are kept as they are. `None`
/// when the solve failed.
pub fn decode(problem: &Problem, solution: &Solution, reference: &Schedule) -> Option<Regulated> {
    if !solution.has_solution() {
        info!("No regulated schedule: solve {}", solution.status);
        return None;
    }
    let _p = hprof::enter("decode");

    let mut schedule = reference.clone();
    for step in problem.steps().iter() {
        if solution.is_active(step.index) {
            schedule.set(
                step.train,
                step.zone,
                Occupation::new(solution.t_in[step.index], solution.t_out[step.index]),
            );
        } else {
            schedule.remove(step.train, step.zone);
        }
    }

    let extra_delays = extra_delays(problem, solution);
    debug!("Decoded schedule with {} extra delays", extra_delays.len());
    Some(Regulated {
        schedule,
        extra_delays,
    })
}

/// Per (zone, train): regulated duration minus delayed duration. Pairs
/// present in only one schedule get 0. Without a regulated schedule, every
/// delayed duration is reported negated.
pub fn extra_delays_from_regulated(
    delayed: &Schedule,
    regulated: Option<&Schedule>,
) -> StepTable<Time> {
    let delayed = delayed.durations();
    let regulated = match regulated {
        Some(regulated) => regulated.durations(),
        None => return delayed.iter().map(|(key, d)| (key, -d)).collect(),
    };

    let keys = delayed
        .iter()
        .chain(regulated.iter())
        .map(|(key, _)| key)
        .collect::<BTreeSet<_>>();
    keys.into_iter()
        .map(|(zone, train)| {
            let diff = match (regulated.get(zone, train), delayed.get(zone, train)) {
                (Some(r), Some(d)) => r - d,
                _ => 0,
            };
            ((zone, train), diff)
        })
        .collect()
}
