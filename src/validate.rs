//! Checks a solution against the problem without going through the model.
//! Every engine solution goes through [`validate_solution`] before it is
//! decoded, and the property tests use it as their oracle.

use log::error;
use thiserror::Error;

use crate::{
    config::RegulationConfig,
    problem::{OptionId, Problem, StepId, Time, ZoneId},
    solution::Solution,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("solution has {found} step timings, the problem has {expected} steps")]
    Incomplete { expected: usize, found: usize },
    #[error("steps {first} and {second} overlap in zone {zone}")]
    Overlap {
        zone: ZoneId,
        first: StepId,
        second: StepId,
    },
    #[error("step {step} enters at {actual}, expected {expected} from {prev}")]
    Chaining {
        step: StepId,
        prev: StepId,
        expected: Time,
        actual: Time,
    },
    #[error("step {step} enters at {t_in}, before its minimum {min}")]
    EarlyEntry { step: StepId, t_in: Time, min: Time },
    #[error("step {step} exits at {t_out}, before its minimum {min}")]
    EarlyExit { step: StepId, t_out: Time, min: Time },
    #[error("step {step} lasts {duration}, less than its minimum {min}")]
    ShortDuration {
        step: StepId,
        duration: Time,
        min: Time,
    },
    #[error("fixed step {step} lasts {duration} instead of {expected}")]
    FixedDuration {
        step: StepId,
        duration: Time,
        expected: Time,
    },
    #[error("path start {step} enters at {t_in} instead of {expected}")]
    PathStart {
        step: StepId,
        t_in: Time,
        expected: Time,
    },
    #[error("reported cost {reported} differs from the computed cost {computed}")]
    Cost { reported: i64, computed: i64 },
    #[error("option {option} has {active} active itineraries")]
    ItineraryCount { option: OptionId, active: usize },
    #[error("itinerary {itinerary} of option {option} is partially active")]
    PartialItinerary { option: OptionId, itinerary: usize },
    #[error("step {later} enters before {earlier}, reversing the reference order")]
    Order { earlier: StepId, later: StepId },
}

fn duration(solution: &Solution, step: StepId) -> Time {
    solution.t_out[step] - solution.t_in[step]
}

pub fn check_complete(problem: &Problem, solution: &Solution) -> Result<(), Violation> {
    let expected = problem.nb_steps();
    for found in [
        solution.t_in.len(),
        solution.t_out.len(),
        solution.active.len(),
    ] {
        if found != expected {
            return Err(Violation::Incomplete { expected, found });
        }
    }
    Ok(())
}

pub fn check_min_entry(problem: &Problem, solution: &Solution) -> Result<(), Violation> {
    for (i, t_in, _) in solution.occupations() {
        let min = problem.step(i).min_t_in;
        if t_in < min {
            return Err(Violation::EarlyEntry { step: i, t_in, min });
        }
    }
    Ok(())
}

pub fn check_min_exit(problem: &Problem, solution: &Solution) -> Result<(), Violation> {
    for (i, _, t_out) in solution.occupations() {
        let min = problem.step(i).min_t_out;
        if t_out < min {
            return Err(Violation::EarlyExit { step: i, t_out, min });
        }
    }
    Ok(())
}

pub fn check_min_duration(problem: &Problem, solution: &Solution) -> Result<(), Violation> {
    for (i, _, _) in solution.occupations() {
        let min = problem.step(i).min_duration;
        if duration(solution, i) < min {
            return Err(Violation::ShortDuration {
                step: i,
                duration: duration(solution, i),
                min,
            });
        }
    }
    Ok(())
}

pub fn check_fixed_duration(problem: &Problem, solution: &Solution) -> Result<(), Violation> {
    for (i, _, _) in solution.occupations() {
        let step = problem.step(i);
        if step.is_fixed && duration(solution, i) != step.min_duration {
            return Err(Violation::FixedDuration {
                step: i,
                duration: duration(solution, i),
                expected: step.min_duration,
            });
        }
    }
    Ok(())
}

pub fn check_path_start(problem: &Problem, solution: &Solution) -> Result<(), Violation> {
    for (i, t_in, _) in solution.occupations() {
        let step = problem.step(i);
        if step.is_path_start() && t_in != step.min_t_in {
            return Err(Violation::PathStart {
                step: i,
                t_in,
                expected: step.min_t_in,
            });
        }
    }
    Ok(())
}

pub fn check_chaining(problem: &Problem, solution: &Solution) -> Result<(), Violation> {
    for (i, t_in, _) in solution.occupations() {
        let step = problem.step(i);
        let Some(prev) = step.prev.filter(|p| solution.is_active(*p)) else {
            continue;
        };
        let expected = solution.t_out[prev] - step.overlap;
        if t_in != expected {
            return Err(Violation::Chaining {
                step: i,
                prev,
                expected,
                actual: t_in,
            });
        }
    }
    Ok(())
}

/// Whether the trains of `i` and `j` both go on to active steps in
/// different zones.
fn diverge(problem: &Problem, solution: &Solution, i: StepId, j: StepId) -> bool {
    let next_zones = |s: StepId| {
        problem
            .successors(s)
            .iter()
            .filter(|n| solution.is_active(**n))
            .map(|n| problem.step(*n).zone)
            .collect::<Vec<_>>()
    };
    let (zi, zj) = (next_zones(i), next_zones(j));
    zi.iter().any(|a| zj.iter().any(|b| a != b))
}

/// Active occupations of a zone are disjoint, separated by the setup time
/// where the two trains diverge afterwards.
pub fn check_spacing(
    problem: &Problem,
    solution: &Solution,
    setup_time: Time,
) -> Result<(), Violation> {
    for (zone, group) in problem.occupied_zones() {
        let mut active = group
            .iter()
            .copied()
            .filter(|s| solution.is_active(*s))
            .collect::<Vec<_>>();
        active.sort_by_key(|s| (solution.t_in[*s], solution.t_out[*s]));

        for pair in active.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let setup = if setup_time > 0 && diverge(problem, solution, a, b) {
                setup_time
            } else {
                0
            };
            if solution.t_out[a] + setup > solution.t_in[b] {
                return Err(Violation::Overlap {
                    zone,
                    first: a,
                    second: b,
                });
            }
        }
    }
    Ok(())
}

/// Weighted entry delay of the active steps, plus weighted exit delay when
/// `penalize_departure` is set.
pub fn solution_cost(problem: &Problem, solution: &Solution, penalize_departure: bool) -> i64 {
    solution
        .occupations()
        .map(|(i, t_in, t_out)| {
            let step = problem.step(i);
            let mut cost = step.ponderation * (t_in - step.min_t_in);
            if penalize_departure {
                cost += step.ponderation * (t_out - step.min_t_out);
            }
            cost
        })
        .sum()
}

pub fn check_cost(
    problem: &Problem,
    solution: &Solution,
    penalize_departure: bool,
) -> Result<(), Violation> {
    let Some(reported) = solution.cost else {
        return Ok(());
    };
    let computed = solution_cost(problem, solution, penalize_departure);
    if reported != computed {
        return Err(Violation::Cost { reported, computed });
    }
    Ok(())
}

pub fn check_itineraries(problem: &Problem, solution: &Solution) -> Result<(), Violation> {
    for (option, opt) in problem.options().iter_enumerated() {
        let mut active = 0;
        for (k, itinerary) in opt.itineraries.iter().enumerate() {
            let on = itinerary
                .steps
                .iter()
                .filter(|s| solution.is_active(**s))
                .count();
            if on == itinerary.steps.len() {
                active += 1;
            } else if on > 0 {
                return Err(Violation::PartialItinerary {
                    option,
                    itinerary: k,
                });
            }
        }
        if active != 1 {
            return Err(Violation::ItineraryCount { option, active });
        }
    }
    Ok(())
}

pub fn check_order(problem: &Problem, solution: &Solution) -> Result<(), Violation> {
    for (_, group) in problem.occupied_zones() {
        for &i in group.iter().filter(|s| solution.is_active(**s)) {
            for &j in group.iter().filter(|s| solution.is_active(**s)) {
                if problem.step(i).min_t_in < problem.step(j).min_t_in
                    && solution.t_in[i] >= solution.t_in[j]
                {
                    return Err(Violation::Order {
                        earlier: i,
                        later: j,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Runs every check that applies under `config`. Failed solutions carry no
/// timings and always pass.
pub fn validate_solution(
    problem: &Problem,
    solution: &Solution,
    config: &RegulationConfig,
) -> Result<(), Violation> {
    if !solution.has_solution() {
        return Ok(());
    }
    let _p = hprof::enter("validate");

    let result = check_complete(problem, solution)
        .and_then(|_| check_itineraries(problem, solution))
        .and_then(|_| check_min_entry(problem, solution))
        .and_then(|_| check_min_exit(problem, solution))
        .and_then(|_| check_min_duration(problem, solution))
        .and_then(|_| check_fixed_duration(problem, solution))
        .and_then(|_| check_path_start(problem, solution))
        .and_then(|_| check_chaining(problem, solution))
        .and_then(|_| check_spacing(problem, solution, config.setup_time))
        .and_then(|_| {
            if config.allow_change_order {
                Ok(())
            } else {
                check_order(problem, solution)
            }
        })
        .and_then(|_| check_cost(problem, solution, config.penalize_departure));

    if let Err(violation) = &result {
        error!("Solution rejected: {}", violation);
    }
    result
}
