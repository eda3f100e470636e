use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{builder::TimingSource, problem::Problem, problem::Time};

/// How zone mutual exclusion is expressed.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum SpacingFormulation {
    /// Precedence when the problem has itinerary options or a setup time,
    /// disjunctive otherwise.
    #[default]
    Auto,
    /// One ordering boolean per pair of steps sharing a zone.
    Disjunctive,
    /// First/last flags and an immediate-precedence chain per zone.
    Precedence,
}

/// The formulation actually generated for a given problem.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Spacing {
    Disjunctive,
    Precedence,
}

impl SpacingFormulation {
    pub fn resolve(self, problem: &Problem, setup_time: Time) -> Spacing {
        match self {
            SpacingFormulation::Disjunctive => Spacing::Disjunctive,
            SpacingFormulation::Precedence => Spacing::Precedence,
            SpacingFormulation::Auto if problem.has_itineraries() || setup_time > 0 => {
                Spacing::Precedence
            }
            SpacingFormulation::Auto => Spacing::Disjunctive,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegulationConfig {
    /// Wall-clock budget of a single solve.
    pub time_limit_secs: f64,
    /// When false, trains keep their reference order in every zone.
    pub allow_change_order: bool,
    /// Also charge weighted exit delay in the objective.
    pub penalize_departure: bool,
    /// Separation added between two consecutive occupations of a zone whose
    /// trains continue to different zones.
    pub setup_time: Time,
    pub spacing: SpacingFormulation,
    /// Keep the (time, objective, bound) series of improving solutions.
    pub record_history: bool,
    /// Re-check every engine solution before decoding it.
    pub validate_solution: bool,
    pub timing_source: TimingSource,
}

impl Default for RegulationConfig {
    fn default() -> Self {
        RegulationConfig {
            time_limit_secs: 30.0,
            allow_change_order: true,
            penalize_departure: false,
            setup_time: 0,
            spacing: SpacingFormulation::Auto,
            record_history: false,
            validate_solution: true,
            timing_source: TimingSource::Reference,
        }
    }
}

impl RegulationConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Negative budgets count as zero, budgets too large for a `Duration`
    /// as unlimited.
    pub fn time_limit(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_limit_secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}
