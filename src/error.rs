use thiserror::Error;

use crate::{
    problem::{OptionId, StepId, Time, TrainId, ZoneId},
    validate::Violation,
};

/// The input schedules are structurally inconsistent. No regulation is
/// attempted when building fails with one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedScheduleError {
    #[error("train {train} has an empty path")]
    EmptyPath { train: String },
    #[error("zone {zone} of train {train} is absent from the reference schedule")]
    ZoneNotInReference { zone: String, train: String },
    #[error("train {train} has no occupation of zone {zone} in the {schedule} schedule")]
    MissingOccupation {
        zone: String,
        train: String,
        schedule: &'static str,
    },
    #[error("train {train} occupies zone {zone} for a negative duration ({start} -> {end})")]
    NegativeDuration {
        zone: String,
        train: String,
        start: Time,
        end: Time,
    },
    #[error("negative weight {weight} for train {train} in zone {zone}")]
    NegativeWeight {
        zone: String,
        train: String,
        weight: i64,
    },
    #[error("train {train} is absent from the delayed schedule")]
    UnknownTrain { train: String },
    #[error(transparent)]
    Inconsistent(#[from] ProblemError),
}

/// A problem assembled step by step breaks one of the Step invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProblemError {
    #[error("step {step} references unknown step {referenced}")]
    UnknownStep { step: StepId, referenced: StepId },
    #[error("step {step} chains from {prev}, which belongs to another train")]
    PrevOnOtherTrain { step: StepId, prev: StepId },
    #[error("step {step} chains from {prev} in the same zone")]
    PrevInSameZone { step: StepId, prev: StepId },
    #[error("step {step} uses zone {zone}, but the problem has {nb_zones} zones")]
    ZoneOutOfRange {
        step: StepId,
        zone: ZoneId,
        nb_zones: usize,
    },
    #[error("step {step} uses train {train}, but the problem has {nb_trains} trains")]
    TrainOutOfRange {
        step: StepId,
        train: TrainId,
        nb_trains: usize,
    },
    #[error("step {step} belongs to more than one itinerary")]
    StepInSeveralItineraries { step: StepId },
    #[error("itinerary option {option} has no alternatives")]
    EmptyItineraryOption { option: OptionId },
    #[error("itinerary {itinerary} of option {option} has no steps")]
    EmptyItinerary { option: OptionId, itinerary: usize },
    #[error("step {step} has a negative minimum duration {duration}")]
    NegativeDuration { step: StepId, duration: Time },
    #[error("step {step} has a negative weight {weight}")]
    NegativeWeight { step: StepId, weight: i64 },
    #[error("step {step} has a negative overlap {overlap}")]
    NegativeOverlap { step: StepId, overlap: Time },
    #[error("the chain of predecessors of step {step} loops")]
    ChainCycle { step: StepId },
}

/// Failures of the solving engine that are not a solve status.
#[derive(Debug, Error)]
pub enum SolverError {
    /// Raised by engines without a richer error type of their own.
    #[error("solving engine error: {0}")]
    Engine(String),
    #[cfg(feature = "gurobi")]
    #[error("gurobi error: {0}")]
    Gurobi(#[from] grb::Error),
}

#[derive(Debug, Error)]
pub enum RegulationError {
    #[error(transparent)]
    MalformedSchedule(#[from] MalformedScheduleError),
    #[error(transparent)]
    Problem(#[from] ProblemError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    /// The engine returned an assignment that breaks the model semantics.
    #[error("engine returned an invalid solution: {0}")]
    InvalidSolution(#[from] Violation),
}
