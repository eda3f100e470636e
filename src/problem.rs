use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use typed_index_collections::{TiSlice, TiVec};

pub type Time = i64;
pub type Weight = i64;

#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, From, Into, Display, Serialize, Deserialize,
)]
#[display(fmt = "s{}", _0)]
#[serde(transparent)]
pub struct StepId(usize);

#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, From, Into, Display, Serialize, Deserialize,
)]
#[display(fmt = "z{}", _0)]
#[serde(transparent)]
pub struct ZoneId(usize);

#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, From, Into, Display, Serialize, Deserialize,
)]
#[display(fmt = "t{}", _0)]
#[serde(transparent)]
pub struct TrainId(usize);

#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, From, Into, Display, Serialize, Deserialize,
)]
#[display(fmt = "o{}", _0)]
#[serde(transparent)]
pub struct OptionId(usize);

/// One train's occupation of one zone.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Step {
    pub index: StepId,
    pub train: TrainId,
    pub zone: ZoneId,
    /// Chaining predecessor on the same train.
    pub prev: Option<StepId>,
    /// First registered successor. Branching steps have more, see
    /// [`Problem::successors`].
    pub next: Option<StepId>,
    pub min_t_in: Time,
    pub min_t_out: Time,
    pub min_duration: Time,
    /// The occupation lasts exactly `min_duration`.
    pub is_fixed: bool,
    pub ponderation: Weight,
    /// How long before the predecessor's exit this step may be entered.
    pub overlap: Time,
}

impl Step {
    pub fn is_path_start(&self) -> bool {
        self.prev.is_none()
    }
}

/// One route through a junction, as the steps it activates.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Itinerary {
    pub steps: Vec<StepId>,
}

/// A choice point: exactly one of the itineraries is taken.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ItineraryOption {
    pub name: String,
    pub itineraries: Vec<Itinerary>,
}

/// Position of a step inside the itinerary options.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Membership {
    pub option: OptionId,
    pub itinerary: usize,
}

/// Immutable regulation problem. Build it with
/// [`ProblemBuilder`](crate::builder::ProblemBuilder).
#[derive(Clone, Debug)]
pub struct Problem {
    pub(crate) nb_zones: usize,
    pub(crate) nb_trains: usize,
    pub(crate) steps: TiVec<StepId, Step>,
    pub(crate) options: TiVec<OptionId, ItineraryOption>,
    pub(crate) zone_steps: TiVec<ZoneId, Vec<StepId>>,
    pub(crate) successors: TiVec<StepId, Vec<StepId>>,
    pub(crate) membership: TiVec<StepId, Option<Membership>>,
}

impl Problem {
    pub fn nb_zones(&self) -> usize {
        self.nb_zones
    }

    pub fn nb_trains(&self) -> usize {
        self.nb_trains
    }

    pub fn nb_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn steps(&self) -> &TiSlice<StepId, Step> {
        &self.steps
    }

    pub fn step(&self, id: StepId) -> &Step {
        &self.steps[id]
    }

    pub fn options(&self) -> &TiSlice<OptionId, ItineraryOption> {
        &self.options
    }

    pub fn has_itineraries(&self) -> bool {
        !self.options.is_empty()
    }

    /// Steps sharing `zone`, in step order.
    pub fn zone_steps(&self, zone: ZoneId) -> &[StepId] {
        &self.zone_steps[zone]
    }

    /// Zones with at least one step.
    pub fn occupied_zones(&self) -> impl Iterator<Item = (ZoneId, &[StepId])> + '_ {
        self.zone_steps
            .iter_enumerated()
            .filter(|(_, steps)| !steps.is_empty())
            .map(|(zone, steps)| (zone, steps.as_slice()))
    }

    pub fn successors(&self, id: StepId) -> &[StepId] {
        &self.successors[id]
    }

    pub fn membership(&self, id: StepId) -> Option<Membership> {
        self.membership[id]
    }

    /// Whether the step is switched on and off by an itinerary choice.
    pub fn is_optional(&self, id: StepId) -> bool {
        self.membership[id].is_some()
    }

    /// Latest reference time of any step.
    pub fn latest_min_time(&self) -> Time {
        self.steps
            .iter()
            .map(|s| s.min_t_in.max(s.min_t_out))
            .max()
            .unwrap_or(0)
    }
}
