use log::debug;
use serde::{Deserialize, Serialize};
use typed_index_collections::TiVec;

use crate::{
    error::{MalformedScheduleError, ProblemError},
    problem::{
        Itinerary, ItineraryOption, Membership, OptionId, Problem, Step, StepId, Time, TrainId,
        Weight, ZoneId,
    },
    schedule::{FixedDurations, Occupation, Schedule, Weights},
};

/// Where `min_t_in` / `min_t_out` come from when building from schedules.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum TimingSource {
    /// The undisturbed reference timetable.
    #[default]
    Reference,
    /// The observed timetable, for callers that only have the delayed one.
    Delayed,
}

/// A step before it is given an index.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StepSpec {
    pub train: TrainId,
    pub zone: ZoneId,
    pub prev: Option<StepId>,
    pub min_t_in: Time,
    pub min_t_out: Time,
    pub min_duration: Time,
    pub is_fixed: bool,
    pub ponderation: Weight,
    pub overlap: Time,
}

impl StepSpec {
    pub fn new(
        train: impl Into<TrainId>,
        zone: impl Into<ZoneId>,
        prev: Option<StepId>,
        min_t_in: Time,
        min_t_out: Time,
        min_duration: Time,
        is_fixed: bool,
    ) -> Self {
        StepSpec {
            train: train.into(),
            zone: zone.into(),
            prev,
            min_t_in,
            min_t_out,
            min_duration,
            is_fixed,
            ponderation: 1,
            overlap: 0,
        }
    }

    pub fn ponderation(mut self, ponderation: Weight) -> Self {
        self.ponderation = ponderation;
        self
    }

    pub fn overlap(mut self, overlap: Time) -> Self {
        self.overlap = overlap;
        self
    }
}

/// Collects steps and itinerary options, then checks them and derives the
/// index tables of a [`Problem`].
#[derive(Clone, Debug)]
pub struct ProblemBuilder {
    nb_zones: usize,
    nb_trains: usize,
    steps: TiVec<StepId, StepSpec>,
    options: TiVec<OptionId, ItineraryOption>,
}

impl ProblemBuilder {
    pub fn new(nb_zones: usize, nb_trains: usize) -> Self {
        ProblemBuilder {
            nb_zones,
            nb_trains,
            steps: TiVec::new(),
            options: TiVec::new(),
        }
    }

    pub fn add_step(&mut self, spec: StepSpec) -> StepId {
        self.steps.push_and_get_key(spec)
    }

    /// Adds a choice between `itineraries`, each given as the steps it
    /// switches on.
    pub fn add_itinerary_option(
        &mut self,
        name: impl Into<String>,
        itineraries: Vec<Vec<StepId>>,
    ) -> OptionId {
        self.options.push_and_get_key(ItineraryOption {
            name: name.into(),
            itineraries: itineraries
                .into_iter()
                .map(|steps| Itinerary { steps })
                .collect(),
        })
    }

    pub fn build(self) -> Result<Problem, ProblemError> {
        let _p = hprof::enter("build problem");
        let ProblemBuilder {
            nb_zones,
            nb_trains,
            steps: specs,
            options,
        } = self;

        let mut zone_steps: TiVec<ZoneId, Vec<StepId>> = vec![Vec::new(); nb_zones].into();
        let mut successors: TiVec<StepId, Vec<StepId>> = vec![Vec::new(); specs.len()].into();

        for (idx, spec) in specs.iter_enumerated() {
            if usize::from(spec.zone) >= nb_zones {
                return Err(ProblemError::ZoneOutOfRange {
                    step: idx,
                    zone: spec.zone,
                    nb_zones,
                });
            }
            if usize::from(spec.train) >= nb_trains {
                return Err(ProblemError::TrainOutOfRange {
                    step: idx,
                    train: spec.train,
                    nb_trains,
                });
            }
            if spec.min_duration < 0 {
                return Err(ProblemError::NegativeDuration {
                    step: idx,
                    duration: spec.min_duration,
                });
            }
            if spec.ponderation < 0 {
                return Err(ProblemError::NegativeWeight {
                    step: idx,
                    weight: spec.ponderation,
                });
            }
            if spec.overlap < 0 {
                return Err(ProblemError::NegativeOverlap {
                    step: idx,
                    overlap: spec.overlap,
                });
            }
            if let Some(prev) = spec.prev {
                let prev_spec = specs.get(prev).ok_or(ProblemError::UnknownStep {
                    step: idx,
                    referenced: prev,
                })?;
                if prev_spec.train != spec.train {
                    return Err(ProblemError::PrevOnOtherTrain { step: idx, prev });
                }
                if prev_spec.zone == spec.zone {
                    return Err(ProblemError::PrevInSameZone { step: idx, prev });
                }
                successors[prev].push(idx);
            }
            zone_steps[spec.zone].push(idx);
        }

        // Chaining must form a forest: walking back from any step reaches a
        // path start within `len` steps.
        for (idx, _) in specs.iter_enumerated() {
            let mut current = idx;
            let mut hops = 0;
            while let Some(prev) = specs[current].prev {
                current = prev;
                hops += 1;
                if hops > specs.len() {
                    return Err(ProblemError::ChainCycle { step: idx });
                }
            }
        }

        let mut membership: TiVec<StepId, Option<Membership>> = vec![None; specs.len()].into();
        for (option_idx, option) in options.iter_enumerated() {
            if option.itineraries.is_empty() {
                return Err(ProblemError::EmptyItineraryOption { option: option_idx });
            }
            for (itinerary_idx, itinerary) in option.itineraries.iter().enumerate() {
                if itinerary.steps.is_empty() {
                    return Err(ProblemError::EmptyItinerary {
                        option: option_idx,
                        itinerary: itinerary_idx,
                    });
                }
                for &step in itinerary.steps.iter() {
                    let slot = membership.get_mut(step).ok_or(ProblemError::UnknownStep {
                        step,
                        referenced: step,
                    })?;
                    if slot.is_some() {
                        return Err(ProblemError::StepInSeveralItineraries { step });
                    }
                    *slot = Some(Membership {
                        option: option_idx,
                        itinerary: itinerary_idx,
                    });
                }
            }
        }

        let steps: TiVec<StepId, Step> = specs
            .into_iter_enumerated()
            .map(|(index, spec)| Step {
                index,
                train: spec.train,
                zone: spec.zone,
                prev: spec.prev,
                next: successors[index].first().copied(),
                min_t_in: spec.min_t_in,
                min_t_out: spec.min_t_out,
                min_duration: spec.min_duration,
                is_fixed: spec.is_fixed,
                ponderation: spec.ponderation,
                overlap: spec.overlap,
            })
            .collect();

        debug!(
            "Built problem with {} steps, {} zones, {} trains, {} itinerary options",
            steps.len(),
            nb_zones,
            nb_trains,
            options.len()
        );

        Ok(Problem {
            nb_zones,
            nb_trains,
            steps,
            options,
            zone_steps,
            successors,
            membership,
        })
    }
}

/// Derives the regulation problem from a reference and a delayed timetable.
///
/// Every train of `reference` contributes one step per zone of its path.
/// Entry and exit bounds come from `timing`, the minimum duration and the
/// overlap with the previous zone from the delayed timetable. Zone and train
/// ids of the problem are those of `reference`.
pub fn steps_from_schedule(
    reference: &Schedule,
    delayed: &Schedule,
    fixed_durations: Option<&FixedDurations>,
    weights: Option<&Weights>,
    timing: TimingSource,
) -> Result<Problem, MalformedScheduleError> {
    let mut builder = ProblemBuilder::new(reference.zones().len(), reference.trains().len());

    for (train_idx, train_name) in reference.trains().iter().enumerate() {
        let train = TrainId::from(train_idx);
        let delayed_train = delayed
            .train_id(train_name)
            .ok_or_else(|| MalformedScheduleError::UnknownTrain {
                train: train_name.clone(),
            })?;

        if reference.occupations(train).is_empty() {
            return Err(MalformedScheduleError::EmptyPath {
                train: train_name.clone(),
            });
        }

        for zone in delayed.path(delayed_train) {
            let name = delayed.zone_name(zone);
            if reference.zone_id(name).is_none() {
                return Err(MalformedScheduleError::ZoneNotInReference {
                    zone: name.to_string(),
                    train: train_name.clone(),
                });
            }
        }

        let delayed_occupation = |zone: ZoneId| -> Result<Occupation, MalformedScheduleError> {
            let zone_name = reference.zone_name(zone);
            let occ = delayed
                .zone_id(zone_name)
                .and_then(|z| delayed.get(z, delayed_train))
                .ok_or_else(|| MalformedScheduleError::MissingOccupation {
                    zone: zone_name.to_string(),
                    train: train_name.clone(),
                    schedule: "delayed",
                })?;
            check_duration(zone_name, train_name, occ)?;
            Ok(occ)
        };

        let mut prev: Option<(StepId, ZoneId)> = None;
        for &(zone, ref_occ) in reference.occupations(train) {
            check_duration(reference.zone_name(zone), train_name, ref_occ)?;
            let delayed_occ = delayed_occupation(zone)?;

            let overlap = match prev {
                Some((_, prev_zone)) => (delayed_occupation(prev_zone)?.end - delayed_occ.start).max(0),
                None => 0,
            };

            let ponderation = weights
                .and_then(|w| w.get(zone, train))
                .copied()
                .unwrap_or(1);
            if ponderation < 0 {
                return Err(MalformedScheduleError::NegativeWeight {
                    zone: reference.zone_name(zone).to_string(),
                    train: train_name.clone(),
                    weight: ponderation,
                });
            }

            let is_fixed = fixed_durations
                .and_then(|f| f.get(zone, train))
                .copied()
                .unwrap_or(false);

            let bounds = match timing {
                TimingSource::Reference => ref_occ,
                TimingSource::Delayed => delayed_occ,
            };

            let spec = StepSpec::new(
                train,
                zone,
                prev.map(|(step, _)| step),
                bounds.start,
                bounds.end,
                delayed_occ.duration(),
                is_fixed,
            )
            .ponderation(ponderation)
            .overlap(overlap);

            let step = builder.add_step(spec);
            prev = Some((step, zone));
        }
    }

    Ok(builder.build()?)
}

fn check_duration(
    zone: &str,
    train: &str,
    occ: Occupation,
) -> Result<(), MalformedScheduleError> {
    if occ.duration() < 0 {
        return Err(MalformedScheduleError::NegativeDuration {
            zone: zone.to_string(),
            train: train.to_string(),
            start: occ.start,
            end: occ.end,
        });
    }
    Ok(())
}
