//! In-memory timetables: per train, the ordered zones it occupies with
//! entry and exit times.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::problem::{Time, TrainId, Weight, ZoneId};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Occupation {
    pub start: Time,
    pub end: Time,
}

impl Occupation {
    pub fn new(start: Time, end: Time) -> Self {
        Occupation { start, end }
    }

    pub fn duration(&self) -> Time {
        self.end - self.start
    }
}

/// A timetable over named zones and trains.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Schedule {
    zones: Vec<String>,
    trains: Vec<String>,
    paths: Vec<Vec<(ZoneId, Occupation)>>,
}

impl Schedule {
    pub fn new(zones: Vec<String>, trains: Vec<String>) -> Self {
        let paths = vec![Vec::new(); trains.len()];
        Schedule {
            zones,
            trains,
            paths,
        }
    }

    /// Schedule with zones `"0".."nb_zones"` and trains `"train0".."train{nb_trains}"`.
    pub fn with_counts(nb_zones: usize, nb_trains: usize) -> Self {
        Schedule::new(
            (0..nb_zones).map(|z| z.to_string()).collect(),
            (0..nb_trains).map(|t| format!("train{}", t)).collect(),
        )
    }

    pub fn zones(&self) -> &[String] {
        &self.zones
    }

    pub fn trains(&self) -> &[String] {
        &self.trains
    }

    pub fn zone_id(&self, name: &str) -> Option<ZoneId> {
        self.zones.iter().position(|z| z == name).map(ZoneId::from)
    }

    pub fn train_id(&self, name: &str) -> Option<TrainId> {
        self.trains.iter().position(|t| t == name).map(TrainId::from)
    }

    pub fn zone_name(&self, zone: ZoneId) -> &str {
        &self.zones[usize::from(zone)]
    }

    pub fn train_name(&self, train: TrainId) -> &str {
        &self.trains[usize::from(train)]
    }

    /// Occupations of `train` in path order.
    pub fn occupations(&self, train: TrainId) -> &[(ZoneId, Occupation)] {
        &self.paths[usize::from(train)]
    }

    /// Zones visited by `train`, in path order.
    pub fn path(&self, train: TrainId) -> impl Iterator<Item = ZoneId> + '_ {
        self.occupations(train).iter().map(|(zone, _)| *zone)
    }

    pub fn get(&self, zone: ZoneId, train: TrainId) -> Option<Occupation> {
        self.occupations(train)
            .iter()
            .find(|(z, _)| *z == zone)
            .map(|(_, occ)| *occ)
    }

    pub fn duration(&self, zone: ZoneId, train: TrainId) -> Option<Time> {
        self.get(zone, train).map(|occ| occ.duration())
    }

    /// Appends an occupation at the end of the train's path.
    pub fn push(&mut self, train: TrainId, zone: ZoneId, start: Time, end: Time) -> &mut Self {
        self.paths[usize::from(train)].push((zone, Occupation::new(start, end)));
        self
    }

    /// Sets the occupation of `zone` by `train`. An existing entry keeps its
    /// position in the path; a new one is inserted before the first
    /// occupation starting later.
    pub fn set(&mut self, train: TrainId, zone: ZoneId, occupation: Occupation) {
        let path = &mut self.paths[usize::from(train)];
        if let Some((_, occ)) = path.iter_mut().find(|(z, _)| *z == zone) {
            *occ = occupation;
            return;
        }
        let idx = path.partition_point(|(_, occ)| occ.start <= occupation.start);
        path.insert(idx, (zone, occupation));
    }

    pub fn remove(&mut self, train: TrainId, zone: ZoneId) -> Option<Occupation> {
        let path = &mut self.paths[usize::from(train)];
        let idx = path.iter().position(|(z, _)| *z == zone)?;
        Some(path.remove(idx).1)
    }

    /// All (zone, train) durations of the schedule.
    pub fn durations(&self) -> StepTable<Time> {
        self.paths
            .iter()
            .enumerate()
            .flat_map(|(train, path)| {
                path.iter()
                    .map(move |(zone, occ)| ((*zone, TrainId::from(train)), occ.duration()))
            })
            .collect()
    }
}

/// A value per (zone, train) pair.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StepTable<T> {
    entries: BTreeMap<(ZoneId, TrainId), T>,
}

pub type FixedDurations = StepTable<bool>;
pub type Weights = StepTable<Weight>;

impl<T> StepTable<T> {
    pub fn new() -> Self {
        StepTable {
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, zone: ZoneId, train: TrainId, value: T) -> Option<T> {
        self.entries.insert((zone, train), value)
    }

    pub fn get(&self, zone: ZoneId, train: TrainId) -> Option<&T> {
        self.entries.get(&(zone, train))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ((ZoneId, TrainId), &T)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, v))
    }
}

impl<T> Default for StepTable<T> {
    fn default() -> Self {
        StepTable::new()
    }
}

impl<T> FromIterator<((ZoneId, TrainId), T)> for StepTable<T> {
    fn from_iter<I: IntoIterator<Item = ((ZoneId, TrainId), T)>>(iter: I) -> Self {
        StepTable {
            entries: iter.into_iter().collect(),
        }
    }
}
