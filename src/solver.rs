use std::{fmt::Debug, time::Duration};

use derive_more::Display;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use typed_index_collections::TiVec;

use crate::{
    config::RegulationConfig,
    error::SolverError,
    model::{Model, VarId},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Serialize, Deserialize)]
pub enum OptimisationStatus {
    #[display(fmt = "OPTIMAL")]
    Optimal,
    #[display(fmt = "SUBOPTIMAL")]
    Suboptimal,
    #[display(fmt = "FAILED")]
    Failed,
}

impl OptimisationStatus {
    pub fn has_solution(&self) -> bool {
        !matches!(self, OptimisationStatus::Failed)
    }
}

/// An improving solution found during search.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct IncumbentRecord {
    pub elapsed_secs: f64,
    pub objective: f64,
    pub best_bound: f64,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SolveHistory {
    records: Vec<IncumbentRecord>,
}

impl SolveHistory {
    pub fn new() -> Self {
        SolveHistory::default()
    }

    pub fn push(&mut self, record: IncumbentRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[IncumbentRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!(self
            .records
            .iter()
            .map(|r| serde_json::json!({
                "elapsed_secs": r.elapsed_secs,
                "objective": r.objective,
                "best_bound": r.best_bound,
            }))
            .collect::<Vec<_>>())
    }
}

/// What an engine returns from one solve.
#[derive(Clone, Debug)]
pub struct EngineOutput<S> {
    pub status: S,
    pub values: Option<TiVec<VarId, i64>>,
    pub best_bound: Option<f64>,
    pub history: SolveHistory,
}

/// A backend able to solve a [`Model`].
pub trait Engine {
    /// Raw status vocabulary of the backend.
    type Status: Copy + Debug;

    fn name(&self) -> &'static str;

    fn solve(
        &self,
        model: &Model,
        time_limit: Duration,
        record_history: bool,
    ) -> Result<EngineOutput<Self::Status>, SolverError>;

    /// `None` for statuses without a meaning here; they count as failed.
    fn classify(&self, status: Self::Status) -> Option<OptimisationStatus>;
}

/// Engine-independent result of a solve.
#[derive(Clone, Debug)]
pub struct SolveOutcome {
    pub status: OptimisationStatus,
    /// Present whenever `status` is not failed.
    pub values: Option<TiVec<VarId, i64>>,
    pub objective: Option<i64>,
    pub best_bound: Option<f64>,
    pub history: SolveHistory,
    pub engine_status: String,
}

/// Runs one solve with the configured budget, no retries, and turns the
/// engine's status into an [`OptimisationStatus`].
pub struct SolverAdapter<'a, E> {
    engine: &'a E,
    time_limit: Duration,
    record_history: bool,
}

impl<'a, E: Engine> SolverAdapter<'a, E> {
    pub fn new(engine: &'a E, config: &RegulationConfig) -> Self {
        SolverAdapter {
            engine,
            time_limit: config.time_limit(),
            record_history: config.record_history,
        }
    }

    pub fn solve(&self, model: &Model) -> Result<SolveOutcome, SolverError> {
        let _p = hprof::enter("solve model");
        debug!(
            "Solving with {} ({} vars, {} constraints, {} groups, limit {:?})",
            self.engine.name(),
            model.vars.len(),
            model.constraints.len(),
            model.groups.len(),
            self.time_limit
        );

        let output = self
            .engine
            .solve(model, self.time_limit, self.record_history)?;
        let engine_status = format!("{:?}", output.status);

        let mut status = match self.engine.classify(output.status) {
            Some(status) => status,
            None => {
                warn!("Unmapped {} status {}", self.engine.name(), engine_status);
                OptimisationStatus::Failed
            }
        };

        if status.has_solution() && output.values.is_none() {
            warn!(
                "{} reported {} without an assignment",
                self.engine.name(),
                engine_status
            );
            status = OptimisationStatus::Failed;
        }

        let values = output.values.filter(|_| status.has_solution());
        let objective = values.as_ref().map(|v| model.objective.eval(v));

        info!(
            "Solve finished: {} ({}), objective {:?}",
            status, engine_status, objective
        );

        Ok(SolveOutcome {
            status,
            values,
            objective,
            best_bound: output.best_bound,
            history: output.history,
            engine_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::model::{Domain, LinExpr};

    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    enum FakeStatus {
        Proven,
        Stopped,
        Weird,
    }

    struct FakeEngine {
        status: FakeStatus,
        values: Option<Vec<i64>>,
        calls: Cell<usize>,
    }

    impl Engine for FakeEngine {
        type Status = FakeStatus;

        fn name(&self) -> &'static str {
            "fake"
        }

        fn solve(
            &self,
            _model: &Model,
            _time_limit: Duration,
            _record_history: bool,
        ) -> Result<EngineOutput<FakeStatus>, SolverError> {
            self.calls.set(self.calls.get() + 1);
            Ok(EngineOutput {
                status: self.status,
                values: self.values.clone().map(Into::into),
                best_bound: None,
                history: SolveHistory::new(),
            })
        }

        fn classify(&self, status: FakeStatus) -> Option<OptimisationStatus> {
            match status {
                FakeStatus::Proven => Some(OptimisationStatus::Optimal),
                FakeStatus::Stopped => Some(OptimisationStatus::Suboptimal),
                FakeStatus::Weird => None,
            }
        }
    }

    fn model() -> Model {
        let mut model = Model::new();
        let x = model.new_int_var("x", Domain::at_least(2));
        model.minimize(LinExpr::from(x) * 3 - 1);
        model
    }

    fn run(status: FakeStatus, values: Option<Vec<i64>>) -> (SolveOutcome, usize) {
        let engine = FakeEngine {
            status,
            values,
            calls: Cell::new(0),
        };
        let outcome = SolverAdapter::new(&engine, &RegulationConfig::default())
            .solve(&model())
            .unwrap();
        (outcome, engine.calls.get())
    }

    #[test]
    fn maps_engine_statuses() {
        let (outcome, calls) = run(FakeStatus::Proven, Some(vec![4]));
        assert_eq!(outcome.status, OptimisationStatus::Optimal);
        assert_eq!(outcome.objective, Some(11));
        assert_eq!(calls, 1);

        let (outcome, _) = run(FakeStatus::Stopped, Some(vec![5]));
        assert_eq!(outcome.status, OptimisationStatus::Suboptimal);

        let (outcome, calls) = run(FakeStatus::Weird, Some(vec![4]));
        assert_eq!(outcome.status, OptimisationStatus::Failed);
        assert!(outcome.values.is_none());
        assert_eq!(outcome.engine_status, "Weird");
        assert_eq!(calls, 1);
    }

    #[test]
    fn missing_assignment_is_a_failure() {
        let (outcome, _) = run(FakeStatus::Proven, None);
        assert_eq!(outcome.status, OptimisationStatus::Failed);
        assert_eq!(outcome.objective, None);
    }

    #[test]
    fn history_as_json() {
        let mut history = SolveHistory::new();
        history.push(IncumbentRecord {
            elapsed_secs: 0.5,
            objective: 12.0,
            best_bound: 4.0,
        });
        let json = history.to_json();
        assert_eq!(json[0]["objective"], 12.0);
        assert_eq!(json[0]["best_bound"], 4.0);
        assert_eq!(OptimisationStatus::Suboptimal.to_string(), "SUBOPTIMAL");
    }
}
