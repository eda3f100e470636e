use std::collections::BTreeMap;

use log::debug;
use typed_index_collections::TiVec;

use crate::{
    config::{RegulationConfig, Spacing},
    model::{Domain, LinExpr, Literal, Model, VarId},
    problem::{OptionId, Problem, StepId, ZoneId},
};

/// Decision variables of the regulation model.
#[derive(Clone, Debug)]
pub struct Variables {
    pub spacing: Spacing,
    pub t_in: TiVec<StepId, VarId>,
    pub t_out: TiVec<StepId, VarId>,
    pub duration: TiVec<StepId, VarId>,
    pub active: TiVec<StepId, VarId>,
    /// Precedence form only.
    pub first: TiVec<StepId, Option<VarId>>,
    pub last: TiVec<StepId, Option<VarId>>,
    /// `prec[(i, j)]`: `i` immediately precedes `j` in their zone.
    pub prec: BTreeMap<(StepId, StepId), VarId>,
    /// Position of a step in its zone's precedence chain.
    pub rank: TiVec<StepId, Option<VarId>>,
    /// `diff_itinerary[(i, j)]`: the trains of `i` and `j` leave the zone
    /// towards different zones.
    pub diff_itinerary: BTreeMap<(StepId, StepId), VarId>,
    /// Disjunctive form only, `i < j`: `i` is done before `j` starts.
    pub order: BTreeMap<(StepId, StepId), VarId>,
    /// One selection boolean per itinerary of each option.
    pub chosen: TiVec<OptionId, Vec<VarId>>,
    /// Zones whose steps are all optional: whether any of them is active.
    pub zone_used: BTreeMap<ZoneId, VarId>,
    /// Entry delay of optional steps, zero when inactive.
    pub arrival_delay: TiVec<StepId, Option<VarId>>,
    /// Exit delay of optional steps when exit delay is charged.
    pub departure_delay: TiVec<StepId, Option<VarId>>,
}

impl Variables {
    /// Declares every variable of the model and the identities that define
    /// them (duration, pinned entry of optional path starts, delay of optional
    /// steps).
    pub fn declare(model: &mut Model, problem: &Problem, config: &RegulationConfig) -> Self {
        let _p = hprof::enter("declare variables");
        let spacing = config.spacing.resolve(problem, config.setup_time);
        model.horizon = horizon(problem, config);

        let mut t_in = TiVec::new();
        let mut t_out = TiVec::new();
        let mut duration = TiVec::new();
        let mut active = TiVec::new();
        let mut arrival_delay = TiVec::new();
        let mut departure_delay = TiVec::new();

        for step in problem.steps().iter() {
            let i = step.index;
            let optional = problem.is_optional(i);

            let t_in_domain = if step.is_path_start() && !optional {
                Domain::fixed(step.min_t_in)
            } else {
                Domain::at_least(step.min_t_in)
            };
            let t_in_var = model.new_int_var(format!("t_in[{}]", i), t_in_domain);
            let t_out_var =
                model.new_int_var(format!("t_out[{}]", i), Domain::at_least(step.min_t_out));
            let duration_domain = if step.is_fixed && !optional {
                Domain::fixed(step.min_duration)
            } else {
                Domain::at_least(step.min_duration)
            };
            let duration_var = model.new_int_var(format!("duration[{}]", i), duration_domain);

            model.add(
                (t_out_var - t_in_var)
                    .equals(duration_var)
                    .named(format!("interval[{}]", i)),
            );

            let active_var = if optional {
                model.new_bool_var(format!("active[{}]", i))
            } else {
                model.new_fixed_bool(format!("active[{}]", i), true)
            };

            if optional && step.is_fixed {
                model.add(
                    LinExpr::from(duration_var)
                        .equals(step.min_duration)
                        .only_enforce_if([Literal::from(active_var)])
                        .named(format!("fixed_duration[{}]", i)),
                );
            }

            if optional && step.is_path_start() {
                model.add(
                    LinExpr::from(t_in_var)
                        .equals(step.min_t_in)
                        .only_enforce_if([Literal::from(active_var)])
                        .named(format!("pinned_start[{}]", i)),
                );
            }

            let delay_var = |model: &mut Model, name: &str, time: VarId, min: i64| {
                let var = model.new_int_var(format!("{}[{}]", name, i), Domain::at_least(0));
                model.add(
                    LinExpr::from(var)
                        .equals(time - min)
                        .only_enforce_if([Literal::from(active_var)])
                        .named(format!("{}_def[{}]", name, i)),
                );
                model.add(
                    LinExpr::from(var)
                        .equals(0)
                        .only_enforce_if([!Literal::from(active_var)])
                        .named(format!("{}_off[{}]", name, i)),
                );
                var
            };

            arrival_delay.push(
                optional.then(|| delay_var(model, "arrival_delay", t_in_var, step.min_t_in)),
            );
            departure_delay.push((optional && config.penalize_departure).then(|| {
                delay_var(model, "departure_delay", t_out_var, step.min_t_out)
            }));

            t_in.push(t_in_var);
            t_out.push(t_out_var);
            duration.push(duration_var);
            active.push(active_var);
        }

        let chosen: TiVec<OptionId, Vec<VarId>> = problem
            .options()
            .iter_enumerated()
            .map(|(option, opt)| {
                (0..opt.itineraries.len())
                    .map(|k| model.new_bool_var(format!("chosen[{}][{}]", option, k)))
                    .collect()
            })
            .collect();

        let mut vars = Variables {
            spacing,
            t_in,
            t_out,
            duration,
            active,
            first: vec![None; problem.nb_steps()].into(),
            last: vec![None; problem.nb_steps()].into(),
            prec: BTreeMap::new(),
            rank: vec![None; problem.nb_steps()].into(),
            diff_itinerary: BTreeMap::new(),
            order: BTreeMap::new(),
            chosen,
            zone_used: BTreeMap::new(),
            arrival_delay,
            departure_delay,
        };

        match spacing {
            Spacing::Disjunctive => vars.declare_disjunctive(model, problem),
            Spacing::Precedence => vars.declare_precedence(model, problem),
        }

        debug!(
            "Declared {} variables ({:?} spacing, {} precedence pairs, {} order pairs)",
            model.vars.len(),
            spacing,
            vars.prec.len(),
            vars.order.len()
        );
        vars
    }

    fn declare_disjunctive(&mut self, model: &mut Model, problem: &Problem) {
        for (_, group) in problem.occupied_zones() {
            for (a, &i) in group.iter().enumerate() {
                for &j in group[a + 1..].iter() {
                    let var = model.new_bool_var(format!("order[{}][{}]", i, j));
                    self.order.insert((i, j), var);
                }
            }
        }
    }

    fn declare_precedence(&mut self, model: &mut Model, problem: &Problem) {
        for (zone, group) in problem.occupied_zones() {
            let max_rank = group.len() as i64 - 1;
            for &i in group.iter() {
                self.first[i] = Some(model.new_bool_var(format!("first[{}]", i)));
                self.last[i] = Some(model.new_bool_var(format!("last[{}]", i)));
                self.rank[i] =
                    Some(model.new_int_var(format!("rank[{}]", i), Domain::new(0, max_rank)));
            }

            if group.iter().all(|&i| problem.is_optional(i)) {
                let var = model.new_bool_var(format!("zone_used[{}]", zone));
                self.zone_used.insert(zone, var);
            }

            for &i in group.iter() {
                for &j in group.iter().filter(|&&j| j != i) {
                    let prec = model.new_bool_var(format!("prec[{}][{}]", i, j));
                    self.prec.insert((i, j), prec);

                    let name = format!("diff_itinerary[{}][{}]", i, j);
                    let diff = match divergence(problem, i, j) {
                        Divergence::Never => model.new_fixed_bool(name, false),
                        Divergence::Always => model.new_fixed_bool(name, true),
                        Divergence::Depends(_) => model.new_bool_var(name),
                    };
                    self.diff_itinerary.insert((i, j), diff);
                }
            }
        }
    }

    pub fn first(&self, step: StepId) -> Option<VarId> {
        self.first[step]
    }

    pub fn last(&self, step: StepId) -> Option<VarId> {
        self.last[step]
    }
}

/// Whether the trains of two steps leave their shared zone towards
/// different zones.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Divergence {
    Never,
    Always,
    /// Diverges when both successors of one of these pairs are active.
    Depends(Vec<(StepId, StepId)>),
}

pub fn divergence(problem: &Problem, i: StepId, j: StepId) -> Divergence {
    let diverging = problem
        .successors(i)
        .iter()
        .flat_map(|&ni| problem.successors(j).iter().map(move |&nj| (ni, nj)))
        .filter(|&(ni, nj)| problem.step(ni).zone != problem.step(nj).zone)
        .collect::<Vec<_>>();

    if diverging.is_empty() {
        Divergence::Never
    } else if diverging
        .iter()
        .any(|&(ni, nj)| !problem.is_optional(ni) && !problem.is_optional(nj))
    {
        Divergence::Always
    } else {
        Divergence::Depends(diverging)
    }
}

/// Latest reference time plus twice the total occupation, overlap and setup
/// time of all steps.
fn horizon(problem: &Problem, config: &RegulationConfig) -> i64 {
    let total: i64 = problem
        .steps()
        .iter()
        .map(|s| s.min_duration + s.overlap + config.setup_time.max(0))
        .sum();
    problem.latest_min_time() + 2 * total + 1
}
