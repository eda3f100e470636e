use log::debug;

use crate::{
    config::{RegulationConfig, Spacing},
    model::{LinExpr, Literal, Model},
    problem::{Problem, StepId},
    variables::{divergence, Divergence, Variables},
};

/// Adds spacing, chaining, itinerary selection and, when trains must keep
/// their reference order, order preservation.
pub fn add_constraints(
    model: &mut Model,
    problem: &Problem,
    vars: &Variables,
    config: &RegulationConfig,
) {
    let _p = hprof::enter("add constraints");
    let before = model.constraints.len();

    match vars.spacing {
        Spacing::Disjunctive => add_disjunctive_spacing(model, problem, vars, config),
        Spacing::Precedence => add_precedence_spacing(model, problem, vars, config),
    }
    add_chaining(model, problem, vars);
    add_itinerary_selection(model, problem, vars);
    if !config.allow_change_order {
        add_order_preservation(model, problem, vars);
    }

    debug!(
        "Added {} constraints and {} groups",
        model.constraints.len() - before,
        model.groups.len()
    );
}

/// Activity literals of the optional steps among `steps`.
fn activity_guards(problem: &Problem, vars: &Variables, steps: &[StepId]) -> Vec<Literal> {
    steps
        .iter()
        .filter(|s| problem.is_optional(**s))
        .map(|s| Literal::from(vars.active[*s]))
        .collect()
}

fn add_disjunctive_spacing(
    model: &mut Model,
    problem: &Problem,
    vars: &Variables,
    config: &RegulationConfig,
) {
    for (&(i, j), &order) in vars.order.iter() {
        let guards = activity_guards(problem, vars, &[i, j]);
        // Separation is only added where the trains are known to diverge.
        let setup = match divergence(problem, i, j) {
            Divergence::Always => config.setup_time,
            _ => 0,
        };

        let before = Literal::from(order);
        model.add(
            (vars.t_out[i] + setup - vars.t_in[j])
                .leq(0)
                .only_enforce_if(std::iter::once(before).chain(guards.iter().copied()))
                .named(format!("no_overlap[{}<{}]", i, j)),
        );
        model.add(
            (vars.t_out[j] + setup - vars.t_in[i])
                .leq(0)
                .only_enforce_if(std::iter::once(!before).chain(guards.iter().copied()))
                .named(format!("no_overlap[{}<{}]", j, i)),
        );
    }
}

fn add_precedence_spacing(
    model: &mut Model,
    problem: &Problem,
    vars: &Variables,
    config: &RegulationConfig,
) {
    for (zone, group) in problem.occupied_zones() {
        let mut firsts = LinExpr::new();
        let mut lasts = LinExpr::new();

        for &i in group.iter() {
            let (Some(first), Some(last)) = (vars.first(i), vars.last(i)) else {
                continue;
            };
            let active = vars.active[i];
            firsts.add_term(first, 1);
            lasts.add_term(last, 1);

            model.add(LinExpr::from(first).leq(active).named(format!("first_active[{}]", i)));
            model.add(LinExpr::from(last).leq(active).named(format!("last_active[{}]", i)));

            // Exactly one successor (or being last) and exactly one
            // predecessor (or being first) when active, none otherwise.
            let mut outgoing = LinExpr::from(last);
            let mut incoming = LinExpr::from(first);
            for &j in group.iter().filter(|&&j| j != i) {
                outgoing.add_term(vars.prec[&(i, j)], 1);
                incoming.add_term(vars.prec[&(j, i)], 1);
            }
            model.add(outgoing.equals(active).named(format!("successor[{}]", i)));
            model.add(incoming.equals(active).named(format!("predecessor[{}]", i)));
        }

        match vars.zone_used.get(&zone) {
            Some(&used) => {
                for &i in group.iter() {
                    model.add(
                        LinExpr::from(used)
                            .geq(vars.active[i])
                            .named(format!("zone_used[{}][{}]", zone, i)),
                    );
                }
                model.add(firsts.equals(used).named(format!("one_first[{}]", zone)));
                model.add(lasts.equals(used).named(format!("one_last[{}]", zone)));
            }
            None => {
                model.add(firsts.equals(1).named(format!("one_first[{}]", zone)));
                model.add(lasts.equals(1).named(format!("one_last[{}]", zone)));
            }
        }

        for (a, &i) in group.iter().enumerate() {
            for &j in group[a + 1..].iter() {
                model.add(
                    (vars.prec[&(i, j)] + vars.prec[&(j, i)])
                        .leq(1)
                        .named(format!("antisymmetry[{}][{}]", i, j)),
                );
            }
        }

        for &i in group.iter() {
            for &j in group.iter().filter(|&&j| j != i) {
                let prec = vars.prec[&(i, j)];
                let diff = vars.diff_itinerary[&(i, j)];
                model.add(
                    (vars.t_out[i] + diff * config.setup_time - vars.t_in[j])
                        .leq(0)
                        .only_enforce_if([Literal::from(prec)])
                        .named(format!("precedence[{}][{}]", i, j)),
                );

                // Ranks grow along the chain, so it cannot close on itself.
                if let (Some(rank_i), Some(rank_j)) = (vars.rank[i], vars.rank[j]) {
                    model.add(
                        (rank_i - rank_j + 1)
                            .leq(0)
                            .only_enforce_if([Literal::from(prec)])
                            .named(format!("rank[{}][{}]", i, j)),
                    );
                }

                if let Divergence::Depends(pairs) = divergence(problem, i, j) {
                    for (ni, nj) in pairs {
                        model.add(
                            LinExpr::from(diff)
                                .geq(vars.active[ni] + vars.active[nj] - 1)
                                .named(format!("diverge[{}][{}]", i, j)),
                        );
                    }
                }
            }
        }
    }
}

/// Entry of a step is its predecessor's exit minus the overlap.
fn add_chaining(model: &mut Model, problem: &Problem, vars: &Variables) {
    for step in problem.steps().iter() {
        let Some(prev) = step.prev else { continue };
        let n = step.index;
        model.add(
            (vars.t_in[n] - vars.t_out[prev] + step.overlap)
                .equals(0)
                .only_enforce_if(activity_guards(problem, vars, &[n, prev]))
                .named(format!("chaining[{}]", n)),
        );
    }
}

fn add_itinerary_selection(model: &mut Model, problem: &Problem, vars: &Variables) {
    for (option, opt) in problem.options().iter_enumerated() {
        let chosen = &vars.chosen[option];
        model.add_exactly_one(format!("itinerary[{}]", option), chosen.clone());

        for (k, itinerary) in opt.itineraries.iter().enumerate() {
            for &step in itinerary.steps.iter() {
                model.add(
                    LinExpr::from(vars.active[step])
                        .equals(chosen[k])
                        .named(format!("selected[{}][{}]", option, step)),
                );
            }
        }
    }
}

/// Steps entering a zone earlier in the reference keep entering it first.
fn add_order_preservation(model: &mut Model, problem: &Problem, vars: &Variables) {
    for (_, group) in problem.occupied_zones() {
        for &i in group.iter() {
            for &j in group.iter() {
                if problem.step(i).min_t_in < problem.step(j).min_t_in {
                    model.add(
                        (vars.t_in[i] - vars.t_in[j])
                            .leq(-1)
                            .only_enforce_if(activity_guards(problem, vars, &[i, j]))
                            .named(format!("keep_order[{}][{}]", i, j)),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use typed_index_collections::TiVec;

    use super::*;
    use crate::{
        builder::{ProblemBuilder, StepSpec},
        config::SpacingFormulation,
        model::{ModelViolation, VarId},
    };

    /// Straight line: two trains crossing zones 0 then 1.
    fn straight_line() -> Problem {
        let mut b = ProblemBuilder::new(2, 2);
        let a = b.add_step(StepSpec::new(0usize, 0usize, None, 0, 10, 10, false));
        b.add_step(StepSpec::new(0usize, 1usize, Some(a), 10, 20, 20, false));
        let c = b.add_step(StepSpec::new(1usize, 0usize, None, 10, 20, 10, false));
        b.add_step(StepSpec::new(1usize, 1usize, Some(c), 20, 30, 10, false));
        b.build().unwrap()
    }

    fn build(problem: &Problem, config: &RegulationConfig) -> (Model, Variables) {
        let mut model = Model::new();
        let vars = Variables::declare(&mut model, problem, config);
        add_constraints(&mut model, problem, &vars, config);
        (model, vars)
    }

    /// Assignment from step timings, `order`/`prec` decided by entry time.
    fn assign(
        model: &Model,
        problem: &Problem,
        vars: &Variables,
        t_in: &[i64],
        t_out: &[i64],
    ) -> TiVec<VarId, i64> {
        let mut values: TiVec<VarId, i64> = model.vars.iter().map(|v| v.domain.lb).collect();
        for step in problem.steps().iter() {
            let i = usize::from(step.index);
            values[vars.t_in[step.index]] = t_in[i];
            values[vars.t_out[step.index]] = t_out[i];
            values[vars.duration[step.index]] = t_out[i] - t_in[i];
            values[vars.active[step.index]] = 1;
        }
        for (&(i, j), &o) in vars.order.iter() {
            values[o] = (t_in[usize::from(i)] <= t_in[usize::from(j)]) as i64;
        }
        for (_, group) in problem.occupied_zones() {
            let mut sorted = group.to_vec();
            sorted.sort_by_key(|s| t_in[usize::from(*s)]);
            if let Some(first) = vars.first(sorted[0]) {
                values[first] = 1;
            }
            if let Some(last) = vars.last(sorted[sorted.len() - 1]) {
                values[last] = 1;
            }
            for w in sorted.windows(2) {
                if let Some(p) = vars.prec.get(&(w[0], w[1])) {
                    values[*p] = 1;
                }
            }
            for (pos, s) in sorted.iter().enumerate() {
                if let Some(rank) = vars.rank[*s] {
                    values[rank] = pos as i64;
                }
            }
        }
        values
    }

    #[test]
    fn accepts_regulated_straight_line() {
        let problem = straight_line();
        for spacing in [SpacingFormulation::Disjunctive, SpacingFormulation::Precedence] {
            let config = RegulationConfig {
                spacing,
                ..RegulationConfig::default()
            };
            let (model, vars) = build(&problem, &config);
            let values = assign(&model, &problem, &vars, &[0, 10, 10, 30], &[10, 30, 30, 40]);
            assert_eq!(model.violated_constraint(&values), None, "{:?}", spacing);
        }
    }

    #[test]
    fn rejects_overlapping_occupations() {
        let problem = straight_line();
        for spacing in [SpacingFormulation::Disjunctive, SpacingFormulation::Precedence] {
            let config = RegulationConfig {
                spacing,
                ..RegulationConfig::default()
            };
            let (model, vars) = build(&problem, &config);
            // Train 1 enters zone 1 while train 0 is still there.
            let values = assign(&model, &problem, &vars, &[0, 10, 10, 20], &[10, 30, 20, 30]);
            match model.violated_constraint(&values) {
                Some(ModelViolation::Constraint(idx)) => {
                    let name = &model.constraints[idx].name;
                    assert!(
                        name.starts_with("no_overlap") || name.starts_with("precedence"),
                        "{}",
                        name
                    );
                }
                other => panic!("expected a spacing violation, got {:?}", other),
            }
        }
    }

    #[test]
    fn rejects_broken_chaining() {
        let problem = straight_line();
        let (model, vars) = build(&problem, &RegulationConfig::default());
        let values = assign(&model, &problem, &vars, &[0, 12, 10, 32], &[10, 32, 30, 42]);
        let Some(ModelViolation::Constraint(idx)) = model.violated_constraint(&values) else {
            panic!("chaining gap accepted");
        };
        assert_eq!(model.constraints[idx].name, "chaining[s1]");
    }

    /// Train 0 holds zone 0 over [0, 10]; trains 1 to 3 come from zones 1 to
    /// 3 and cross zone 0 in no time.
    fn crossings() -> Problem {
        let mut b = ProblemBuilder::new(4, 4);
        b.add_step(StepSpec::new(0usize, 0usize, None, 0, 10, 10, true));
        for train in 1..4usize {
            let origin = b.add_step(StepSpec::new(train, train, None, 0, 5, 5, false));
            b.add_step(StepSpec::new(train, 0usize, Some(origin), 5, 5, 0, false));
        }
        b.build().unwrap()
    }

    #[test]
    fn rejects_precedence_cycles() {
        let problem = crossings();
        let config = RegulationConfig {
            spacing: SpacingFormulation::Precedence,
            ..RegulationConfig::default()
        };
        let (model, vars) = build(&problem, &config);
        let t_in = [0, 0, 5, 0, 5, 0, 5];
        let t_out = [10, 5, 5, 5, 5, 5, 5];
        let mut values = assign(&model, &problem, &vars, &t_in, &t_out);

        // Train 0 is alone in the chain while the crossings loop among
        // themselves in the middle of its occupation.
        let (s0, c1, c2, c3) = (
            StepId::from(0),
            StepId::from(2),
            StepId::from(4),
            StepId::from(6),
        );
        for &i in [s0, c1, c2, c3].iter() {
            values[vars.first(i).unwrap()] = (i == s0) as i64;
            values[vars.last(i).unwrap()] = (i == s0) as i64;
        }
        for (_, &p) in vars.prec.iter() {
            values[p] = 0;
        }
        for pair in [(c1, c2), (c2, c3), (c3, c1)] {
            values[vars.prec[&pair]] = 1;
        }

        let Some(ModelViolation::Constraint(idx)) = model.violated_constraint(&values) else {
            panic!("precedence cycle accepted");
        };
        assert!(model.constraints[idx].name.starts_with("rank["));
    }

    /// Trains coming from zones 0 and 1 merge into zone 2.
    fn merge() -> Problem {
        let mut b = ProblemBuilder::new(3, 2);
        let a = b.add_step(StepSpec::new(0usize, 0usize, None, 0, 10, 10, false));
        b.add_step(StepSpec::new(0usize, 2usize, Some(a), 10, 20, 10, false));
        let c = b.add_step(StepSpec::new(1usize, 1usize, None, 5, 15, 10, false));
        b.add_step(StepSpec::new(1usize, 2usize, Some(c), 15, 25, 10, false));
        b.build().unwrap()
    }

    #[test]
    fn order_preservation() {
        let problem = merge();
        // Train 1 takes zone 2 first, train 0 waits in zone 0.
        let (t_in, t_out) = ([0, 25, 5, 15], [25, 35, 15, 25]);

        let (model, vars) = build(&problem, &RegulationConfig::default());
        let values = assign(&model, &problem, &vars, &t_in, &t_out);
        assert_eq!(model.violated_constraint(&values), None);

        let config = RegulationConfig {
            allow_change_order: false,
            ..RegulationConfig::default()
        };
        let (model, vars) = build(&problem, &config);
        let values = assign(&model, &problem, &vars, &t_in, &t_out);
        let Some(ModelViolation::Constraint(idx)) = model.violated_constraint(&values) else {
            panic!("reordering accepted");
        };
        assert_eq!(model.constraints[idx].name, "keep_order[s1][s3]");
    }

    #[test]
    fn setup_time_between_diverging_trains() {
        let mut b = ProblemBuilder::new(3, 2);
        let a = b.add_step(StepSpec::new(0usize, 0usize, None, 0, 10, 10, false));
        b.add_step(StepSpec::new(0usize, 1usize, Some(a), 10, 20, 10, false));
        let c = b.add_step(StepSpec::new(1usize, 0usize, None, 13, 23, 10, false));
        b.add_step(StepSpec::new(1usize, 2usize, Some(c), 23, 33, 10, false));
        let problem = b.build().unwrap();
        let (t_in, t_out) = ([0, 10, 13, 23], [10, 20, 23, 33]);

        let config = RegulationConfig {
            setup_time: 3,
            ..RegulationConfig::default()
        };
        let (model, vars) = build(&problem, &config);
        assert_eq!(vars.spacing, Spacing::Precedence);
        assert_eq!(model.fixed_value(vars.diff_itinerary[&(a, c)]), Some(1));
        let values = assign(&model, &problem, &vars, &t_in, &t_out);
        assert_eq!(model.violated_constraint(&values), None);

        let config = RegulationConfig {
            setup_time: 4,
            ..RegulationConfig::default()
        };
        let (model, vars) = build(&problem, &config);
        let values = assign(&model, &problem, &vars, &t_in, &t_out);
        let Some(ModelViolation::Constraint(idx)) = model.violated_constraint(&values) else {
            panic!("setup time ignored");
        };
        assert_eq!(model.constraints[idx].name, "precedence[s0][s2]");
    }

    #[test]
    fn itinerary_selection_activates_one_branch() {
        let mut b = ProblemBuilder::new(3, 1);
        let a = b.add_step(StepSpec::new(0usize, 0usize, None, 0, 10, 10, false));
        let d1 = b.add_step(StepSpec::new(0usize, 1usize, Some(a), 10, 20, 10, false));
        let d2 = b.add_step(StepSpec::new(0usize, 2usize, Some(a), 10, 20, 10, false));
        b.add_itinerary_option("junction", vec![vec![d1], vec![d2]]);
        let problem = b.build().unwrap();

        let (model, vars) = build(&problem, &RegulationConfig::default());
        let mut values = assign(&model, &problem, &vars, &[0, 10, 10], &[10, 20, 20]);
        let option = crate::problem::OptionId::from(0);

        // Both branches active.
        assert!(model.violated_constraint(&values).is_some());

        values[vars.active[d2]] = 0;
        values[vars.chosen[option][0]] = 1;
        values[vars.chosen[option][1]] = 0;
        values[vars.arrival_delay[d1].unwrap()] = 0;
        for &s in [a, d1, d2].iter() {
            if let (Some(f), Some(l)) = (vars.first(s), vars.last(s)) {
                values[f] = values[vars.active[s]];
                values[l] = values[vars.active[s]];
            }
        }
        for used in vars.zone_used.values() {
            values[*used] = 0;
        }
        values[vars.zone_used[&crate::problem::ZoneId::from(1)]] = 1;
        assert_eq!(model.violated_constraint(&values), None);
    }
}
