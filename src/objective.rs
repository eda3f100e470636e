use crate::{
    config::RegulationConfig,
    model::{LinExpr, Model},
    problem::Problem,
    variables::Variables,
};

/// Weighted entry delay of every step, plus weighted exit delay when
/// `penalize_departure` is set. Optional steps contribute through their
/// delay variables, which are free to be zero while the step is inactive.
pub fn objective(problem: &Problem, vars: &Variables, config: &RegulationConfig) -> LinExpr {
    let mut expr = LinExpr::new();
    for step in problem.steps().iter() {
        let i = step.index;
        let w = step.ponderation;
        match vars.arrival_delay[i] {
            Some(delay) => {
                expr.add_term(delay, w);
            }
            None => {
                expr.add_term(vars.t_in[i], w);
                expr.add_constant(-w * step.min_t_in);
            }
        }

        if config.penalize_departure {
            match vars.departure_delay[i] {
                Some(delay) => {
                    expr.add_term(delay, w);
                }
                None => {
                    expr.add_term(vars.t_out[i], w);
                    expr.add_constant(-w * step.min_t_out);
                }
            }
        }
    }
    expr
}

pub fn set_objective(
    model: &mut Model,
    problem: &Problem,
    vars: &Variables,
    config: &RegulationConfig,
) {
    model.minimize(objective(problem, vars, config));
}

#[cfg(test)]
mod tests {
    use typed_index_collections::TiVec;

    use super::*;
    use crate::{
        builder::{ProblemBuilder, StepSpec},
        model::VarId,
        problem::StepId,
    };

    fn problem() -> Problem {
        let mut b = ProblemBuilder::new(2, 1);
        let a = b.add_step(StepSpec::new(0usize, 0usize, None, 0, 10, 10, false));
        b.add_step(StepSpec::new(0usize, 1usize, Some(a), 10, 20, 10, false).ponderation(3));
        b.build().unwrap()
    }

    #[test]
    fn weighted_entry_delay() {
        let problem = problem();
        let config = RegulationConfig::default();
        let mut model = Model::new();
        let vars = Variables::declare(&mut model, &problem, &config);
        set_objective(&mut model, &problem, &vars, &config);

        let mut values: TiVec<VarId, i64> = model.vars.iter().map(|v| v.domain.lb).collect();
        values[vars.t_in[StepId::from(1)]] = 14;
        values[vars.t_out[StepId::from(1)]] = 30;
        assert_eq!(model.objective.eval(&values), 12);
    }

    #[test]
    fn departure_delay_when_charged() {
        let problem = problem();
        let config = RegulationConfig {
            penalize_departure: true,
            ..RegulationConfig::default()
        };
        let mut model = Model::new();
        let vars = Variables::declare(&mut model, &problem, &config);
        set_objective(&mut model, &problem, &vars, &config);

        let mut values: TiVec<VarId, i64> = model.vars.iter().map(|v| v.domain.lb).collect();
        values[vars.t_out[StepId::from(0)]] = 12;
        values[vars.t_in[StepId::from(1)]] = 12;
        values[vars.t_out[StepId::from(1)]] = 25;
        // 3 * 2 on entry, then 2 + 3 * 5 on exit.
        assert_eq!(model.objective.eval(&values), 23);
    }

    #[test]
    fn optional_steps_go_through_delay_variables() {
        let mut b = ProblemBuilder::new(3, 1);
        let a = b.add_step(StepSpec::new(0usize, 0usize, None, 0, 10, 10, false));
        let d1 = b.add_step(StepSpec::new(0usize, 1usize, Some(a), 10, 20, 10, false));
        let d2 = b.add_step(StepSpec::new(0usize, 2usize, Some(a), 10, 20, 10, false));
        b.add_itinerary_option("junction", vec![vec![d1], vec![d2]]);
        let problem = b.build().unwrap();

        let config = RegulationConfig::default();
        let mut model = Model::new();
        let vars = Variables::declare(&mut model, &problem, &config);
        let expr = objective(&problem, &vars, &config);

        let delay = vars.arrival_delay[d2].unwrap();
        assert!(expr.terms.contains(&(delay, 1)));
        assert!(!expr.terms.iter().any(|(v, _)| *v == vars.t_in[d2]));
        assert!(expr.terms.contains(&(vars.t_in[a], 1)));
        assert_eq!(expr.constant, 0);
    }
}
