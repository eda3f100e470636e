//! Solving engines. Guarded constraints are linearised with one big-M per
//! constraint, computed from variable bounds clamped to the model horizon.

#[cfg(feature = "gurobi")]
pub mod gurobi;
pub mod microlp;

use typed_index_collections::TiVec;

use crate::model::{GroupKind, LinExpr, Literal, Model, Relation, VarId};

/// `Σ coef·var (≤|=|≥) rhs` without guards.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub terms: Vec<(VarId, f64)>,
    pub relation: Relation,
    pub rhs: f64,
    pub name: String,
}

/// Variable bounds with unbounded upper ends clamped to the horizon.
pub fn finite_bounds(model: &Model) -> TiVec<VarId, (i64, i64)> {
    model
        .vars
        .iter()
        .map(|v| {
            let ub = if v.domain.is_bounded() {
                v.domain.ub
            } else {
                model.horizon.max(v.domain.lb)
            };
            (v.domain.lb, ub)
        })
        .collect()
}

fn max_value(expr: &LinExpr, bounds: &TiVec<VarId, (i64, i64)>) -> i64 {
    expr.terms
        .iter()
        .map(|&(var, coef)| {
            let (lb, ub) = bounds[var];
            if coef > 0 {
                coef * ub
            } else {
                coef * lb
            }
        })
        .sum::<i64>()
        + expr.constant
}

fn unguarded(expr: &LinExpr, relation: Relation, name: &str) -> Row {
    Row {
        terms: expr.terms.iter().map(|&(v, c)| (v, c as f64)).collect(),
        relation,
        rhs: -expr.constant as f64,
        name: name.to_string(),
    }
}

/// `expr ≤ M·Σ(1 - lit)`.
fn guarded_leq(
    expr: &LinExpr,
    guards: &[Literal],
    bounds: &TiVec<VarId, (i64, i64)>,
    name: String,
) -> Row {
    let big_m = max_value(expr, bounds).max(0) as f64;
    let mut row = unguarded(expr, Relation::Le, "");
    row.name = name;
    for lit in guards {
        if lit.positive {
            row.terms.push((lit.var, big_m));
            row.rhs += big_m;
        } else {
            row.terms.push((lit.var, -big_m));
        }
    }
    row
}

/// Every constraint and group of the model as plain linear rows.
pub fn linearize(model: &Model) -> Vec<Row> {
    let _p = hprof::enter("linearize");
    let bounds = finite_bounds(model);
    let mut rows = Vec::new();

    for (idx, c) in model.constraints.iter().enumerate() {
        let name = if c.name.is_empty() {
            format!("c{}", idx)
        } else {
            c.name.clone()
        };

        if c.enforce_if.is_empty() {
            rows.push(unguarded(&c.expr, c.relation, &name));
            continue;
        }

        if matches!(c.relation, Relation::Le | Relation::Eq) {
            rows.push(guarded_leq(&c.expr, &c.enforce_if, &bounds, format!("{}_le", name)));
        }
        if matches!(c.relation, Relation::Ge | Relation::Eq) {
            let negated = -c.expr.clone();
            rows.push(guarded_leq(&negated, &c.enforce_if, &bounds, format!("{}_ge", name)));
        }
    }

    for group in model.groups.iter() {
        rows.push(Row {
            terms: group.vars.iter().map(|&v| (v, 1.0)).collect(),
            relation: match group.kind {
                GroupKind::ExactlyOne => Relation::Eq,
                GroupKind::AtMostOne => Relation::Le,
            },
            rhs: 1.0,
            name: group.name.clone(),
        });
    }

    rows
}

/// Nearest integer of every engine value.
pub fn round_values(values: impl IntoIterator<Item = f64>) -> TiVec<VarId, i64> {
    values.into_iter().map(|v| v.round() as i64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Domain;

    fn satisfied(row: &Row, values: &[f64]) -> bool {
        let lhs: f64 = row
            .terms
            .iter()
            .map(|&(v, c)| c * values[usize::from(v)])
            .sum();
        match row.relation {
            Relation::Le => lhs <= row.rhs + 1e-9,
            Relation::Eq => (lhs - row.rhs).abs() < 1e-9,
            Relation::Ge => lhs >= row.rhs - 1e-9,
        }
    }

    #[test]
    fn big_m_relaxes_inactive_guards() {
        let mut model = Model::new();
        model.horizon = 100;
        let x = model.new_int_var("x", Domain::at_least(0));
        let y = model.new_int_var("y", Domain::at_least(0));
        let b = model.new_bool_var("b");
        model.add(
            (x - y)
                .equals(5)
                .only_enforce_if([Literal::from(b)])
                .named("gap"),
        );

        let rows = linearize(&model);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "gap_le");

        // b = 1 binds.
        assert!(rows.iter().all(|r| satisfied(r, &[12.0, 7.0, 1.0])));
        assert!(!rows.iter().all(|r| satisfied(r, &[12.0, 8.0, 1.0])));
        // b = 0 frees any pair within the horizon.
        assert!(rows.iter().all(|r| satisfied(r, &[0.0, 100.0, 0.0])));
        assert!(rows.iter().all(|r| satisfied(r, &[100.0, 0.0, 0.0])));
    }

    #[test]
    fn negated_guard_and_groups() {
        let mut model = Model::new();
        model.horizon = 50;
        let x = model.new_int_var("x", Domain::new(0, 20));
        let b = model.new_bool_var("b");
        let c = model.new_bool_var("c");
        model.add(LinExpr::from(x).leq(3).only_enforce_if([!Literal::from(b)]));
        model.add_exactly_one("pick", vec![b, c]);

        let rows = linearize(&model);
        assert_eq!(rows[0].name, "c0_le");
        assert!(satisfied(&rows[0], &[3.0, 0.0, 0.0]));
        assert!(!satisfied(&rows[0], &[4.0, 0.0, 0.0]));
        assert!(satisfied(&rows[0], &[20.0, 1.0, 0.0]));
        assert_eq!(rows[1].relation, Relation::Eq);
        assert_eq!(rows[1].rhs, 1.0);
        assert_eq!(finite_bounds(&model)[x], (0, 20));
    }
}
