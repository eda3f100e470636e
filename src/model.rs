//! Finite-domain integer model handed to a solving engine: bounded integer
//! variables, linear constraints that may be guarded by boolean literals,
//! one-hot groups and a linear objective to minimise.

use std::ops::{Add, Mul, Neg, Sub};

use derive_more::{Display, From, Into};
use typed_index_collections::{TiSlice, TiVec};

use crate::problem::Time;

/// Upper bound meaning "no upper bound". Never used in arithmetic.
pub const UNBOUNDED: Time = Time::MAX;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, From, Into, Display)]
#[display(fmt = "v{}", _0)]
pub struct VarId(usize);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Domain {
    pub lb: i64,
    pub ub: i64,
}

impl Domain {
    pub fn new(lb: i64, ub: i64) -> Self {
        Domain { lb, ub }
    }

    pub fn at_least(lb: i64) -> Self {
        Domain { lb, ub: UNBOUNDED }
    }

    pub fn fixed(value: i64) -> Self {
        Domain {
            lb: value,
            ub: value,
        }
    }

    pub fn boolean() -> Self {
        Domain { lb: 0, ub: 1 }
    }

    pub fn is_bounded(&self) -> bool {
        self.ub != UNBOUNDED
    }

    pub fn contains(&self, value: i64) -> bool {
        self.lb <= value && (!self.is_bounded() || value <= self.ub)
    }
}

#[derive(Clone, Debug)]
pub struct Variable {
    pub name: String,
    pub domain: Domain,
    pub is_bool: bool,
}

/// `Σ coef·var + constant`.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct LinExpr {
    pub terms: Vec<(VarId, i64)>,
    pub constant: i64,
}

impl LinExpr {
    pub fn new() -> Self {
        LinExpr::default()
    }

    pub fn constant(value: i64) -> Self {
        LinExpr {
            terms: Vec::new(),
            constant: value,
        }
    }

    pub fn add_term(&mut self, var: VarId, coef: i64) -> &mut Self {
        if coef != 0 {
            self.terms.push((var, coef));
        }
        self
    }

    pub fn add_constant(&mut self, value: i64) -> &mut Self {
        self.constant += value;
        self
    }

    pub fn eval(&self, values: &TiSlice<VarId, i64>) -> i64 {
        self.terms
            .iter()
            .map(|(var, coef)| coef * values[*var])
            .sum::<i64>()
            + self.constant
    }

    pub fn leq(self, rhs: impl Into<LinExpr>) -> LinearConstraint {
        LinearConstraint::new(self - rhs.into(), Relation::Le)
    }

    pub fn geq(self, rhs: impl Into<LinExpr>) -> LinearConstraint {
        LinearConstraint::new(self - rhs.into(), Relation::Ge)
    }

    pub fn equals(self, rhs: impl Into<LinExpr>) -> LinearConstraint {
        LinearConstraint::new(self - rhs.into(), Relation::Eq)
    }
}

impl From<VarId> for LinExpr {
    fn from(var: VarId) -> Self {
        LinExpr {
            terms: vec![(var, 1)],
            constant: 0,
        }
    }
}

impl From<i64> for LinExpr {
    fn from(value: i64) -> Self {
        LinExpr::constant(value)
    }
}

impl From<i32> for LinExpr {
    fn from(value: i32) -> Self {
        LinExpr::constant(value as i64)
    }
}

impl<T: Into<LinExpr>> Add<T> for LinExpr {
    type Output = LinExpr;
    fn add(mut self, rhs: T) -> LinExpr {
        let rhs = rhs.into();
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
        self
    }
}

impl<T: Into<LinExpr>> Sub<T> for LinExpr {
    type Output = LinExpr;
    fn sub(self, rhs: T) -> LinExpr {
        self + (-rhs.into())
    }
}

impl Neg for LinExpr {
    type Output = LinExpr;
    fn neg(mut self) -> LinExpr {
        for (_, coef) in self.terms.iter_mut() {
            *coef = -*coef;
        }
        self.constant = -self.constant;
        self
    }
}

impl Mul<i64> for LinExpr {
    type Output = LinExpr;
    fn mul(mut self, rhs: i64) -> LinExpr {
        self.terms.retain(|_| rhs != 0);
        for (_, coef) in self.terms.iter_mut() {
            *coef *= rhs;
        }
        self.constant *= rhs;
        self
    }
}

impl<T: Into<LinExpr>> Add<T> for VarId {
    type Output = LinExpr;
    fn add(self, rhs: T) -> LinExpr {
        LinExpr::from(self) + rhs
    }
}

impl<T: Into<LinExpr>> Sub<T> for VarId {
    type Output = LinExpr;
    fn sub(self, rhs: T) -> LinExpr {
        LinExpr::from(self) - rhs
    }
}

impl Mul<i64> for VarId {
    type Output = LinExpr;
    fn mul(self, rhs: i64) -> LinExpr {
        LinExpr::from(self) * rhs
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Relation {
    Le,
    Eq,
    Ge,
}

/// A boolean variable taken positively or negated.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Literal {
    pub var: VarId,
    pub positive: bool,
}

impl Literal {
    pub fn holds(&self, values: &TiSlice<VarId, i64>) -> bool {
        (values[self.var] != 0) == self.positive
    }
}

impl From<VarId> for Literal {
    fn from(var: VarId) -> Self {
        Literal {
            var,
            positive: true,
        }
    }
}

impl std::ops::Not for Literal {
    type Output = Literal;
    fn not(self) -> Literal {
        Literal {
            var: self.var,
            positive: !self.positive,
        }
    }
}

/// `expr (≤|=|≥) 0`, enforced only when every literal of `enforce_if` holds.
#[derive(Clone, Debug)]
pub struct LinearConstraint {
    pub expr: LinExpr,
    pub relation: Relation,
    pub enforce_if: Vec<Literal>,
    pub name: String,
}

impl LinearConstraint {
    pub fn new(expr: LinExpr, relation: Relation) -> Self {
        LinearConstraint {
            expr,
            relation,
            enforce_if: Vec::new(),
            name: String::new(),
        }
    }

    pub fn only_enforce_if(mut self, literals: impl IntoIterator<Item = Literal>) -> Self {
        self.enforce_if.extend(literals);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn is_satisfied(&self, values: &TiSlice<VarId, i64>) -> bool {
        if !self.enforce_if.iter().all(|lit| lit.holds(values)) {
            return true;
        }
        let value = self.expr.eval(values);
        match self.relation {
            Relation::Le => value <= 0,
            Relation::Eq => value == 0,
            Relation::Ge => value >= 0,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GroupKind {
    ExactlyOne,
    AtMostOne,
}

#[derive(Clone, Debug)]
pub struct BoolGroup {
    pub kind: GroupKind,
    pub vars: Vec<VarId>,
    pub name: String,
}

impl BoolGroup {
    pub fn is_satisfied(&self, values: &TiSlice<VarId, i64>) -> bool {
        let count = self.vars.iter().filter(|v| values[**v] != 0).count();
        match self.kind {
            GroupKind::ExactlyOne => count == 1,
            GroupKind::AtMostOne => count <= 1,
        }
    }
}

/// What a model evaluation found wrong with an assignment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelViolation {
    Domain(VarId),
    Constraint(usize),
    Group(usize),
}

#[derive(Clone, Debug, Default)]
pub struct Model {
    pub vars: TiVec<VarId, Variable>,
    pub constraints: Vec<LinearConstraint>,
    pub groups: Vec<BoolGroup>,
    pub objective: LinExpr,
    /// No time variable needs to exceed this value in an optimal schedule.
    /// Engines that need finite bounds clamp unbounded domains to it.
    pub horizon: i64,
}

impl Model {
    pub fn new() -> Self {
        Model::default()
    }

    pub fn new_int_var(&mut self, name: impl Into<String>, domain: Domain) -> VarId {
        self.vars.push_and_get_key(Variable {
            name: name.into(),
            domain,
            is_bool: false,
        })
    }

    pub fn new_bool_var(&mut self, name: impl Into<String>) -> VarId {
        self.vars.push_and_get_key(Variable {
            name: name.into(),
            domain: Domain::boolean(),
            is_bool: true,
        })
    }

    /// Boolean variable whose value is already known.
    pub fn new_fixed_bool(&mut self, name: impl Into<String>, value: bool) -> VarId {
        self.vars.push_and_get_key(Variable {
            name: name.into(),
            domain: Domain::fixed(value as i64),
            is_bool: true,
        })
    }

    pub fn add(&mut self, constraint: LinearConstraint) {
        self.constraints.push(constraint);
    }

    pub fn add_exactly_one(&mut self, name: impl Into<String>, vars: Vec<VarId>) {
        self.groups.push(BoolGroup {
            kind: GroupKind::ExactlyOne,
            vars,
            name: name.into(),
        });
    }

    pub fn add_at_most_one(&mut self, name: impl Into<String>, vars: Vec<VarId>) {
        self.groups.push(BoolGroup {
            kind: GroupKind::AtMostOne,
            vars,
            name: name.into(),
        });
    }

    pub fn minimize(&mut self, objective: LinExpr) {
        self.objective = objective;
    }

    pub fn domain(&self, var: VarId) -> Domain {
        self.vars[var].domain
    }

    /// Whether the variable can only take one value.
    pub fn fixed_value(&self, var: VarId) -> Option<i64> {
        let d = self.vars[var].domain;
        (d.lb == d.ub).then_some(d.lb)
    }

    /// First part of the model the assignment breaks, if any.
    pub fn violated_constraint(&self, values: &TiSlice<VarId, i64>) -> Option<ModelViolation> {
        if let Some((var, _)) = self
            .vars
            .iter_enumerated()
            .find(|(var, v)| !v.domain.contains(values[*var]))
        {
            return Some(ModelViolation::Domain(var));
        }
        if let Some(idx) = self.constraints.iter().position(|c| !c.is_satisfied(values)) {
            return Some(ModelViolation::Constraint(idx));
        }
        if let Some(idx) = self.groups.iter().position(|g| !g.is_satisfied(values)) {
            return Some(ModelViolation::Group(idx));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vals(values: Vec<i64>) -> TiVec<VarId, i64> {
        values.into()
    }

    #[test]
    fn expression_arithmetic() {
        let mut model = Model::new();
        let x = model.new_int_var("x", Domain::at_least(0));
        let y = model.new_int_var("y", Domain::new(0, 10));

        let e = (x - y) * 3 + 4;
        let values = vals(vec![5, 2]);
        assert_eq!(e.eval(&values), 13);
        assert_eq!((-(x + 1)).eval(&values), -6);
        assert_eq!((y * 0).terms.len(), 0);
    }

    #[test]
    fn guarded_constraint_only_binds_when_guard_holds() {
        let mut model = Model::new();
        let x = model.new_int_var("x", Domain::at_least(0));
        let b = model.new_bool_var("b");
        model.add(LinExpr::from(x).leq(3).only_enforce_if([Literal::from(b)]));
        model.add(LinExpr::from(x).geq(5).only_enforce_if([!Literal::from(b)]));

        assert_eq!(model.violated_constraint(&vals(vec![7, 0])), None);
        assert_eq!(
            model.violated_constraint(&vals(vec![7, 1])),
            Some(ModelViolation::Constraint(0))
        );
        assert_eq!(
            model.violated_constraint(&vals(vec![4, 0])),
            Some(ModelViolation::Constraint(1))
        );
        assert_eq!(
            model.violated_constraint(&vals(vec![-1, 1])),
            Some(ModelViolation::Domain(x))
        );
    }

    #[test]
    fn groups() {
        let mut model = Model::new();
        let a = model.new_bool_var("a");
        let b = model.new_bool_var("b");
        model.add_exactly_one("pick", vec![a, b]);
        assert_eq!(model.violated_constraint(&vals(vec![1, 0])), None);
        assert_eq!(
            model.violated_constraint(&vals(vec![1, 1])),
            Some(ModelViolation::Group(0))
        );
        assert_eq!(
            model.violated_constraint(&vals(vec![0, 0])),
            Some(ModelViolation::Group(0))
        );
        assert!(Domain::at_least(3).contains(i64::MAX - 1));
        assert!(!Domain::fixed(2).contains(3));
    }
}
