//! Declarative rule trees.
//!
//! A strategy is an if / else-if chain of `ConditionSet`s. Each set guards an
//! `Action` with an `Operator` tree whose leaves are `Condition`s comparing a
//! snapshot field to an `Expression`. Evaluation is pure and never fails:
//! missing fields and mismatched types degrade to `false`.

use chrono::Duration;
use std::cmp::Ordering;
use std::fmt;

use super::snapshot::Snapshot;

// ---------------------------------------------------------------------------
// Values and expressions
// ---------------------------------------------------------------------------

/// A typed value read from a snapshot or written as a literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Duration(Duration),
    Bool(bool),
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Empty,
    Constant(Value),
    Field(String),
}

impl Expression {
    pub fn field(name: &str) -> Self {
        Expression::Field(name.to_string())
    }

    pub fn calculate(&self, snapshot: &Snapshot) -> Option<Value> {
        match self {
            Expression::Empty => None,
            Expression::Constant(value) => Some(*value),
            Expression::Field(name) => snapshot.get(name),
        }
    }

    /// Snapshot field this expression reads, if any.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Expression::Field(name) => Some(name),
            _ => None,
        }
    }
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Expression::Constant(value)
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Greater,
    Less,
    Equal,
    NotEqual,
    LessOrEqual,
    GreaterOrEqual,
    None,
}

impl Comparison {
    fn holds(&self, ordering: Option<Ordering>) -> bool {
        let Some(ordering) = ordering else {
            return false;
        };
        match self {
            Comparison::Greater => ordering == Ordering::Greater,
            Comparison::Less => ordering == Ordering::Less,
            Comparison::Equal => ordering == Ordering::Equal,
            Comparison::NotEqual => ordering != Ordering::Equal,
            Comparison::LessOrEqual => ordering != Ordering::Greater,
            Comparison::GreaterOrEqual => ordering != Ordering::Less,
            Comparison::None => false,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Comparison::Greater => ">",
            Comparison::Less => "<",
            Comparison::Equal => "==",
            Comparison::NotEqual => "!=",
            Comparison::LessOrEqual => "<=",
            Comparison::GreaterOrEqual => ">=",
            Comparison::None => "NONE",
        };
        write!(f, "{symbol}")
    }
}

/// Condition modifier.
///
/// `Not` is accepted and kept on the tree but has no effect on evaluation:
/// no shipped strategy uses it and its semantics are not settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Not,
}

/// `field <comparison> expression`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub modifier: Option<Modifier>,
    pub field: String,
    pub comparison: Comparison,
    pub value: Expression,
}

impl Condition {
    pub fn new(field: &str, comparison: Comparison, value: impl Into<Expression>) -> Self {
        Self {
            modifier: None,
            field: field.to_string(),
            comparison,
            value: value.into(),
        }
    }

    /// Condition on a boolean field; the comparison and value are ignored.
    pub fn flag(field: &str) -> Self {
        Self::new(field, Comparison::None, Expression::Empty)
    }

    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifier = Some(modifier);
        self
    }

    pub fn evaluate(&self, snapshot: &Snapshot) -> bool {
        let left = match snapshot.get(&self.field) {
            Some(Value::Bool(flag)) => return flag,
            Some(value) => value,
            None => return false,
        };
        let Some(right) = self.value.calculate(snapshot) else {
            return false;
        };

        let ordering = match (left, right) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(&b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(&b),
            (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(&b)),
            _ => return false,
        };
        self.comparison.holds(ordering)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifier == Some(Modifier::Not) {
            write!(f, "NOT ")?;
        }
        match &self.value {
            Expression::Empty => write!(f, "{}", self.field),
            Expression::Field(name) => write!(f, "{} {} {}", self.field, self.comparison, name),
            Expression::Constant(value) => {
                write!(f, "{} {} {:?}", self.field, self.comparison, value)
            }
        }
    }
}

impl From<Condition> for Node {
    fn from(condition: Condition) -> Self {
        Node::Condition(condition)
    }
}

impl From<Operator> for Node {
    fn from(operator: Operator) -> Self {
        Node::Operator(operator)
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Junction {
    And,
    Or,
    /// Pass-through: only the left child is evaluated.
    None,
}

/// Either a leaf condition or a nested operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Condition(Condition),
    Operator(Operator),
}

impl Node {
    pub fn evaluate(&self, snapshot: &Snapshot) -> bool {
        match self {
            Node::Condition(condition) => condition.evaluate(snapshot),
            Node::Operator(operator) => operator.evaluate(snapshot),
        }
    }
}

/// Binary node. A missing child evaluates to `false`.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    pub junction: Junction,
    pub left: Option<Box<Node>>,
    pub right: Option<Box<Node>>,
}

impl Operator {
    pub fn and(left: impl Into<Node>, right: impl Into<Node>) -> Self {
        Self {
            junction: Junction::And,
            left: Some(Box::new(left.into())),
            right: Some(Box::new(right.into())),
        }
    }

    pub fn or(left: impl Into<Node>, right: impl Into<Node>) -> Self {
        Self {
            junction: Junction::Or,
            left: Some(Box::new(left.into())),
            right: Some(Box::new(right.into())),
        }
    }

    pub fn single(node: impl Into<Node>) -> Self {
        Self {
            junction: Junction::None,
            left: Some(Box::new(node.into())),
            right: None,
        }
    }

    /// Both children of AND/OR are always evaluated.
    pub fn evaluate(&self, snapshot: &Snapshot) -> bool {
        let side = |child: &Option<Box<Node>>| {
            child.as_ref().map_or(false, |node| node.evaluate(snapshot))
        };
        match self.junction {
            Junction::None => side(&self.left),
            Junction::And => {
                let left = side(&self.left);
                let right = side(&self.right);
                left && right
            }
            Junction::Or => {
                let left = side(&self.left);
                let right = side(&self.right);
                left || right
            }
        }
    }

    /// Visit every condition in the tree.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        let mut stack: Vec<&Node> = Vec::new();
        stack.extend(self.left.as_deref());
        stack.extend(self.right.as_deref());
        while let Some(node) = stack.pop() {
            match node {
                Node::Condition(condition) => out.push(condition),
                Node::Operator(operator) => {
                    stack.extend(operator.left.as_deref());
                    stack.extend(operator.right.as_deref());
                }
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Actions and condition sets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Bet,
    WaitNextStep,
    WaitTime,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Bet => write!(f, "BET"),
            Action::WaitNextStep => write!(f, "WAIT_NEXT_STEP"),
            Action::WaitTime => write!(f, "WAIT_TIME"),
        }
    }
}

/// One rung of the if / else-if chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionSet {
    pub when: Operator,
    pub action: Action,
    pub otherwise: Option<Box<ConditionSet>>,
}

impl ConditionSet {
    pub fn new(when: Operator, action: Action) -> Self {
        Self {
            when,
            action,
            otherwise: None,
        }
    }

    pub fn or_else(mut self, next: ConditionSet) -> Self {
        self.otherwise = Some(Box::new(next));
        self
    }

    /// First matching action top to bottom, `WaitTime` if nothing matches.
    pub fn define(&self, snapshot: &Snapshot) -> Action {
        let mut current = Some(self);
        while let Some(set) = current {
            if set.when.evaluate(snapshot) {
                return set.action;
            }
            current = set.otherwise.as_deref();
        }
        Action::WaitTime
    }

    /// Iterate over the chain from this set downwards.
    pub fn chain(&self) -> impl Iterator<Item = &ConditionSet> {
        std::iter::successors(Some(self), |set| set.otherwise.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
