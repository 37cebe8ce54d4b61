//! Predefined strategies, selectable by name.

use chrono::Duration;

use super::rules::{Action, Comparison, Condition, ConditionSet, Expression, Operator, Value};
use super::snapshot::fields::*;
use super::Strategy;

pub const AGGRESSIVE: &str = "aggressive";
pub const WAITING: &str = "waiting";
pub const PROGRESSIVE: &str = "progressive";

pub const NAMES: &[&str] = &[AGGRESSIVE, WAITING, PROGRESSIVE];

fn price_above(threshold: &str) -> Condition {
    Condition::new(CURRENT_PRICE, Comparison::Greater, Expression::field(threshold))
}

fn price_below(threshold: &str) -> Condition {
    Condition::new(CURRENT_PRICE, Comparison::Less, Expression::field(threshold))
}

fn not_winning() -> Condition {
    Condition::new(CURRENT_WINNER_ID, Comparison::NotEqual, Expression::field(MY_ID))
}

fn quiet_for(duration: Duration) -> Condition {
    Condition::new(
        TIME_SINCE_MY_LAST_BID,
        Comparison::Greater,
        Value::Duration(duration),
    )
}

/// Outbid whenever the price is still attractive; chase harder during the
/// additional purchase.
pub fn aggressive() -> Strategy {
    let root = ConditionSet::new(
        Operator::and(price_above(PREFERABLE_PRICE), not_winning()),
        Action::Bet,
    )
    .or_else(
        ConditionSet::new(
            Operator::and(price_above(ACCEPTABLE_PRICE), quiet_for(Duration::minutes(1))),
            Action::Bet,
        )
        .or_else(ConditionSet::new(
            Operator::and(
                price_above(MINIMAL_PRICE),
                Operator::and(not_winning(), Condition::flag(IS_ON_ADDITIONAL_PURCHASE)),
            ),
            Action::Bet,
        )),
    );
    Strategy::new(AGGRESSIVE, root, 5)
}

/// Enter once, then hold back until the additional purchase starts.
pub fn waiting() -> Strategy {
    let root = ConditionSet::new(
        Operator::single(Condition::new(
            MY_CURRENT_BID_COUNT,
            Comparison::Equal,
            Value::Int(0),
        )),
        Action::Bet,
    )
    .or_else(ConditionSet::new(
        Operator::and(
            price_above(MINIMAL_PRICE),
            Condition::new(IS_ON_ADDITIONAL_PURCHASE, Comparison::Equal, Expression::Empty),
        ),
        Action::Bet,
    ));
    Strategy::new(WAITING, root, 5)
}

/// Bid more often as the price falls through the threshold bands.
pub fn progressive() -> Strategy {
    let root = ConditionSet::new(
        Operator::and(price_above(PREFERABLE_PRICE), quiet_for(Duration::seconds(600))),
        Action::Bet,
    )
    .or_else(
        ConditionSet::new(
            Operator::and(
                Operator::and(price_above(ACCEPTABLE_PRICE), price_below(PREFERABLE_PRICE)),
                quiet_for(Duration::seconds(100)),
            ),
            Action::Bet,
        )
        .or_else(ConditionSet::new(
            Operator::and(
                Operator::and(price_above(MINIMAL_PRICE), price_below(ACCEPTABLE_PRICE)),
                quiet_for(Duration::seconds(5)),
            ),
            Action::Bet,
        )),
    );
    Strategy::new(PROGRESSIVE, root, 1)
}
