//! Per-tick view of a session as seen by one agent.
//!
//! Rule trees address snapshot values by name; `Snapshot::get` is the single
//! place that maps names to typed values.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::rules::Value;

/// Field names understood by `Snapshot::get`.
pub mod fields {
    pub const IS_ON_ADDITIONAL_PURCHASE: &str = "isOnAdditionalPurchase";
    pub const CURRENT_WINNER_ID: &str = "currentWinnerId";
    pub const MY_ID: &str = "myId";
    pub const MY_CURRENT_BID_COUNT: &str = "myCurrentBidCount";
    pub const CURRENT_STEP_NUMBER: &str = "currentStepNumber";
    pub const STEPS_TILL_ZERO: &str = "stepsTillZero";
    pub const CURRENT_PRICE: &str = "currentPrice";
    pub const CURRENT_DISCOUNT: &str = "currentDiscount";
    pub const TIME_SINCE_LAST_STEP: &str = "timeSinceLastStep";
    pub const TIME_SINCE_MY_LAST_BID: &str = "timeSinceMyLastBid";
    pub const STEP_SIZE: &str = "stepSize";
    pub const TIME_SINCE_START: &str = "timeSinceStart";
    pub const TIME_TILL_END: &str = "timeTillEnd";
    pub const PARTICIPANTS_COUNT: &str = "participantsCount";
    pub const MINIMAL_PRICE: &str = "minimalPrice";
    pub const ACCEPTABLE_PRICE: &str = "acceptablePrice";
    pub const PREFERABLE_PRICE: &str = "preferablePrice";

    pub const ALL: &[&str] = &[
        IS_ON_ADDITIONAL_PURCHASE,
        CURRENT_WINNER_ID,
        MY_ID,
        MY_CURRENT_BID_COUNT,
        CURRENT_STEP_NUMBER,
        STEPS_TILL_ZERO,
        CURRENT_PRICE,
        CURRENT_DISCOUNT,
        TIME_SINCE_LAST_STEP,
        TIME_SINCE_MY_LAST_BID,
        STEP_SIZE,
        TIME_SINCE_START,
        TIME_TILL_END,
        PARTICIPANTS_COUNT,
        MINIMAL_PRICE,
        ACCEPTABLE_PRICE,
        PREFERABLE_PRICE,
    ];

    pub fn is_known(name: &str) -> bool {
        ALL.contains(&name)
    }
}

/// User-supplied price levels an agent reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Thresholds {
    pub minimal_price: f64,
    pub acceptable_price: f64,
    pub preferable_price: f64,
}

impl Thresholds {
    pub fn new(minimal_price: f64, acceptable_price: f64, preferable_price: f64) -> Self {
        Self {
            minimal_price,
            acceptable_price,
            preferable_price,
        }
    }

    /// Every level must be a finite, non-negative price.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            (fields::MINIMAL_PRICE, self.minimal_price),
            (fields::ACCEPTABLE_PRICE, self.acceptable_price),
            (fields::PREFERABLE_PRICE, self.preferable_price),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{name} must be a non-negative number, got {value}"));
            }
        }
        Ok(())
    }
}

/// Live state of a session from one agent's point of view.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub is_on_additional_purchase: bool,
    pub current_winner_id: i64,
    pub my_id: i64,
    pub my_current_bid_count: i64,
    pub current_step_number: i64,
    pub steps_till_zero: i64,
    pub current_price: f64,
    pub current_discount: f64,
    pub time_since_last_step: Duration,
    pub time_since_my_last_bid: Duration,
    pub step_size: f64,
    pub time_since_start: Duration,
    pub time_till_end: Duration,
    pub participants_count: i64,
    pub thresholds: Thresholds,
}

impl Snapshot {
    /// Initial snapshot of a freshly started agent: thresholds set,
    /// everything else zero.
    pub fn initial(my_id: i64, thresholds: Thresholds) -> Self {
        Self {
            is_on_additional_purchase: false,
            current_winner_id: 0,
            my_id,
            my_current_bid_count: 0,
            current_step_number: 0,
            steps_till_zero: 0,
            current_price: 0.0,
            current_discount: 0.0,
            time_since_last_step: Duration::zero(),
            time_since_my_last_bid: Duration::zero(),
            step_size: 0.0,
            time_since_start: Duration::zero(),
            time_till_end: Duration::zero(),
            participants_count: 0,
            thresholds,
        }
    }

    /// Read a field by name. Unknown names yield `None`.
    pub fn get(&self, name: &str) -> Option<Value> {
        let value = match name {
            fields::IS_ON_ADDITIONAL_PURCHASE => Value::Bool(self.is_on_additional_purchase),
            fields::CURRENT_WINNER_ID => Value::Int(self.current_winner_id),
            fields::MY_ID => Value::Int(self.my_id),
            fields::MY_CURRENT_BID_COUNT => Value::Int(self.my_current_bid_count),
            fields::CURRENT_STEP_NUMBER => Value::Int(self.current_step_number),
            fields::STEPS_TILL_ZERO => Value::Int(self.steps_till_zero),
            fields::CURRENT_PRICE => Value::Float(self.current_price),
            fields::CURRENT_DISCOUNT => Value::Float(self.current_discount),
            fields::TIME_SINCE_LAST_STEP => Value::Duration(self.time_since_last_step),
            fields::TIME_SINCE_MY_LAST_BID => Value::Duration(self.time_since_my_last_bid),
            fields::STEP_SIZE => Value::Float(self.step_size),
            fields::TIME_SINCE_START => Value::Duration(self.time_since_start),
            fields::TIME_TILL_END => Value::Duration(self.time_till_end),
            fields::PARTICIPANTS_COUNT => Value::Int(self.participants_count),
            fields::MINIMAL_PRICE => Value::Float(self.thresholds.minimal_price),
            fields::ACCEPTABLE_PRICE => Value::Float(self.thresholds.acceptable_price),
            fields::PREFERABLE_PRICE => Value::Float(self.thresholds.preferable_price),
            _ => return None,
        };
        Some(value)
    }
}
