use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::db::prelude::TimePeriod;

/// Daily earnings needed for a green row on a `day` board.
pub const DAILY_TARGET: Decimal = dec!(3400);

/// Earnings needed for a green row on week, month and custom boards.
pub const PERIOD_TARGET: Decimal = dec!(50000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EarningsColor {
    Red,
    Orange,
    Black,
    Green,
}

pub struct EarningsClassifier;
impl EarningsClassifier {
    /// Display color for a row's total earnings.
    ///
    /// These targets are fixed and unrelated to the configurable milestone threshold.
    pub fn classify(total_earnings: Decimal, period: TimePeriod) -> EarningsColor {
        let (target, below_target) = match period {
            TimePeriod::Day => (DAILY_TARGET, EarningsColor::Orange),
            TimePeriod::Week | TimePeriod::Month | TimePeriod::Custom => {
                (PERIOD_TARGET, EarningsColor::Black)
            }
        };

        if total_earnings.is_zero() {
            EarningsColor::Red
        } else if total_earnings < target {
            below_target
        } else {
            EarningsColor::Green
        }
    }
}
