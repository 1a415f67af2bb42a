//! Date-range composite conditions.
//!
//! A date range is a half-open `[start, end)` interval, given either
//! explicitly or relative to an anchor date ("last 2 months"). It evaluates
//! directly and can be expanded into the equivalent `>= start AND < end`
//! condition list.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{Condition, ConditionItem, ConditionList, JunctionOp};
use crate::model::{ColumnRef, DataType, Value};

/// Calendar unit for relative ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateUnit {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl DateUnit {
    /// First day of the unit containing `date`. Weeks start on Monday.
    pub fn truncate(&self, date: NaiveDate) -> NaiveDate {
        match self {
            DateUnit::Day => date,
            DateUnit::Week => date - Days::new(u64::from(date.weekday().num_days_from_monday())),
            DateUnit::Month => date.with_day(1).unwrap_or(date),
            DateUnit::Quarter => {
                let month = (date.month0() / 3) * 3 + 1;
                NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
            }
            DateUnit::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        }
    }

    /// Shift `date` by `count` units (negative moves back).
    pub fn shift(&self, date: NaiveDate, count: i64) -> Option<NaiveDate> {
        let magnitude = count.unsigned_abs();
        match self {
            DateUnit::Day | DateUnit::Week => {
                let days = if matches!(self, DateUnit::Week) {
                    magnitude * 7
                } else {
                    magnitude
                };
                if count >= 0 {
                    date.checked_add_days(Days::new(days))
                } else {
                    date.checked_sub_days(Days::new(days))
                }
            }
            DateUnit::Month | DateUnit::Quarter | DateUnit::Year => {
                let per = match self {
                    DateUnit::Month => 1,
                    DateUnit::Quarter => 3,
                    _ => 12,
                };
                let months = Months::new(u32::try_from(magnitude * per).ok()?);
                if count >= 0 {
                    date.checked_add_months(months)
                } else {
                    date.checked_sub_months(months)
                }
            }
        }
    }
}

/// How the interval is specified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRange {
    /// Explicit `[start, end)`.
    Period { start: NaiveDate, end: NaiveDate },
    /// `length` units starting `offset` units from the unit holding the
    /// anchor (offset 0 = current, -1 = previous).
    Relative {
        unit: DateUnit,
        offset: i64,
        length: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRangeCondition {
    pub range: DateRange,
    /// Reference date for relative ranges; today when unset.
    pub anchor: Option<NaiveDate>,
    pub negated: bool,
}

impl DateRangeCondition {
    pub fn period(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            range: DateRange::Period { start, end },
            anchor: None,
            negated: false,
        }
    }

    pub fn relative(unit: DateUnit, offset: i64, length: u32) -> Self {
        Self {
            range: DateRange::Relative {
                unit,
                offset,
                length,
            },
            anchor: None,
            negated: false,
        }
    }

    pub fn anchored_at(mut self, anchor: NaiveDate) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// The concrete `[start, end)` bounds.
    pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        match &self.range {
            DateRange::Period { start, end } => Some((*start, *end)),
            DateRange::Relative {
                unit,
                offset,
                length,
            } => {
                let anchor = self
                    .anchor
                    .unwrap_or_else(|| chrono::Local::now().date_naive());
                let start = unit.shift(unit.truncate(anchor), *offset)?;
                let end = unit.shift(start, i64::from(*length))?;
                Some((start, end))
            }
        }
    }

    /// Evaluate against a date or timestamp cell.
    pub fn evaluate(&self, value: &Value) -> bool {
        let date = match value.coerce(DataType::Date) {
            Value::Date(d) => d,
            _ => return false,
        };
        let inside = self
            .bounds()
            .is_some_and(|(start, end)| date >= start && date < end);
        inside != self.negated
    }

    /// Expand into `attr >= start AND attr < end`.
    pub fn to_condition_list(&self, attribute: &ColumnRef) -> ConditionList {
        let mut list = ConditionList::new();
        let Some((start, end)) = self.bounds() else {
            return list;
        };
        list.append(
            ConditionItem::new(
                attribute.clone(),
                Condition::greater_than(start, true).with_type(DataType::Date),
            ),
            JunctionOp::And,
        );
        list.append(
            ConditionItem::new(
                attribute.clone(),
                Condition::less_than(end, false).with_type(DataType::Date),
            ),
            JunctionOp::And,
        );
        list
    }
}
