use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use utoipa::ToSchema;

/// One row per employee per calendar day. The day's progress is read from
/// which timestamps are set; there is no separate state column.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Attendance {
    pub id: u64,
    pub employee_id: u64,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_in: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub lunch_in: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub lunch_out: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out: Option<NaiveDateTime>,
    pub is_valid: bool,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Punch {
    #[strum(serialize = "check-in")]
    CheckIn,
    #[strum(serialize = "lunch-in")]
    LunchIn,
    #[strum(serialize = "lunch-out")]
    LunchOut,
    #[strum(serialize = "check-out")]
    CheckOut,
}

impl Punch {
    /// Column stamped by this punch.
    pub fn column(self) -> &'static str {
        match self {
            Punch::CheckIn => "check_in",
            Punch::LunchIn => "lunch_in",
            Punch::LunchOut => "lunch_out",
            Punch::CheckOut => "check_out",
        }
    }

    /// Guard for the conditional UPDATE, mirroring `check`.
    pub fn update_guard(self) -> &'static str {
        match self {
            Punch::CheckIn => "check_in IS NULL",
            Punch::LunchIn => "check_in IS NOT NULL AND lunch_in IS NULL AND check_out IS NULL",
            Punch::LunchOut => "lunch_in IS NOT NULL AND lunch_out IS NULL AND check_out IS NULL",
            Punch::CheckOut => {
                "check_in IS NOT NULL AND check_out IS NULL \
                 AND (lunch_in IS NULL OR lunch_out IS NOT NULL)"
            }
        }
    }

    /// Decides whether `self` may be recorded given the day's row.
    /// check-in → lunch-in → lunch-out → check-out; lunch is optional.
    pub fn check(self, day: Option<&Attendance>) -> Result<(), &'static str> {
        let Some(day) = day else {
            return match self {
                Punch::CheckIn => Ok(()),
                _ => Err("No check-in found for today"),
            };
        };

        let checked_out = day.check_out.is_some();

        match self {
            Punch::CheckIn => Err("Already checked in today"),
            _ if day.check_in.is_none() => Err("No check-in found for today"),
            Punch::LunchIn if day.lunch_in.is_some() => Err("Lunch already started today"),
            Punch::LunchIn if checked_out => Err("Already checked out today"),
            Punch::LunchOut if day.lunch_in.is_none() => Err("Lunch has not been started"),
            Punch::LunchOut if day.lunch_out.is_some() => Err("Lunch already ended today"),
            Punch::LunchOut if checked_out => Err("Already checked out today"),
            Punch::CheckOut if checked_out => Err("Already checked out today"),
            Punch::CheckOut if day.lunch_in.is_some() && day.lunch_out.is_none() => {
                Err("Lunch is still in progress")
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> Attendance {
        Attendance {
            id: 1,
            employee_id: 9,
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            check_in: None,
            lunch_in: None,
            lunch_out: None,
            check_out: None,
            is_valid: true,
            remarks: None,
        }
    }

    fn stamp(row: &mut Attendance, punch: Punch) {
        let at = row.date.and_hms_opt(9, 0, 0);
        match punch {
            Punch::CheckIn => row.check_in = at,
            Punch::LunchIn => row.lunch_in = at,
            Punch::LunchOut => row.lunch_out = at,
            Punch::CheckOut => row.check_out = at,
        }
    }

    #[test]
    fn full_day_in_order_is_accepted() {
        assert!(Punch::CheckIn.check(None).is_ok());
        let mut row = day();
        stamp(&mut row, Punch::CheckIn);

        for punch in [Punch::LunchIn, Punch::LunchOut, Punch::CheckOut] {
            assert!(punch.check(Some(&row)).is_ok(), "{punch} rejected");
            stamp(&mut row, punch);
        }
    }

    #[test]
    fn nothing_before_check_in() {
        for punch in [Punch::LunchIn, Punch::LunchOut, Punch::CheckOut] {
            assert_eq!(punch.check(None), Err("No check-in found for today"));
        }
    }

    #[test]
    fn every_step_is_single_use() {
        let mut row = day();
        stamp(&mut row, Punch::CheckIn);
        assert_eq!(Punch::CheckIn.check(Some(&row)), Err("Already checked in today"));

        stamp(&mut row, Punch::LunchIn);
        assert_eq!(Punch::LunchIn.check(Some(&row)), Err("Lunch already started today"));

        stamp(&mut row, Punch::LunchOut);
        assert_eq!(Punch::LunchOut.check(Some(&row)), Err("Lunch already ended today"));

        stamp(&mut row, Punch::CheckOut);
        assert_eq!(Punch::CheckOut.check(Some(&row)), Err("Already checked out today"));
    }

    #[test]
    fn lunch_out_requires_lunch_in() {
        let mut row = day();
        stamp(&mut row, Punch::CheckIn);
        assert_eq!(Punch::LunchOut.check(Some(&row)), Err("Lunch has not been started"));
    }

    #[test]
    fn check_out_without_lunch_is_allowed_but_not_during_lunch() {
        let mut row = day();
        stamp(&mut row, Punch::CheckIn);
        assert!(Punch::CheckOut.check(Some(&row)).is_ok());

        stamp(&mut row, Punch::LunchIn);
        assert_eq!(Punch::CheckOut.check(Some(&row)), Err("Lunch is still in progress"));
    }

    #[test]
    fn no_lunch_after_check_out() {
        let mut row = day();
        stamp(&mut row, Punch::CheckIn);
        stamp(&mut row, Punch::CheckOut);
        assert_eq!(Punch::LunchIn.check(Some(&row)), Err("Already checked out today"));
    }
}
