use super::*;
use chrono::{Datelike, Days};
use proptest::prelude::*;

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (2000i32..2100, 1u32..=12, 1u32..=31).prop_filter_map("valid date", |(y, m, d)| {
        NaiveDate::from_ymd_opt(y, m, d)
    })
}

fn arb_frequency() -> impl Strategy<Value = BillFrequency> {
    prop::sample::select(BillFrequency::ALL.to_vec())
}

proptest! {
    /// Advancing always moves the due date forward
    #[test]
    fn prop_advance_moves_forward(date in arb_date(), frequency in arb_frequency()) {
        let next = frequency.advance(date, date.day()).unwrap();
        prop_assert!(next > date);
    }

    /// Monthly advancing lands in the following calendar month
    #[test]
    fn prop_monthly_advance_next_month(date in arb_date()) {
        let next = BillFrequency::Monthly.advance(date, date.day()).unwrap();
        let months = (next.year() - date.year()) * 12 + next.month() as i32 - date.month() as i32;
        prop_assert_eq!(months, 1);
        prop_assert!(next.day() <= date.day());
    }

    /// A clamped month never moves later payments off the anchor day
    #[test]
    fn prop_monthly_advance_keeps_anchor(date in arb_date(), steps in 1usize..24) {
        let anchor = date.day();
        let mut due = date;
        for _ in 0..steps {
            due = BillFrequency::Monthly.advance(due, anchor).unwrap();
        }
        let end_of_month = due.checked_add_days(Days::new(1)).unwrap().day() == 1;
        prop_assert!(due.day() == anchor || (due.day() < anchor && end_of_month));
    }

    /// Every variant round-trips through its stored string
    #[test]
    fn prop_status_string_roundtrip(status in prop::sample::select(OrderStatus::ALL.to_vec())) {
        prop_assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
    }
}
