use crate::error::{AttendanceError, Result};
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Which present dates count toward the percentage numerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PercentBasis {
    /// Every distinct submitted present date, including ones that are not
    /// working days. The percentage can exceed 100.
    #[default]
    Submitted,
    /// Only present dates that are also working days.
    WorkingDays,
}

impl PercentBasis {
    pub fn parse(raw: &str) -> Option<PercentBasis> {
        match raw.trim() {
            "submitted" => Some(PercentBasis::Submitted),
            "workingDays" | "working_days" => Some(PercentBasis::WorkingDays),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PercentBasis::Submitted => "submitted",
            PercentBasis::WorkingDays => "workingDays",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub absent: BTreeSet<NaiveDate>,
    pub present_percent: f64,
}

/// Two-decimal rounding used for every reported percentage.
pub fn round_2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Derive absences and the present percentage for one month.
///
/// `absent = working \ present` by calendar day. An empty working set is
/// rejected instead of producing a non-finite percentage.
pub fn reconcile(
    working: &BTreeSet<NaiveDate>,
    present: &BTreeSet<NaiveDate>,
    basis: PercentBasis,
) -> Result<Reconciliation> {
    if working.is_empty() {
        return Err(AttendanceError::InvalidState(
            "working-day set is empty".to_string(),
        ));
    }
    let absent: BTreeSet<NaiveDate> = working.difference(present).copied().collect();
    let numerator = match basis {
        PercentBasis::Submitted => present.len(),
        PercentBasis::WorkingDays => present.intersection(working).count(),
    };
    let present_percent = round_2(100.0 * numerator as f64 / working.len() as f64);
    Ok(Reconciliation {
        absent,
        present_percent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days(list: &[(i32, u32, u32)]) -> BTreeSet<NaiveDate> {
        list.iter()
            .map(|(y, m, d)| NaiveDate::from_ymd_opt(*y, *m, *d).expect("date"))
            .collect()
    }

    #[test]
    fn two_of_three_days_present() {
        let w = days(&[(2025, 3, 1), (2025, 3, 2), (2025, 3, 3)]);
        let p = days(&[(2025, 3, 1), (2025, 3, 3)]);
        let r = reconcile(&w, &p, PercentBasis::Submitted).expect("reconcile");
        assert_eq!(r.absent, days(&[(2025, 3, 2)]));
        assert_eq!(r.present_percent, 66.67);
    }

    #[test]
    fn absent_is_set_difference_for_any_present_set() {
        let w = days(&[(2025, 3, 3), (2025, 3, 4), (2025, 3, 5), (2025, 3, 6)]);
        let cases = [
            days(&[]),
            days(&[(2025, 3, 4)]),
            days(&[(2025, 3, 6), (2025, 3, 3), (2025, 3, 9)]),
            w.clone(),
        ];
        for p in cases {
            let r = reconcile(&w, &p, PercentBasis::Submitted).expect("reconcile");
            for d in &w {
                assert_eq!(r.absent.contains(d), !p.contains(d));
            }
            assert!(r.absent.is_subset(&w));
            assert!(r.present_percent.is_finite());
        }
    }

    #[test]
    fn empty_working_set_is_invalid_state() {
        let err = reconcile(&BTreeSet::new(), &days(&[(2025, 3, 1)]), PercentBasis::Submitted)
            .expect_err("must reject");
        assert!(matches!(err, AttendanceError::InvalidState(_)));
    }

    #[test]
    fn submitted_basis_counts_days_outside_calendar() {
        let w = days(&[(2025, 3, 3), (2025, 3, 4)]);
        let p = days(&[(2025, 3, 3), (2025, 3, 8), (2025, 3, 9)]);
        let r = reconcile(&w, &p, PercentBasis::Submitted).expect("reconcile");
        assert_eq!(r.present_percent, 150.0);
        assert_eq!(r.absent, days(&[(2025, 3, 4)]));
    }

    #[test]
    fn working_days_basis_ignores_days_outside_calendar() {
        let w = days(&[(2025, 3, 3), (2025, 3, 4)]);
        let p = days(&[(2025, 3, 3), (2025, 3, 8), (2025, 3, 9)]);
        let r = reconcile(&w, &p, PercentBasis::WorkingDays).expect("reconcile");
        assert_eq!(r.present_percent, 50.0);
    }

    #[test]
    fn basis_names_round_trip() {
        for b in [PercentBasis::Submitted, PercentBasis::WorkingDays] {
            assert_eq!(PercentBasis::parse(b.as_str()), Some(b));
        }
        assert_eq!(PercentBasis::parse("all"), None);
    }
}
