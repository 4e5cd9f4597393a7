//! Attendance aggregation math.
//!
//! Two deliberately distinct denominators are in play:
//! - per-student: distinct class dates for that student×subject in range;
//! - subject-level: distinct class dates × roster size.
//!
//! The overall student figure is the unweighted mean of per-subject
//! percentages, not weighted by class count. These formulas are preserved
//! exactly; do not unify them.

/// Round to 2 decimal places, half away from zero.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Per-student per-subject percentage. Zero lectures yields 0, not NaN.
pub fn student_subject_percentage(total_lectures: i64, total_present: i64) -> f64 {
    if total_lectures <= 0 {
        return 0.0;
    }
    round2(100.0 * total_present as f64 / total_lectures as f64)
}

/// Unweighted mean across a student's subjects. Empty input yields 0.
pub fn overall_percentage(per_subject: &[f64]) -> f64 {
    if per_subject.is_empty() {
        return 0.0;
    }
    round2(per_subject.iter().sum::<f64>() / per_subject.len() as f64)
}

/// Subject-level percentage: denominator is distinct class dates multiplied
/// by roster size (the total-possible-attendances figure).
pub fn subject_percentage(distinct_dates: i64, roster_size: i64, total_present: i64) -> f64 {
    let possible = distinct_dates * roster_size;
    if possible <= 0 {
        return 0.0;
    }
    round2(100.0 * total_present as f64 / possible as f64)
}
