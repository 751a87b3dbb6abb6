use time::{Date, Duration, Weekday};

/// First `weekday` strictly after `today`
pub fn next_occurrence(today: Date, weekday: Weekday) -> Date {
    let current = i64::from(today.weekday().number_days_from_monday());
    let wanted = i64::from(weekday.number_days_from_monday());
    let mut ahead = (wanted - current).rem_euclid(7);
    if ahead == 0 {
        ahead = 7;
    }
    today + Duration::days(ahead)
}

/// The next `count` target dates: the next occurrence of `weekday`, then weekly
pub fn upcoming_target_dates(today: Date, weekday: Weekday, count: usize) -> Vec<Date> {
    let first = next_occurrence(today, weekday);
    (0..count)
        .map(|week| first + Duration::weeks(week as i64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn next_sunday_from_midweek() {
        // 2026-10-14 is a Wednesday
        assert_eq!(
            next_occurrence(date!(2026 - 10 - 14), Weekday::Sunday),
            date!(2026 - 10 - 18)
        );
    }

    #[test]
    fn same_weekday_moves_a_full_week() {
        assert_eq!(
            next_occurrence(date!(2026 - 10 - 18), Weekday::Sunday),
            date!(2026 - 10 - 25)
        );
    }

    #[test]
    fn thirteen_weekly_dates() {
        let dates = upcoming_target_dates(date!(2026 - 10 - 18), Weekday::Sunday, 13);
        assert_eq!(dates.len(), 13);
        assert_eq!(dates[0], date!(2026 - 10 - 25));
        assert_eq!(dates[12], date!(2027 - 01 - 17));
        assert!(dates.iter().all(|d| d.weekday() == Weekday::Sunday));
    }
}
