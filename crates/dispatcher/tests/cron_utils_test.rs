use chrono::{Datelike, Duration, TimeZone, Timelike, Utc, Weekday};
use orchestrator_dispatcher::cron_utils::{self, CronScheduler};

#[test]
fn test_previous_fire_time_is_not_after_now() {
    let cron = CronScheduler::new("0 0 2 * * *").unwrap();
    let now = Utc.with_ymd_and_hms(2024, 6, 10, 1, 30, 0).unwrap();

    let previous = cron.previous_fire_time(now).unwrap();

    assert_eq!(previous, Utc.with_ymd_and_hms(2024, 6, 9, 2, 0, 0).unwrap());
}

#[test]
fn test_previous_fire_time_includes_exact_fire_instant() {
    let cron = CronScheduler::new("0 0 2 * * *").unwrap();
    let now = Utc.with_ymd_and_hms(2024, 6, 10, 2, 0, 0).unwrap();

    assert_eq!(cron.previous_fire_time(now), Some(now));
}

#[test]
fn test_previous_fire_time_for_sparse_schedule() {
    // 每年一次，需要最大的回溯窗口
    let cron = CronScheduler::new("0 0 0 1 1 *").unwrap();
    let now = Utc.with_ymd_and_hms(2024, 11, 20, 8, 0, 0).unwrap();

    assert_eq!(
        cron.previous_fire_time(now),
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    );
}

#[test]
fn test_previous_then_next_round_trip() {
    let cron = CronScheduler::new("0 */20 * * * *").unwrap();
    let now = Utc.with_ymd_and_hms(2024, 3, 5, 13, 47, 12).unwrap();

    let previous = cron.previous_fire_time(now).unwrap();
    let next = cron.next_execution_time(previous).unwrap();

    assert_eq!(previous, Utc.with_ymd_and_hms(2024, 3, 5, 13, 40, 0).unwrap());
    assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap());
    assert!(next > now);
}

#[test]
fn test_next_fire_times_are_strictly_increasing() {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let times = cron_utils::next_fire_times("*/5 * * * *", now, 12).unwrap();

    assert_eq!(times.len(), 12);
    assert!(times[0] > now);
    assert!(times.windows(2).all(|w| w[0] < w[1]));
    assert!(times.windows(2).all(|w| w[1] - w[0] == Duration::minutes(5)));
}

#[test]
fn test_five_field_sunday_is_zero_or_seven() {
    let from = Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap(); // 周一
    for expr in ["0 3 * * 0", "0 3 * * 7", "0 3 * * SUN"] {
        let times = cron_utils::next_fire_times(expr, from, 3).unwrap();
        assert!(
            times.iter().all(|t| t.weekday() == Weekday::Sun && t.hour() == 3),
            "{expr} fired on {times:?}"
        );
    }
}

#[test]
fn test_five_field_weekday_range() {
    let from = Utc.with_ymd_and_hms(2024, 6, 8, 0, 0, 0).unwrap(); // 周六
    let times = cron_utils::next_fire_times("30 1 * * 1-5", from, 5).unwrap();

    let days: Vec<Weekday> = times.iter().map(|t| t.weekday()).collect();
    assert_eq!(
        days,
        vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri
        ]
    );
    assert!(times.iter().all(|t| t.hour() == 1 && t.minute() == 30));
}

#[test]
fn test_due_fire_time_window() {
    let cron = CronScheduler::new("0 0 2 * * *").unwrap();
    let fire = Utc.with_ymd_and_hms(2024, 6, 10, 2, 0, 0).unwrap();
    let poll = Duration::seconds(60);

    assert_eq!(cron.due_fire_time(fire + Duration::seconds(59), poll), Some(fire));
    assert_eq!(cron.due_fire_time(fire + Duration::seconds(60), poll), None);
    assert_eq!(cron.due_fire_time(fire - Duration::seconds(1), poll), None);
}

#[test]
fn test_invalid_expressions() {
    assert!(!cron_utils::is_valid("not a cron"));
    assert!(!cron_utils::is_valid("0 2 * *"));
    assert!(!cron_utils::is_valid("0 3 * * 8"));
    assert!(cron_utils::is_valid("0 2 * * *"));
    assert!(cron_utils::is_valid("0 0 2 * * *"));
    assert!(cron_utils::previous_fire_time("bogus", Utc::now()).is_err());
}
