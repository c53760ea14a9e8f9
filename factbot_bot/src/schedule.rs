//! Turning the configured local posting time into a UTC trigger, and deciding when the daily job fires next.

use std::fmt;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, Offset, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// The UTC hour and minute at which the daily job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerTime {
    hour: u32,
    minute: u32,
}

impl TriggerTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    /// The trigger instant on the given UTC date.
    pub fn on(&self, date: NaiveDate) -> DateTime<Utc> {
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN);
        Utc.from_utc_datetime(&date.and_time(time))
    }

    /// Whether `now` falls inside the trigger minute.
    pub fn matches(&self, now: &DateTime<Utc>) -> bool {
        now.hour() == self.hour && now.minute() == self.minute
    }
}

impl fmt::Display for TriggerTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02} UTC", self.hour, self.minute)
    }
}

/// Convert a local wall-clock time on `today` in `tz` to the UTC hour and minute.
///
/// An ambiguous local time resolves to its earliest instant. A local time that doesn't exist because of a DST gap
/// is read with the offset that applied before the gap. Only the hour and minute are kept, so the result is only
/// exact for the offset in effect on `today`.
pub fn utc_trigger<Z: TimeZone>(hour: u32, minute: u32, tz: &Z, today: NaiveDate) -> Result<TriggerTime> {
    let local = today
        .and_hms_opt(hour, minute, 0)
        .ok_or_else(|| anyhow!("{hour:02}:{minute:02} is not a valid time of day"))?;

    let utc = match tz.from_local_datetime(&local) {
        LocalResult::Single(moment) => moment.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let offset = tz.offset_from_utc_datetime(&(local - Duration::days(1))).fix();
            Utc.from_utc_datetime(&(local - Duration::seconds(offset.local_minus_utc().into())))
        }
    };

    TriggerTime::new(utc.hour(), utc.minute()).ok_or_else(|| anyhow!("Converted time {utc} is out of range"))
}

/// The configured posting time together with the UTC trigger it was converted to at startup.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub timezone: Tz,
    pub local_hour: u32,
    pub local_minute: u32,
    pub trigger: TriggerTime,
}

impl Schedule {
    /// Compute the trigger for today's date in `timezone`.
    pub fn new(timezone: Tz, local_hour: u32, local_minute: u32) -> Result<Self> {
        let today = Utc::now().with_timezone(&timezone).date_naive();
        let trigger = utc_trigger(local_hour, local_minute, &timezone, today)?;

        Ok(Self { timezone, local_hour, local_minute, trigger })
    }

    /// The local posting time in 12 hour notation, e.g. `04:54 PM`.
    pub fn local_time_12h(&self) -> String {
        NaiveTime::from_hms_opt(self.local_hour, self.local_minute, 0)
            .map(|t| t.format("%I:%M %p").to_string())
            .unwrap_or_else(|| format!("{:02}:{:02}", self.local_hour, self.local_minute))
    }

    /// The local posting time with its zone, e.g. `04:54 PM Asia/Kuala_Lumpur (UTC+08:00)`.
    pub fn local_label(&self) -> String {
        let offset = Utc::now().with_timezone(&self.timezone).offset().fix();
        format!("{} {} (UTC{})", self.local_time_12h(), self.timezone.name(), offset)
    }

    /// `now` in the configured timezone.
    pub fn local_now(&self, now: DateTime<Utc>) -> DateTime<Tz> {
        now.with_timezone(&self.timezone)
    }
}

/// What the scheduler should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Run the daily job right away.
    FireNow,
    /// Nothing to do before this instant.
    SleepUntil(DateTime<Utc>),
}

/// Decide whether the daily job fires now.
///
/// The job fires when `now` is inside the trigger minute and nothing was delivered yet on the current UTC date.
/// This keeps a restart inside the trigger minute from posting twice. In every other case the next trigger instant
/// strictly after `now` is returned.
pub fn plan_next(now: DateTime<Utc>, trigger: TriggerTime, last_delivery: Option<NaiveDate>) -> Plan {
    let today = now.date_naive();

    if trigger.matches(&now) && last_delivery != Some(today) {
        return Plan::FireNow;
    }

    let todays_trigger = trigger.on(today);
    if todays_trigger > now {
        Plan::SleepUntil(todays_trigger)
    } else {
        Plan::SleepUntil(trigger.on(today + Duration::days(1)))
    }
}

#[cfg(test)]
mod tests {
    use chrono_tz::{America, Asia, Europe, Pacific};
    use rstest::rstest;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[rstest]
    #[case(date(2024, 1, 15))]
    #[case(date(2024, 7, 4))]
    #[case(date(2025, 12, 31))]
    fn kuala_lumpur_afternoon_is_morning_utc(#[case] today: NaiveDate) {
        let trigger = utc_trigger(16, 54, &Asia::Kuala_Lumpur, today).unwrap();

        assert_eq!(TriggerTime::new(8, 54).unwrap(), trigger);
    }

    #[rstest]
    #[case::winter(date(2024, 1, 15), 8)]
    #[case::summer(date(2024, 7, 15), 7)]
    fn follows_daylight_saving(#[case] today: NaiveDate, #[case] expected_hour: u32) {
        let trigger = utc_trigger(9, 0, &Europe::Brussels, today).unwrap();

        assert_eq!(expected_hour, trigger.hour());
        assert_eq!(0, trigger.minute());
    }

    #[test]
    fn half_hour_zone_wraps_to_previous_utc_day() {
        let trigger = utc_trigger(0, 10, &Asia::Kolkata, date(2024, 3, 1)).unwrap();

        assert_eq!(TriggerTime::new(18, 40).unwrap(), trigger);
    }

    #[rstest]
    #[case(Asia::Kuala_Lumpur)]
    #[case(Asia::Kolkata)]
    #[case(Europe::Brussels)]
    #[case(America::New_York)]
    #[case(Pacific::Chatham)]
    fn every_minute_round_trips(#[case] tz: Tz) {
        // No transitions anywhere near this date for these zones
        let today = date(2024, 6, 20);

        for hour in 0..24 {
            for minute in 0..60 {
                let trigger = utc_trigger(hour, minute, &tz, today).unwrap();
                assert!(trigger.hour() < 24 && trigger.minute() < 60);

                let back = trigger.on(today).with_timezone(&tz);
                assert_eq!(
                    (hour, minute),
                    (back.hour(), back.minute()),
                    "{hour:02}:{minute:02} in {} did not survive the round trip via {trigger}", tz.name()
                );
            }
        }
    }

    #[test]
    fn ambiguous_time_uses_earliest_instant() {
        // 02:30 happens twice in Brussels on 2024-10-27, first at UTC+2
        let trigger = utc_trigger(2, 30, &Europe::Brussels, date(2024, 10, 27)).unwrap();

        assert_eq!(TriggerTime::new(0, 30).unwrap(), trigger);
    }

    #[test]
    fn skipped_time_uses_offset_before_gap() {
        // 02:30 doesn't exist in Brussels on 2024-03-31, the offset before the gap is UTC+1
        let trigger = utc_trigger(2, 30, &Europe::Brussels, date(2024, 3, 31)).unwrap();

        assert_eq!(TriggerTime::new(1, 30).unwrap(), trigger);
    }

    #[test]
    fn rejects_invalid_time() {
        assert!(utc_trigger(24, 0, &Asia::Kuala_Lumpur, date(2024, 1, 1)).is_err());
        assert!(utc_trigger(12, 60, &Asia::Kuala_Lumpur, date(2024, 1, 1)).is_err());
    }

    #[test]
    fn trigger_time_rejects_out_of_range() {
        assert_eq!(None, TriggerTime::new(24, 0));
        assert_eq!(None, TriggerTime::new(0, 60));
    }

    #[test]
    fn schedule_formats_twelve_hour_time() {
        let schedule = Schedule::new(Asia::Kuala_Lumpur, 16, 54).unwrap();

        assert_eq!("04:54 PM", schedule.local_time_12h());
        assert_eq!("04:54 PM Asia/Kuala_Lumpur (UTC+08:00)", schedule.local_label());
        assert_eq!("08:54 UTC", schedule.trigger.to_string());
    }

    fn trigger() -> TriggerTime {
        TriggerTime::new(8, 54).unwrap()
    }

    #[rstest]
    #[case::start_of_minute(utc(2024, 5, 1, 8, 54, 0))]
    #[case::end_of_minute(utc(2024, 5, 1, 8, 54, 59))]
    fn fires_inside_trigger_minute(#[case] now: DateTime<Utc>) {
        assert_eq!(Plan::FireNow, plan_next(now, trigger(), None));
        assert_eq!(Plan::FireNow, plan_next(now, trigger(), Some(date(2024, 4, 30))));
    }

    #[test]
    fn restart_after_delivery_does_not_fire_again() {
        let now = utc(2024, 5, 1, 8, 54, 20);

        let plan = plan_next(now, trigger(), Some(date(2024, 5, 1)));

        assert_eq!(Plan::SleepUntil(utc(2024, 5, 2, 8, 54, 0)), plan);
    }

    #[test]
    fn sleeps_until_later_today() {
        let plan = plan_next(utc(2024, 5, 1, 3, 0, 0), trigger(), Some(date(2024, 4, 30)));

        assert_eq!(Plan::SleepUntil(utc(2024, 5, 1, 8, 54, 0)), plan);
    }

    #[test]
    fn sleeps_until_tomorrow_once_passed() {
        let plan = plan_next(utc(2024, 5, 1, 8, 55, 0), trigger(), None);

        assert_eq!(Plan::SleepUntil(utc(2024, 5, 2, 8, 54, 0)), plan);
    }

    #[test]
    fn month_boundary_rolls_over() {
        let plan = plan_next(utc(2024, 2, 29, 23, 0, 0), trigger(), None);

        assert_eq!(Plan::SleepUntil(utc(2024, 3, 1, 8, 54, 0)), plan);
    }
}
