use time::{format_description::well_known::Rfc3339, OffsetDateTime, PrimitiveDateTime};

/// Current UTC time at the microsecond precision Postgres stores.
pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    let time = now.time();
    let time = time.replace_microsecond(time.microsecond()).unwrap_or(time);
    PrimitiveDateTime::new(now.date(), time)
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

/// Human-readable stamp used in exported documents.
pub(crate) fn format_export_stamp(value: PrimitiveDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02} UTC",
        value.year(),
        u8::from(value.month()),
        value.day(),
        value.hour(),
        value.minute(),
        value.second()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Date, Month, Time};

    fn sample() -> PrimitiveDateTime {
        let date = Date::from_calendar_date(2025, Month::January, 2).unwrap();
        let time = Time::from_hms(10, 20, 30).unwrap();
        PrimitiveDateTime::new(date, time)
    }

    #[test]
    fn format_primitive_outputs_utc_z() {
        assert_eq!(format_primitive(sample()), "2025-01-02T10:20:30Z");
    }

    #[test]
    fn format_export_stamp_is_readable() {
        assert_eq!(format_export_stamp(sample()), "2025-01-02 10:20:30 UTC");
    }

    #[test]
    fn now_has_no_sub_microsecond_part() {
        assert_eq!(primitive_now_utc().nanosecond() % 1_000, 0);
    }
}
