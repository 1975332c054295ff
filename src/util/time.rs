use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, Utc};

/// クローラーが返す投稿日時を`now`基準で解決する。
///
/// RFC 3339、`YYYY-MM-DD HH:MM:SS`（空白または`T`区切り、小数秒可）、
/// `YYYY-MM-DD`、YouTube形式の相対表記（`3일 전`、`2 weeks ago`）を受け付けます。
/// 解析できない値は`now`になります。
pub(crate) fn resolve_publish_date(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return now;
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return parsed.and_utc();
        }
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return parsed.and_hms_opt(0, 0, 0).map_or(now, |dt| dt.and_utc());
    }

    resolve_relative(raw, now).unwrap_or(now)
}

fn resolve_relative(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let amount: u32 = if digits.is_empty() {
        1
    } else {
        digits.parse().ok()?
    };
    let text = raw.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

    // 最初に一致した単位を採用
    if has(&["초", "second"]) {
        now.checked_sub_signed(Duration::seconds(i64::from(amount)))
    } else if has(&["분", "minute"]) {
        now.checked_sub_signed(Duration::minutes(i64::from(amount)))
    } else if has(&["시간", "hour"]) {
        now.checked_sub_signed(Duration::hours(i64::from(amount)))
    } else if has(&["일", "day"]) {
        now.checked_sub_signed(Duration::days(i64::from(amount)))
    } else if has(&["주", "week"]) {
        now.checked_sub_signed(Duration::weeks(i64::from(amount)))
    } else if has(&["달", "개월", "month"]) {
        now.checked_sub_months(Months::new(amount))
    } else if has(&["년", "year"]) {
        now.checked_sub_months(Months::new(amount.checked_mul(12)?))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    #[rstest]
    #[case("30초 전", Duration::seconds(30))]
    #[case("5분 전", Duration::minutes(5))]
    #[case("2시간 전", Duration::hours(2))]
    #[case("3일 전", Duration::days(3))]
    #[case("1주 전", Duration::weeks(1))]
    #[case("4 hours ago", Duration::hours(4))]
    #[case("2 weeks ago", Duration::weeks(2))]
    #[case("a day ago", Duration::days(1))]
    fn relative_offsets(#[case] raw: &str, #[case] offset: Duration) {
        assert_eq!(resolve_publish_date(Some(raw), now()), now() - offset);
    }

    #[test]
    fn months_and_years_use_calendar_arithmetic() {
        assert_eq!(
            resolve_publish_date(Some("2개월 전"), now()),
            Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
        );
        assert_eq!(
            resolve_publish_date(Some("1년 전"), now()),
            Utc.with_ymd_and_hms(2023, 3, 15, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn absolute_formats_are_parsed() {
        assert_eq!(
            resolve_publish_date(Some("2024-01-02T03:04:05Z"), now()),
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
        );
        assert_eq!(
            resolve_publish_date(Some("2024-01-02 03:04:05"), now()),
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
        );
        assert_eq!(
            resolve_publish_date(Some("2024-01-02T03:04:05"), now()),
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
        );
        assert_eq!(
            resolve_publish_date(Some("2024-01-02"), now()),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn unknown_or_missing_falls_back_to_now() {
        assert_eq!(resolve_publish_date(None, now()), now());
        assert_eq!(resolve_publish_date(Some("   "), now()), now());
        assert_eq!(resolve_publish_date(Some("방금"), now()), now());
    }
}
