use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::entities::order::OrderStatus;

/// Date format accepted by the explicit range query parameters.
const DATE_PARAM_FORMAT: &str = "%Y-%m-%d";

/// Longest explicit range, in elapsed days, still plotted one point per day.
/// Anything wider falls back to month buckets so the chart stays bounded.
const DAY_BUCKET_MAX_SPAN_DAYS: i64 = 60;

/// Trailing window selected by the `timeframe` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    Weekly,
    Monthly,
    Quarterly,
    Annually,
}

impl Timeframe {
    /// Lenient parse: anything absent or unrecognized means the annual view.
    /// Dashboard query parameters never produce a client error.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("weekly") => Timeframe::Weekly,
            Some("monthly") => Timeframe::Monthly,
            Some("quarterly") => Timeframe::Quarterly,
            _ => Timeframe::Annually,
        }
    }

    fn lookback(self) -> Duration {
        match self {
            Timeframe::Weekly => Duration::days(7),
            Timeframe::Monthly => Duration::days(30),
            Timeframe::Quarterly => Duration::days(90),
            Timeframe::Annually => Duration::days(365),
        }
    }

    fn granularity(self) -> BucketGranularity {
        match self {
            Timeframe::Weekly | Timeframe::Monthly => BucketGranularity::Day,
            Timeframe::Quarterly | Timeframe::Annually => BucketGranularity::Month,
        }
    }
}

/// Date truncation applied when grouping orders into series buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketGranularity {
    Day,
    Month,
}

impl BucketGranularity {
    /// Grouping key for a timestamp. Both formats sort correctly as plain
    /// strings, so the series can be ordered lexicographically.
    pub fn bucket_key(self, at: DateTime<Utc>) -> String {
        match self {
            BucketGranularity::Day => at.format("%Y-%m-%d").to_string(),
            BucketGranularity::Month => at.format("%Y-%m").to_string(),
        }
    }
}

/// Fully-resolved scan parameters for the revenue time series.
///
/// Built once from the raw query input before any data access; the
/// aggregator only ever sees this struct and never branches on request
/// parameters itself.
#[derive(Debug, Clone)]
pub struct ReportingWindow {
    pub start: DateTime<Utc>,
    /// Inclusive upper bound; `None` leaves the window open toward "now".
    pub end: Option<DateTime<Utc>>,
    pub statuses: Vec<OrderStatus>,
    pub granularity: BucketGranularity,
}

impl ReportingWindow {
    /// Resolve the raw `timeframe` / `startDate` / `endDate` query input.
    ///
    /// An explicit, well-formed date pair takes precedence and spans whole
    /// calendar days inclusively; otherwise the timeframe picks a trailing
    /// window ending now. Malformed input falls through to the annual
    /// default rather than erroring.
    pub fn resolve(
        timeframe: Option<&str>,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Self {
        if let (Some(start), Some(end)) = (parse_date(start_date), parse_date(end_date)) {
            let granularity = if (end - start).num_days() <= DAY_BUCKET_MAX_SPAN_DAYS {
                BucketGranularity::Day
            } else {
                BucketGranularity::Month
            };

            return Self {
                start: start.and_hms_opt(0, 0, 0).unwrap().and_utc(),
                end: Some(end.and_hms_milli_opt(23, 59, 59, 999).unwrap().and_utc()),
                statuses: OrderStatus::revenue_bearing().to_vec(),
                granularity,
            };
        }

        let timeframe = Timeframe::parse(timeframe);
        Self {
            start: Utc::now() - timeframe.lookback(),
            end: None,
            statuses: OrderStatus::revenue_bearing().to_vec(),
            granularity: timeframe.granularity(),
        }
    }
}

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(s, DATE_PARAM_FORMAT).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Some("weekly"), 7, BucketGranularity::Day; "weekly is seven day buckets")]
    #[test_case(Some("monthly"), 30, BucketGranularity::Day; "monthly is thirty day buckets")]
    #[test_case(Some("quarterly"), 90, BucketGranularity::Month; "quarterly is ninety days in month buckets")]
    #[test_case(Some("annually"), 365, BucketGranularity::Month; "annually is a trailing year")]
    #[test_case(Some("hourly"), 365, BucketGranularity::Month; "unrecognized falls back to annual")]
    #[test_case(None, 365, BucketGranularity::Month; "absent falls back to annual")]
    fn timeframe_selects_trailing_window(
        raw: Option<&str>,
        lookback_days: i64,
        granularity: BucketGranularity,
    ) {
        let window = ReportingWindow::resolve(raw, None, None);

        assert_eq!((Utc::now() - window.start).num_days(), lookback_days);
        assert!(window.end.is_none());
        assert_eq!(window.granularity, granularity);
    }

    #[test]
    fn explicit_range_overrides_timeframe() {
        let window =
            ReportingWindow::resolve(Some("weekly"), Some("2024-01-10"), Some("2024-01-20"));

        assert_eq!(
            window.start,
            NaiveDate::from_ymd_opt(2024, 1, 10)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc()
        );
        assert_eq!(
            window.end,
            Some(
                NaiveDate::from_ymd_opt(2024, 1, 20)
                    .unwrap()
                    .and_hms_milli_opt(23, 59, 59, 999)
                    .unwrap()
                    .and_utc()
            )
        );
        assert_eq!(window.granularity, BucketGranularity::Day);
    }

    #[test]
    fn sixty_day_span_keeps_day_buckets() {
        // 2024-01-01 -> 2024-03-01 is exactly 60 elapsed days
        let window = ReportingWindow::resolve(None, Some("2024-01-01"), Some("2024-03-01"));
        assert_eq!(window.granularity, BucketGranularity::Day);
    }

    #[test]
    fn spans_over_sixty_days_use_month_buckets() {
        let window = ReportingWindow::resolve(None, Some("2024-01-01"), Some("2024-03-02"));
        assert_eq!(window.granularity, BucketGranularity::Month);
    }

    #[test]
    fn half_open_or_malformed_range_falls_back_to_timeframe() {
        let only_start = ReportingWindow::resolve(Some("weekly"), Some("2024-01-10"), None);
        assert!(only_start.end.is_none());
        assert_eq!((Utc::now() - only_start.start).num_days(), 7);

        let bad_end =
            ReportingWindow::resolve(Some("weekly"), Some("2024-01-10"), Some("not-a-date"));
        assert!(bad_end.end.is_none());
        assert_eq!(bad_end.granularity, BucketGranularity::Day);
    }

    #[test]
    fn status_filter_excludes_only_cancelled() {
        let window = ReportingWindow::resolve(None, None, None);

        assert_eq!(window.statuses.len(), 4);
        assert!(!window.statuses.contains(&OrderStatus::Cancelled));
        assert!(window.statuses.contains(&OrderStatus::Pending));
    }

    #[test]
    fn bucket_keys_format_by_granularity() {
        let at = NaiveDate::from_ymd_opt(2024, 7, 5)
            .unwrap()
            .and_hms_opt(13, 45, 0)
            .unwrap()
            .and_utc();

        assert_eq!(BucketGranularity::Day.bucket_key(at), "2024-07-05");
        assert_eq!(BucketGranularity::Month.bucket_key(at), "2024-07");
    }
}
