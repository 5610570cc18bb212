use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rocket::{
    response::{
        status::BadRequest,
        content::Json,
    },
    http::Cookies,
    State,
};
use serde_json::json;

use crate::auth_sys;
use crate::store::{MemoryStore, TimeRange};
use crate::store::models::{Report, ReportStatus};
use crate::util;


type JsonResult = Result<Json<String>, BadRequest<String>>;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;


/// Aggregates the dashboard numbers over the reports that fall inside the
/// requested time range: totals, rounded emergency and resolution
/// percentages, per-category and per-status counts, and a zero-filled
/// daily trend (newest bucket first).
pub fn build_analytics(reports: &[Report], range: TimeRange, now_ms: i64)
    -> serde_json::Value {

    let filtered = reports.iter()
        .filter(|r| {
            range.window_ms().map_or(true, |w| now_ms - r.timestamp < w)
        })
        .collect::<Vec<_>>();
    let total = filtered.len();

    let mut category_counts: HashMap<String, usize> = HashMap::new();
    for report in &filtered {
        *category_counts.entry(report.display_category().to_owned())
            .or_insert(0) += 1;
    }

    let count_status = |status: ReportStatus| {
        filtered.iter().filter(|r| r.status == status).count()
    };

    let mut daily = Vec::with_capacity(range.trend_days());
    for i in 0..range.trend_days() {
        let label = day_label(now_ms - (i as i64) * DAY_MS);
        let count = filtered.iter()
            .filter(|r| day_label(r.timestamp) == label)
            .count();

        daily.push(json!({
            "date": label,
            "count": count,
        }));
    }

    let emergency_count = filtered.iter().filter(|r| r.emergency).count();
    let resolved_count = count_status(ReportStatus::Resolved);

    json!({
        "total_reports": total,
        "emergency_percentage": percentage(emergency_count, total),
        "resolution_rate": percentage(resolved_count, total),
        "categories": category_counts,
        "status": {
            "new": count_status(ReportStatus::New),
            "reviewing": count_status(ReportStatus::Reviewing),
            "resolved": count_status(ReportStatus::Resolved),
        },
        "daily": daily,
    })
}

fn percentage(count: usize, total: usize) -> u32 {
    if total == 0 {
        0
    }
    else {
        (count as f64 / total as f64 * 100.0).round() as u32
    }
}

fn day_label(timestamp_ms: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(timestamp_ms) {
        Some(date) => date.format("%b %-d").to_string(),
        None => String::new(),
    }
}


#[get("/admin/analytics?<range>")]
pub fn get_analytics(range: Option<TimeRange>, mut cookies: Cookies,
    store: State<Arc<MemoryStore>>) -> JsonResult {

    if !auth_sys::verify_admin_session(&mut cookies) {
        return Err(BadRequest(Some("Authentication failed!".into())));
    }

    let reports = store.reports();
    let data = build_analytics(&reports,
        range.unwrap_or(TimeRange::Month), util::now_millis());

    Ok(Json(data.to_string()))
}


#[cfg(test)]
mod tests {
    use super::*;

    fn report(age_ms: i64, status: ReportStatus, emergency: bool,
        category: Option<&str>, now_ms: i64) -> Report {

        Report {
            id: util::generate_rand_id(8),
            description: "test".into(),
            latitude: 0.0,
            longitude: 0.0,
            address: None,
            timestamp: now_ms - age_ms,
            media_urls: None,
            status,
            emergency,
            category: category.map(|c| c.to_owned()),
            anonymous_id: None,
        }
    }

    #[test]
    fn empty_input_yields_zeroes() {
        let data = build_analytics(&[], TimeRange::Month, util::now_millis());

        assert_eq!(data["total_reports"], 0);
        assert_eq!(data["emergency_percentage"], 0);
        assert_eq!(data["resolution_rate"], 0);
        assert_eq!(data["daily"].as_array().unwrap().len(), 30);
    }

    #[test]
    fn counts_and_rates() {
        let now = util::now_millis();
        let reports = vec![
            report(0, ReportStatus::New, true, Some("Theft"), now),
            report(DAY_MS, ReportStatus::Reviewing, true, Some("Theft"), now),
            report(2 * DAY_MS, ReportStatus::Resolved, false, None, now),
            report(3 * DAY_MS, ReportStatus::New, false, Some("Vandalism"), now),
        ];

        let data = build_analytics(&reports, TimeRange::Month, now);

        assert_eq!(data["total_reports"], 4);
        assert_eq!(data["emergency_percentage"], 50);
        assert_eq!(data["resolution_rate"], 25);
        assert_eq!(data["categories"]["Theft"], 2);
        assert_eq!(data["categories"]["Vandalism"], 1);
        assert_eq!(data["categories"]["Uncategorized"], 1);
        assert_eq!(data["status"]["new"], 2);
        assert_eq!(data["status"]["reviewing"], 1);
        assert_eq!(data["status"]["resolved"], 1);
    }

    #[test]
    fn range_excludes_old_reports() {
        let now = util::now_millis();
        let reports = vec![
            report(0, ReportStatus::New, false, None, now),
            report(10 * DAY_MS, ReportStatus::Resolved, true, None, now),
        ];

        let data = build_analytics(&reports, TimeRange::Week, now);

        assert_eq!(data["total_reports"], 1);
        assert_eq!(data["emergency_percentage"], 0);
        assert_eq!(data["resolution_rate"], 0);
        assert_eq!(data["daily"].as_array().unwrap().len(), 7);
    }

    #[test]
    fn daily_trend_buckets_todays_reports_first() {
        let now = util::now_millis();
        // Noon today avoids the bucket boundary when the test runs near
        // midnight.
        let noon = now - now.rem_euclid(DAY_MS) + DAY_MS / 2;
        let reports = vec![
            report(0, ReportStatus::New, false, None, noon),
            report(0, ReportStatus::New, false, None, noon),
        ];

        let data = build_analytics(&reports, TimeRange::Week, noon);
        let daily = data["daily"].as_array().unwrap();

        assert_eq!(daily.len(), 7);
        assert_eq!(daily[0]["count"], 2);

        for bucket in daily.iter().skip(1) {
            assert_eq!(bucket["count"], 0);
        }
    }

    #[test]
    fn rounding_matches_dashboard() {
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(5, 5), 100);
    }
}
