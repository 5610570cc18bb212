pub mod models;


use std::fmt;
use std::sync::RwLock;

use rocket::http::RawStr;
use rocket::request::FromFormValue;

use crate::geo;
use crate::util;

use self::models::{NewReport, NewSafetyTip, Report, ReportStatus, SafetyTip};


const ID_LENGTH: usize = 32;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreError {
    ReportNotFound,
    TipNotFound,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::ReportNotFound => write!(f, "Report not found"),
            StoreError::TipNotFound => write!(f, "Safety tip not found"),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;


/// What `update_report_status` does when the id does not exist:
/// swallow the update as a no-op, or make the miss visible to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingReportPolicy {
    Ignore,
    Error,
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeRange {
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeRange {
    pub fn window_ms(&self) -> Option<i64> {
        const DAY_MS: i64 = 24 * 60 * 60 * 1000;

        match self {
            TimeRange::Day => Some(DAY_MS),
            TimeRange::Week => Some(7 * DAY_MS),
            TimeRange::Month => Some(30 * DAY_MS),
            TimeRange::Year => Some(365 * DAY_MS),
            TimeRange::All => None,
        }
    }

    /// Number of buckets shown by the daily trend chart.
    pub fn trend_days(&self) -> usize {
        match self {
            TimeRange::Week => 7,
            TimeRange::Month => 30,
            _ => 90,
        }
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        TimeRange::All
    }
}

impl<'v> FromFormValue<'v> for TimeRange {
    type Error = &'v RawStr;

    fn from_form_value(form_value: &'v RawStr) -> Result<Self, Self::Error> {
        match form_value.as_str() {
            "day" => Ok(TimeRange::Day),
            "week" => Ok(TimeRange::Week),
            "month" => Ok(TimeRange::Month),
            "year" => Ok(TimeRange::Year),
            "all" => Ok(TimeRange::All),
            _ => Err(form_value),
        }
    }
}


/// Independent predicates combined by conjunction. Unset fields match
/// everything.
#[derive(Default)]
pub struct ReportFilter {
    pub search: Option<String>,
    pub category: Option<String>,
    pub status: Option<ReportStatus>,
    pub emergency: Option<bool>,
    pub range: TimeRange,
}

impl ReportFilter {
    pub fn matches(&self, report: &Report, now_ms: i64) -> bool {
        if let Some(q) = &self.search {
            let q = q.to_lowercase();
            let hit = report.description.to_lowercase().contains(&q)
                || report.category.as_ref()
                    .map_or(false, |c| c.to_lowercase().contains(&q))
                || report.address.as_ref()
                    .map_or(false, |a| a.to_lowercase().contains(&q));

            if !hit {
                return false;
            }
        }

        if let Some(category) = &self.category {
            if report.display_category() != category {
                return false;
            }
        }

        if let Some(status) = self.status {
            if report.status != status {
                return false;
            }
        }

        if let Some(emergency) = self.emergency {
            if report.emergency != emergency {
                return false;
            }
        }

        if let Some(window) = self.range.window_ms() {
            if now_ms - report.timestamp >= window {
                return false;
            }
        }

        true
    }
}


/// Canonical in-memory collections. All mutation goes through here; the
/// collections only grow and nothing survives process teardown.
pub struct MemoryStore {
    reports: RwLock<Vec<Report>>,
    tips: RwLock<Vec<SafetyTip>>,
    missing_report: MissingReportPolicy,
}

impl MemoryStore {
    pub fn new(missing_report: MissingReportPolicy) -> Self {
        MemoryStore::with_data(missing_report, Vec::new(), Vec::new())
    }

    pub fn with_data(missing_report: MissingReportPolicy,
        reports: Vec<Report>, tips: Vec<SafetyTip>) -> Self {

        MemoryStore {
            reports: RwLock::new(reports),
            tips: RwLock::new(tips),
            missing_report,
        }
    }

    /// Assigns a fresh unique id, stamps the current time, forces status
    /// to `new` and prepends so that iteration order is newest-first.
    /// Field validation is the route layer's job.
    pub fn insert_report(&self, new: NewReport) -> Report {
        let mut reports = self.reports.write().unwrap();

        let report = Report {
            id: fresh_id(reports.iter().map(|r| r.id.as_str())),
            description: new.description,
            latitude: new.latitude,
            longitude: new.longitude,
            address: new.address,
            timestamp: util::now_millis(),
            media_urls: new.media_urls,
            status: ReportStatus::New,
            emergency: new.emergency,
            category: new.category,
            anonymous_id: new.anonymous_id,
        };

        reports.insert(0, report.clone());

        report
    }

    pub fn get_report(&self, id: &str) -> StoreResult<Report> {
        self.reports.read().unwrap().iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(StoreError::ReportNotFound)
    }

    /// Newest-first snapshot of the whole collection.
    pub fn reports(&self) -> Vec<Report> {
        self.reports.read().unwrap().clone()
    }

    pub fn reports_since(&self, cutoff_ms: i64) -> Vec<Report> {
        self.reports.read().unwrap().iter()
            .filter(|r| r.timestamp >= cutoff_ms)
            .cloned()
            .collect()
    }

    /// Replaces status in place, leaving every other field untouched.
    /// Returns whether a report was updated; an unknown id is an error or
    /// a no-op depending on the constructor policy.
    pub fn update_report_status(&self, id: &str, status: ReportStatus)
        -> StoreResult<bool> {

        let mut reports = self.reports.write().unwrap();

        match reports.iter_mut().find(|r| r.id == id) {
            Some(report) => {
                report.status = status;
                Ok(true)
            },
            None => {
                match self.missing_report {
                    MissingReportPolicy::Ignore => Ok(false),
                    MissingReportPolicy::Error => Err(StoreError::ReportNotFound),
                }
            },
        }
    }

    /// All reports within `radius_km` of the given point, inclusive at the
    /// boundary. Order matches the store's newest-first iteration order;
    /// no re-sort by distance.
    pub fn reports_within(&self, lat: f64, lng: f64, radius_km: f64) -> Vec<Report> {
        self.reports.read().unwrap().iter()
            .filter(|r| geo::distance_km(lat, lng, r.latitude, r.longitude) <= radius_km)
            .cloned()
            .collect()
    }

    pub fn filter_reports(&self, filter: &ReportFilter) -> Vec<Report> {
        let now = util::now_millis();

        self.reports.read().unwrap().iter()
            .filter(|r| filter.matches(r, now))
            .cloned()
            .collect()
    }

    pub fn insert_tip(&self, new: NewSafetyTip) -> SafetyTip {
        let mut tips = self.tips.write().unwrap();

        let tip = SafetyTip {
            id: fresh_id(tips.iter().map(|t| t.id.as_str())),
            title: new.title,
            content: new.content,
            category: new.category,
            timestamp: util::now_millis(),
        };

        tips.insert(0, tip.clone());

        tip
    }

    pub fn get_tip(&self, id: &str) -> StoreResult<SafetyTip> {
        self.tips.read().unwrap().iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(StoreError::TipNotFound)
    }

    pub fn tips(&self) -> Vec<SafetyTip> {
        self.tips.read().unwrap().clone()
    }
}

fn fresh_id<'a, I>(existing: I) -> String where
    I: Iterator<Item = &'a str> {

    let taken: Vec<&str> = existing.collect();

    loop {
        let id = util::generate_rand_id(ID_LENGTH);

        if !taken.iter().any(|&t| t == id) {
            break id;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn plain_report(description: &str, lat: f64, lng: f64) -> NewReport {
        NewReport {
            description: description.into(),
            latitude: lat,
            longitude: lng,
            address: None,
            media_urls: None,
            emergency: false,
            category: None,
            anonymous_id: None,
        }
    }

    fn full_report() -> NewReport {
        NewReport {
            description: "Hit and run near the mall".into(),
            latitude: 23.2315,
            longitude: 77.4219,
            address: Some("DB City Mall, Bhopal".into()),
            media_urls: Some(vec!["media/abc.jpg".into()]),
            emergency: true,
            category: Some("Traffic Incident".into()),
            anonymous_id: Some("anon-42".into()),
        }
    }

    #[test]
    fn insert_assigns_fresh_fields() {
        let store = MemoryStore::new(MissingReportPolicy::Ignore);

        let first = store.insert_report(plain_report("first", 1.0, 2.0));
        let second = store.insert_report(plain_report("second", 3.0, 4.0));

        assert_eq!(first.id.len(), ID_LENGTH);
        assert_ne!(first.id, second.id);
        assert_eq!(first.status, ReportStatus::New);
        assert_eq!(second.status, ReportStatus::New);
        assert!(second.timestamp >= first.timestamp);

        // Newest first.
        let all = store.reports();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);
        assert_eq!(all[1].id, first.id);
    }

    #[test]
    fn update_status_changes_only_status() {
        let store = MemoryStore::new(MissingReportPolicy::Error);
        let created = store.insert_report(full_report());

        store.update_report_status(&created.id, ReportStatus::Resolved).unwrap();
        store.update_report_status(&created.id, ReportStatus::Reviewing).unwrap();

        let after = store.get_report(&created.id).unwrap();
        assert_eq!(after.status, ReportStatus::Reviewing);
        assert_eq!(after.id, created.id);
        assert_eq!(after.description, created.description);
        assert_eq!(after.latitude, created.latitude);
        assert_eq!(after.longitude, created.longitude);
        assert_eq!(after.address, created.address);
        assert_eq!(after.timestamp, created.timestamp);
        assert_eq!(after.media_urls, created.media_urls);
        assert_eq!(after.emergency, created.emergency);
        assert_eq!(after.category, created.category);
        assert_eq!(after.anonymous_id, created.anonymous_id);
    }

    #[test]
    fn update_unknown_id_ignore_policy() {
        let store = MemoryStore::new(MissingReportPolicy::Ignore);

        assert_eq!(store.update_report_status("missing", ReportStatus::Resolved),
            Ok(false));
    }

    #[test]
    fn update_unknown_id_error_policy() {
        let store = MemoryStore::new(MissingReportPolicy::Error);

        assert_eq!(store.update_report_status("missing", ReportStatus::Resolved),
            Err(StoreError::ReportNotFound));
    }

    #[test]
    fn radius_query_includes_near_and_excludes_far() {
        let store = MemoryStore::new(MissingReportPolicy::Ignore);
        let report = store.insert_report(plain_report("at the lake", 23.2599, 77.4126));

        let near = store.reports_within(23.2599, 77.4126, 1.0);
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].id, report.id);

        let far = store.reports_within(0.0, 0.0, 1.0);
        assert!(far.is_empty());
    }

    #[test]
    fn radius_query_city_scale() {
        let store = MemoryStore::new(MissingReportPolicy::Ignore);
        let lake = store.insert_report(plain_report("lake", 23.2599, 77.4126));
        let mall = store.insert_report(plain_report("mall", 23.2315, 77.4219));

        // The two points are roughly 3.3 km apart.
        let both = store.reports_within(23.2599, 77.4126, 5.0);
        assert_eq!(both.len(), 2);
        // Store order, not distance order.
        assert_eq!(both[0].id, mall.id);
        assert_eq!(both[1].id, lake.id);

        let only_lake = store.reports_within(23.2599, 77.4126, 2.0);
        assert_eq!(only_lake.len(), 1);
        assert_eq!(only_lake[0].id, lake.id);
    }

    #[test]
    fn radius_query_boundary_is_inclusive() {
        let store = MemoryStore::new(MissingReportPolicy::Ignore);
        store.insert_report(plain_report("mall", 23.2315, 77.4219));

        let exact = crate::geo::distance_km(23.2599, 77.4126, 23.2315, 77.4219);

        assert_eq!(store.reports_within(23.2599, 77.4126, exact).len(), 1);
    }

    #[test]
    fn filter_category_defaults_to_uncategorized() {
        let store = MemoryStore::new(MissingReportPolicy::Ignore);
        store.insert_report(plain_report("no category", 0.0, 0.0));

        let mut tagged = plain_report("tagged", 0.0, 0.0);
        tagged.category = Some("Theft".into());
        store.insert_report(tagged);

        let filter = ReportFilter {
            category: Some(models::UNCATEGORIZED.into()),
            ..Default::default()
        };
        let found = store.filter_reports(&filter);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].description, "no category");

        let filter = ReportFilter {
            category: Some("Theft".into()),
            ..Default::default()
        };
        assert_eq!(store.filter_reports(&filter).len(), 1);
    }

    #[test]
    fn filter_search_is_case_insensitive() {
        let store = MemoryStore::new(MissingReportPolicy::Ignore);

        let mut report = plain_report("Suspicious activity near the PARK", 0.0, 0.0);
        report.category = Some("Vandalism".into());
        report.address = Some("Collectorate Complex".into());
        store.insert_report(report);

        for q in &["park", "vandal", "collectorate"] {
            let filter = ReportFilter {
                search: Some(q.to_string()),
                ..Default::default()
            };
            assert_eq!(store.filter_reports(&filter).len(), 1, "query: {}", q);
        }

        let filter = ReportFilter {
            search: Some("nowhere".into()),
            ..Default::default()
        };
        assert!(store.filter_reports(&filter).is_empty());
    }

    #[test]
    fn filter_status_and_emergency() {
        let store = MemoryStore::new(MissingReportPolicy::Error);

        let mut sos = plain_report("sos", 0.0, 0.0);
        sos.emergency = true;
        let sos = store.insert_report(sos);
        let calm = store.insert_report(plain_report("calm", 0.0, 0.0));

        store.update_report_status(&calm.id, ReportStatus::Resolved).unwrap();

        let filter = ReportFilter {
            emergency: Some(true),
            ..Default::default()
        };
        let found = store.filter_reports(&filter);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, sos.id);

        let filter = ReportFilter {
            status: Some(ReportStatus::Resolved),
            emergency: Some(false),
            ..Default::default()
        };
        let found = store.filter_reports(&filter);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, calm.id);
    }

    #[test]
    fn filter_time_windows() {
        const HOUR_MS: i64 = 60 * 60 * 1000;
        const DAY_MS: i64 = 24 * HOUR_MS;

        let now = util::now_millis();
        let aged = |age_ms: i64| Report {
            id: util::generate_rand_id(ID_LENGTH),
            description: "aged".into(),
            latitude: 0.0,
            longitude: 0.0,
            address: None,
            timestamp: now - age_ms,
            media_urls: None,
            status: ReportStatus::New,
            emergency: false,
            category: None,
            anonymous_id: None,
        };

        let reports = vec![
            aged(HOUR_MS),
            aged(3 * DAY_MS),
            aged(20 * DAY_MS),
            aged(100 * DAY_MS),
        ];
        let store = MemoryStore::with_data(MissingReportPolicy::Ignore,
            reports, Vec::new());

        let count = |range: TimeRange| {
            let filter = ReportFilter { range, ..Default::default() };
            store.filter_reports(&filter).len()
        };

        assert_eq!(count(TimeRange::Day), 1);
        assert_eq!(count(TimeRange::Week), 2);
        assert_eq!(count(TimeRange::Month), 3);
        assert_eq!(count(TimeRange::Year), 4);
        assert_eq!(count(TimeRange::All), 4);
    }

    #[test]
    fn tips_prepend_newest_first() {
        let store = MemoryStore::new(MissingReportPolicy::Ignore);

        let first = store.insert_tip(NewSafetyTip {
            title: "Stay Safe After Dark".into(),
            content: "Stick to well-lit areas.".into(),
            category: "Personal Safety".into(),
        });
        let second = store.insert_tip(NewSafetyTip {
            title: "Secure Your Home".into(),
            content: "Use timer lights.".into(),
            category: "Home Security".into(),
        });

        assert_ne!(first.id, second.id);

        let tips = store.tips();
        assert_eq!(tips.len(), 2);
        assert_eq!(tips[0].id, second.id);
        assert_eq!(tips[1].id, first.id);

        assert_eq!(store.get_tip(&first.id).unwrap().title, "Stay Safe After Dark");
        assert_eq!(store.get_tip("missing"), Err(StoreError::TipNotFound));
    }
}
