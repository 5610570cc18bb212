use rocket::http::RawStr;
use rocket::request::FromFormValue;


/// Rendered in place of an unset report category by every consumer.
pub const UNCATEGORIZED: &'static str = "Uncategorized";


#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReportStatus {
    New,
    Reviewing,
    Resolved,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::New => "new",
            ReportStatus::Reviewing => "reviewing",
            ReportStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(ReportStatus::New),
            "reviewing" => Some(ReportStatus::Reviewing),
            "resolved" => Some(ReportStatus::Resolved),
            _ => None,
        }
    }
}

impl<'v> FromFormValue<'v> for ReportStatus {
    type Error = &'v RawStr;

    fn from_form_value(form_value: &'v RawStr) -> Result<Self, Self::Error> {
        ReportStatus::parse(form_value.as_str()).ok_or(form_value)
    }
}


#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    pub id: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub timestamp: i64,
    pub media_urls: Option<Vec<String>>,
    pub status: ReportStatus,
    pub emergency: bool,
    pub category: Option<String>,
    pub anonymous_id: Option<String>,
}

impl Report {
    pub fn display_category(&self) -> &str {
        self.category.as_deref().unwrap_or(UNCATEGORIZED)
    }
}

/// A report as submitted. Id, timestamp and status are owned by the store.
pub struct NewReport {
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub media_urls: Option<Vec<String>>,
    pub emergency: bool,
    pub category: Option<String>,
    pub anonymous_id: Option<String>,
}


#[derive(Clone, Debug, PartialEq)]
pub struct SafetyTip {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    pub timestamp: i64,
}

pub struct NewSafetyTip {
    pub title: String,
    pub content: String,
    pub category: String,
}
