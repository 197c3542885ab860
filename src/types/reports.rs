//! Aggregate statistics tables: monthly usage and download reports, awstats
//! imports, generic GDC reports and per-download file reports.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::timestamps::{iso8601_spaced, iso8601_value};
use crate::error::{Error, Result};

/// Traffic figures for one site in one period. Every field defaults to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageStats {
    pub visits: i64,
    pub visitors: i64,
    pub requests: i64,
    pub network_usage: i64,
}

impl UsageStats {
    pub fn new(visits: i64, visitors: i64, requests: i64, network_usage: i64) -> Self {
        Self {
            visits,
            visitors,
            requests,
            network_usage,
        }
    }
}

fn spaced(dt: Option<&DateTime<Utc>>) -> Value {
    dt.map_or(Value::Null, |dt| Value::String(iso8601_spaced(dt)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataUsageReport {
    pub report_period: NaiveDate,
    pub all_report: UsageStats,
    pub api_report: UsageStats,
    pub portal_report: UsageStats,
    pub website_report: UsageStats,
    pub doc_site_report: UsageStats,
    pub date_created: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl DataUsageReport {
    pub fn new(report_period: NaiveDate) -> Self {
        Self {
            report_period,
            all_report: UsageStats::default(),
            api_report: UsageStats::default(),
            portal_report: UsageStats::default(),
            website_report: UsageStats::default(),
            doc_site_report: UsageStats::default(),
            date_created: None,
            last_updated: None,
        }
    }

    pub fn set_all_report(&mut self, visits: i64, visitors: i64, requests: i64, network_usage: i64) {
        self.all_report = UsageStats::new(visits, visitors, requests, network_usage);
    }

    pub fn set_api_report(&mut self, visits: i64, visitors: i64, requests: i64, network_usage: i64) {
        self.api_report = UsageStats::new(visits, visitors, requests, network_usage);
    }

    pub fn set_portal_report(
        &mut self,
        visits: i64,
        visitors: i64,
        requests: i64,
        network_usage: i64,
    ) {
        self.portal_report = UsageStats::new(visits, visitors, requests, network_usage);
    }

    pub fn set_website_report(
        &mut self,
        visits: i64,
        visitors: i64,
        requests: i64,
        network_usage: i64,
    ) {
        self.website_report = UsageStats::new(visits, visitors, requests, network_usage);
    }

    pub fn set_doc_site_report(
        &mut self,
        visits: i64,
        visitors: i64,
        requests: i64,
        network_usage: i64,
    ) {
        self.doc_site_report = UsageStats::new(visits, visitors, requests, network_usage);
    }

    pub fn to_json(&self) -> Value {
        json!({
            "report_period": self.report_period.format("%Y-%m-%d").to_string(),
            "all_report": self.all_report,
            "api_report": self.api_report,
            "portal_report": self.portal_report,
            "website_report": self.website_report,
            "doc_site_report": self.doc_site_report,
            "date_created": spaced(self.date_created.as_ref()),
            "last_updated": spaced(self.last_updated.as_ref()),
        })
    }
}

/// The four breakdowns kept by a [`DataDownloadReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadDimension {
    ProjectId,
    ExperimentalStrategy,
    AccessType,
    AccessLocation,
}

impl DownloadDimension {
    /// Column holding this breakdown.
    pub const fn column(self) -> &'static str {
        match self {
            Self::ProjectId => "project_id_report",
            Self::ExperimentalStrategy => "experimental_strategy_report",
            Self::AccessType => "access_type_report",
            Self::AccessLocation => "access_location_report",
        }
    }
}

impl FromStr for DownloadDimension {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "project_id" => Ok(Self::ProjectId),
            "experimental_strategy" => Ok(Self::ExperimentalStrategy),
            "access_type" => Ok(Self::AccessType),
            "access_location" => Ok(Self::AccessLocation),
            _ => Err(Error::invalid_value("dimension", s)),
        }
    }
}

impl fmt::Display for DownloadDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column().trim_end_matches("_report"))
    }
}

/// Downloaded volume in GB for one period, broken down four ways.
#[derive(Debug, Clone, PartialEq)]
pub struct DataDownloadReport {
    pub report_period: NaiveDate,
    pub project_id_report: BTreeMap<String, f64>,
    pub experimental_strategy_report: BTreeMap<String, f64>,
    pub access_type_report: BTreeMap<String, f64>,
    pub access_location_report: BTreeMap<String, f64>,
    pub date_created: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl DataDownloadReport {
    pub fn new(report_period: NaiveDate) -> Self {
        Self {
            report_period,
            project_id_report: BTreeMap::new(),
            experimental_strategy_report: BTreeMap::new(),
            access_type_report: BTreeMap::new(),
            access_location_report: BTreeMap::new(),
            date_created: None,
            last_updated: None,
        }
    }

    pub fn report(&self, dimension: DownloadDimension) -> &BTreeMap<String, f64> {
        match dimension {
            DownloadDimension::ProjectId => &self.project_id_report,
            DownloadDimension::ExperimentalStrategy => &self.experimental_strategy_report,
            DownloadDimension::AccessType => &self.access_type_report,
            DownloadDimension::AccessLocation => &self.access_location_report,
        }
    }

    /// Replaces the breakdown with a copy that carries `key = size`, so the
    /// field is always reassigned rather than mutated in place.
    pub fn add(&mut self, dimension: DownloadDimension, key: impl Into<String>, size: f64) {
        let mut next = self.report(dimension).clone();
        next.insert(key.into(), size);
        match dimension {
            DownloadDimension::ProjectId => self.project_id_report = next,
            DownloadDimension::ExperimentalStrategy => self.experimental_strategy_report = next,
            DownloadDimension::AccessType => self.access_type_report = next,
            DownloadDimension::AccessLocation => self.access_location_report = next,
        }
    }

    pub fn add_project_id(&mut self, project: impl Into<String>, size: f64) {
        self.add(DownloadDimension::ProjectId, project, size);
    }

    pub fn add_experimental_strategy(&mut self, strategy: impl Into<String>, size: f64) {
        self.add(DownloadDimension::ExperimentalStrategy, strategy, size);
    }

    pub fn add_access_type(&mut self, access_type: impl Into<String>, size: f64) {
        self.add(DownloadDimension::AccessType, access_type, size);
    }

    pub fn add_access_location(&mut self, location: impl Into<String>, size: f64) {
        self.add(DownloadDimension::AccessLocation, location, size);
    }

    pub fn to_json(&self) -> Value {
        json!({
            "report_period": self.report_period.format("%Y-%m-%d").to_string(),
            "project_id_report": self.project_id_report,
            "experimental_strategy_report": self.experimental_strategy_report,
            "access_type_report": self.access_type_report,
            "access_location_report": self.access_location_report,
            "date_created": spaced(self.date_created.as_ref()),
            "last_updated": spaced(self.last_updated.as_ref()),
        })
    }
}

pub const MAX_AWSTATS_SITE_LEN: usize = 50;

/// Monthly figures imported from awstats and observium, keyed by `(date, site)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlyAwstats {
    pub report_date: NaiveDate,
    pub site: String,
    pub unique_visitors: Option<i64>,
    pub number_of_visits: Option<i64>,
    pub viewed_pages: Option<i64>,
    pub viewed_hits: Option<i64>,
    pub viewed_bw_gb: Option<f64>,
    pub unviewed_pages: Option<i64>,
    pub unviewed_hits: Option<i64>,
    pub unviewed_bw_gb: Option<f64>,
    pub observium_bw_in_gb: Option<f64>,
    pub observium_bw_out_gb: Option<f64>,
}

impl MonthlyAwstats {
    pub fn new(report_date: NaiveDate, site: impl Into<String>) -> Self {
        Self {
            report_date,
            site: site.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.site.chars().count() > MAX_AWSTATS_SITE_LEN {
            return Err(Error::Validation(format!(
                "site cannot exceed {MAX_AWSTATS_SITE_LEN} characters"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GdcReport {
    /// Assigned from `gdc_reports_id_seq` when unset at insert.
    pub id: Option<i64>,
    pub program: Option<String>,
    pub project: Option<String>,
    pub report: Option<Value>,
    pub report_type: String,
    pub created_datetime: Option<DateTime<Utc>>,
}

impl GdcReport {
    pub fn new(report_type: impl Into<String>, report: Value) -> Self {
        Self {
            id: None,
            program: None,
            project: None,
            report: Some(report),
            report_type: report_type.into(),
            created_datetime: None,
        }
    }

    #[must_use]
    pub fn for_project(mut self, program: impl Into<String>, project: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self.project = Some(project.into());
        self
    }

    /// `None` unless both program and project are set.
    pub fn project_id(&self) -> Option<String> {
        match (&self.program, &self.project) {
            (Some(program), Some(project)) => Some(format!("{program}-{project}")),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "program": self.program,
            "project": self.project,
            "report": self.report,
            "report_type": self.report_type,
            "created_datetime": iso8601_value(self.created_datetime.as_ref()),
        })
    }
}

impl fmt::Display for GdcReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Report({}, {})>",
            self.id.map_or_else(|| "null".to_string(), |id| id.to_string()),
            self.report_type
        )
    }
}

/// One file download, keyed by `(id, timestamp)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileReport {
    /// Assigned from `filereport_id_seq` when unset at insert.
    pub id: Option<i64>,
    pub node_id: Option<String>,
    pub ip: Option<String>,
    pub country_code: Option<String>,
    /// Defaulted by the database at insert.
    pub timestamp: Option<DateTime<Utc>>,
    pub streamed_bytes: Option<i64>,
    pub username: Option<String>,
    pub requested_bytes: Option<i64>,
    pub report_data: Option<Value>,
}

impl FileReport {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: Some(node_id.into()),
            ..Self::default()
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "node_id": self.node_id,
            "ip": self.ip,
            "country_code": self.country_code,
            "timestamp": iso8601_value(self.timestamp.as_ref()),
            "streamed_bytes": self.streamed_bytes,
            "username": self.username,
            "requested_bytes": self.requested_bytes,
            "report_data": self.report_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike};

    use super::*;

    fn period() -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 1, 31).unwrap()
    }

    #[test]
    fn test_usage_report_defaults_and_json() {
        let mut report = DataUsageReport::new(period());
        report.set_api_report(1, 2, 3, 4);
        let created = Utc
            .with_ymd_and_hms(2019, 2, 1, 0, 0, 0)
            .unwrap()
            .with_nanosecond(5_000)
            .unwrap();
        report.date_created = Some(created);

        let doc = report.to_json();
        assert_eq!(doc["report_period"], json!("2019-01-31"));
        assert_eq!(
            doc["api_report"],
            json!({"visits": 1, "visitors": 2, "requests": 3, "network_usage": 4})
        );
        assert_eq!(
            doc["all_report"],
            json!({"visits": 0, "visitors": 0, "requests": 0, "network_usage": 0})
        );
        assert_eq!(doc["date_created"], json!("2019-02-01 00:00:00.000005+00:00"));
        assert_eq!(doc["last_updated"], Value::Null);
    }

    #[test]
    fn test_download_report_add_reassigns() {
        let mut report = DataDownloadReport::new(period());
        report.add_access_type("open", 1.5);
        report.add_access_type("controlled", 2.0);
        report.add_access_type("open", 3.0);
        report.add_access_location("US", 0.25);

        let doc = report.to_json();
        assert_eq!(doc["access_type_report"], json!({"controlled": 2.0, "open": 3.0}));
        assert_eq!(doc["access_location_report"], json!({"US": 0.25}));
        assert_eq!(doc["project_id_report"], json!({}));
    }

    #[test]
    fn test_dimension_parse() {
        assert_eq!(
            "experimental_strategy".parse::<DownloadDimension>().unwrap(),
            DownloadDimension::ExperimentalStrategy
        );
        assert_eq!(DownloadDimension::AccessLocation.to_string(), "access_location");
        assert!("country".parse::<DownloadDimension>().is_err());
    }

    #[test]
    fn test_awstats_site_length() {
        assert!(MonthlyAwstats::new(period(), "a".repeat(50)).validate().is_ok());
        assert!(MonthlyAwstats::new(period(), "a".repeat(51)).validate().is_err());
    }

    #[test]
    fn test_gdc_report_project_id() {
        let report = GdcReport::new("cases", json!({"count": 3}));
        assert_eq!(report.project_id(), None);
        let report = report.for_project("TCGA", "BRCA");
        assert_eq!(report.project_id().as_deref(), Some("TCGA-BRCA"));
        assert_eq!(report.to_string(), "<Report(null, cases)>");
    }
}
