use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{
    SqliteStore, date_column, datetime_column, decoded_column, format_date, format_datetime,
    json_text, nextval, now, optional_json_column,
};
use crate::error::{Error, Result};
use crate::store::ReportStore;
use crate::store::constraint::{Operation, translate};
use crate::types::*;

const USAGE_COLUMNS: &str = "report_period, all_report, api_report, portal_report, \
    website_report, doc_site_report, date_created, last_updated";
const DOWNLOAD_COLUMNS: &str = "report_period, project_id_report, experimental_strategy_report, \
    access_type_report, access_location_report, date_created, last_updated";
const AWSTATS_COLUMNS: &str = "date, site, unique_visitors, number_of_visits, viewed_pages, \
    viewed_hits, viewed_bw_gb, unviewed_pages, unviewed_hits, unviewed_bw_gb, \
    observium_bw_in_gb, observium_bw_out_gb";
const GDC_REPORT_COLUMNS: &str = "id, program, project, report, report_type, created_datetime";
const FILE_REPORT_COLUMNS: &str = "id, node_id, ip, country_code, timestamp, streamed_bytes, \
    username, requested_bytes, report_data";

fn usage_from_row(row: &Row<'_>) -> rusqlite::Result<DataUsageReport> {
    Ok(DataUsageReport {
        report_period: date_column(row, 0)?,
        all_report: decoded_column(row, 1)?,
        api_report: decoded_column(row, 2)?,
        portal_report: decoded_column(row, 3)?,
        website_report: decoded_column(row, 4)?,
        doc_site_report: decoded_column(row, 5)?,
        date_created: Some(datetime_column(row, 6)?),
        last_updated: Some(datetime_column(row, 7)?),
    })
}

fn download_from_row(row: &Row<'_>) -> rusqlite::Result<DataDownloadReport> {
    Ok(DataDownloadReport {
        report_period: date_column(row, 0)?,
        project_id_report: decoded_column(row, 1)?,
        experimental_strategy_report: decoded_column(row, 2)?,
        access_type_report: decoded_column(row, 3)?,
        access_location_report: decoded_column(row, 4)?,
        date_created: Some(datetime_column(row, 5)?),
        last_updated: Some(datetime_column(row, 6)?),
    })
}

fn awstats_from_row(row: &Row<'_>) -> rusqlite::Result<MonthlyAwstats> {
    Ok(MonthlyAwstats {
        report_date: date_column(row, 0)?,
        site: row.get(1)?,
        unique_visitors: row.get(2)?,
        number_of_visits: row.get(3)?,
        viewed_pages: row.get(4)?,
        viewed_hits: row.get(5)?,
        viewed_bw_gb: row.get(6)?,
        unviewed_pages: row.get(7)?,
        unviewed_hits: row.get(8)?,
        unviewed_bw_gb: row.get(9)?,
        observium_bw_in_gb: row.get(10)?,
        observium_bw_out_gb: row.get(11)?,
    })
}

fn gdc_report_from_row(row: &Row<'_>) -> rusqlite::Result<GdcReport> {
    Ok(GdcReport {
        id: Some(row.get(0)?),
        program: row.get(1)?,
        project: row.get(2)?,
        report: optional_json_column(row, 3)?,
        report_type: row.get(4)?,
        created_datetime: Some(datetime_column(row, 5)?),
    })
}

fn file_report_from_row(row: &Row<'_>) -> rusqlite::Result<FileReport> {
    Ok(FileReport {
        id: Some(row.get(0)?),
        node_id: row.get(1)?,
        ip: row.get(2)?,
        country_code: row.get(3)?,
        timestamp: Some(datetime_column(row, 4)?),
        streamed_bytes: row.get(5)?,
        username: row.get(6)?,
        requested_bytes: row.get(7)?,
        report_data: optional_json_column(row, 8)?,
    })
}

fn select_usage(conn: &Connection, period: NaiveDate) -> Result<Option<DataUsageReport>> {
    conn.query_row(
        &format!("SELECT {USAGE_COLUMNS} FROM data_usage_report WHERE report_period = ?1"),
        params![format_date(&period)],
        usage_from_row,
    )
    .optional()
    .map_err(Error::from)
}

fn select_download(conn: &Connection, period: NaiveDate) -> Result<Option<DataDownloadReport>> {
    conn.query_row(
        &format!("SELECT {DOWNLOAD_COLUMNS} FROM data_download_report WHERE report_period = ?1"),
        params![format_date(&period)],
        download_from_row,
    )
    .optional()
    .map_err(Error::from)
}

/// Writes the whole download report, keeping `date_created` of an existing row.
fn write_download(conn: &Connection, report: &DataDownloadReport) -> Result<DataDownloadReport> {
    let ts = now();
    conn.execute(
        "INSERT INTO data_download_report (report_period, project_id_report,
             experimental_strategy_report, access_type_report, access_location_report,
             date_created, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (report_period) DO UPDATE SET
             project_id_report = excluded.project_id_report,
             experimental_strategy_report = excluded.experimental_strategy_report,
             access_type_report = excluded.access_type_report,
             access_location_report = excluded.access_location_report,
             last_updated = excluded.last_updated",
        params![
            format_date(&report.report_period),
            serde_json::to_string(&report.project_id_report)?,
            serde_json::to_string(&report.experimental_strategy_report)?,
            serde_json::to_string(&report.access_type_report)?,
            serde_json::to_string(&report.access_location_report)?,
            format_datetime(&report.date_created.unwrap_or(ts)),
            format_datetime(&ts),
        ],
    )
    .map_err(|e| translate(conn, e, &Operation::insert("data_download_report")))?;

    select_download(conn, report.report_period)?.ok_or(Error::NotFound)
}

impl ReportStore for SqliteStore {
    fn upsert_usage_report(&self, report: &DataUsageReport) -> Result<DataUsageReport> {
        let ts = now();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO data_usage_report (report_period, all_report, api_report, portal_report,
                 website_report, doc_site_report, date_created, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (report_period) DO UPDATE SET
                 all_report = excluded.all_report,
                 api_report = excluded.api_report,
                 portal_report = excluded.portal_report,
                 website_report = excluded.website_report,
                 doc_site_report = excluded.doc_site_report,
                 last_updated = excluded.last_updated",
            params![
                format_date(&report.report_period),
                serde_json::to_string(&report.all_report)?,
                serde_json::to_string(&report.api_report)?,
                serde_json::to_string(&report.portal_report)?,
                serde_json::to_string(&report.website_report)?,
                serde_json::to_string(&report.doc_site_report)?,
                format_datetime(&report.date_created.unwrap_or(ts)),
                format_datetime(&ts),
            ],
        )
        .map_err(|e| translate(&conn, e, &Operation::insert("data_usage_report")))?;

        select_usage(&conn, report.report_period)?.ok_or(Error::NotFound)
    }

    fn get_usage_report(&self, period: NaiveDate) -> Result<Option<DataUsageReport>> {
        select_usage(&self.conn(), period)
    }

    fn upsert_download_report(&self, report: &DataDownloadReport) -> Result<DataDownloadReport> {
        write_download(&self.conn(), report)
    }

    fn get_download_report(&self, period: NaiveDate) -> Result<Option<DataDownloadReport>> {
        select_download(&self.conn(), period)
    }

    fn add_download_report_entry(
        &self,
        period: NaiveDate,
        dimension: DownloadDimension,
        key: &str,
        size: f64,
    ) -> Result<DataDownloadReport> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let mut report =
            select_download(&tx, period)?.unwrap_or_else(|| DataDownloadReport::new(period));
        report.add(dimension, key, size);
        let written = write_download(&tx, &report)?;

        tx.commit()?;
        Ok(written)
    }

    fn upsert_monthly_awstats(&self, stats: &MonthlyAwstats) -> Result<MonthlyAwstats> {
        stats.validate()?;

        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO monthly_awstats ({AWSTATS_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                format_date(&stats.report_date),
                stats.site,
                stats.unique_visitors,
                stats.number_of_visits,
                stats.viewed_pages,
                stats.viewed_hits,
                stats.viewed_bw_gb,
                stats.unviewed_pages,
                stats.unviewed_hits,
                stats.unviewed_bw_gb,
                stats.observium_bw_in_gb,
                stats.observium_bw_out_gb,
            ],
        )
        .map_err(|e| translate(&conn, e, &Operation::insert("monthly_awstats")))?;
        Ok(stats.clone())
    }

    fn get_monthly_awstats(&self, date: NaiveDate, site: &str) -> Result<Option<MonthlyAwstats>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {AWSTATS_COLUMNS} FROM monthly_awstats WHERE date = ?1 AND site = ?2"),
            params![format_date(&date), site],
            awstats_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn create_gdc_report(&self, report: &GdcReport) -> Result<GdcReport> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let id = match report.id {
            Some(id) => id,
            None => nextval(&tx, "gdc_reports_id_seq")?,
        };
        let created = GdcReport {
            id: Some(id),
            created_datetime: Some(report.created_datetime.unwrap_or_else(now)),
            ..report.clone()
        };
        let body = match &created.report {
            Some(value) => json_text(value)?,
            None => None,
        };

        tx.execute(
            "INSERT INTO gdc_reports (id, program, project, report, report_type, created_datetime)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                created.program,
                created.project,
                body,
                created.report_type,
                created.created_datetime.as_ref().map(format_datetime),
            ],
        )
        .map_err(|e| translate(&tx, e, &Operation::insert("gdc_reports").value("id", id)))?;

        tx.commit()?;
        Ok(created)
    }

    fn get_gdc_report(&self, id: i64) -> Result<Option<GdcReport>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {GDC_REPORT_COLUMNS} FROM gdc_reports WHERE id = ?1"),
            params![id],
            gdc_report_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Newest first.
    fn list_gdc_reports(&self, report_type: &str) -> Result<Vec<GdcReport>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {GDC_REPORT_COLUMNS} FROM gdc_reports WHERE report_type = ?1
             ORDER BY created_datetime DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![report_type], gdc_report_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn create_file_report(&self, report: &FileReport) -> Result<FileReport> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let id = match report.id {
            Some(id) => id,
            None => nextval(&tx, "filereport_id_seq")?,
        };
        let created = FileReport {
            id: Some(id),
            timestamp: Some(report.timestamp.unwrap_or_else(now)),
            ..report.clone()
        };
        let report_data = match &created.report_data {
            Some(value) => json_text(value)?,
            None => None,
        };

        tx.execute(
            &format!(
                "INSERT INTO filereport ({FILE_REPORT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                id,
                created.node_id,
                created.ip,
                created.country_code,
                created.timestamp.as_ref().map(format_datetime),
                created.streamed_bytes,
                created.username,
                created.requested_bytes,
                report_data,
            ],
        )
        .map_err(|e| translate(&tx, e, &Operation::insert("filereport").value("id", id)))?;

        tx.commit()?;
        Ok(created)
    }

    fn list_file_reports(&self, node_id: &str) -> Result<Vec<FileReport>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FILE_REPORT_COLUMNS} FROM filereport WHERE node_id = ?1
             ORDER BY timestamp, id"
        ))?;
        let rows = stmt.query_map(params![node_id], file_report_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::test_store;
    use super::*;
    use crate::error::ConstraintKind;

    fn period() -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 1, 31).unwrap()
    }

    #[test]
    fn test_usage_report_upsert_keeps_date_created() {
        let (_temp, store) = test_store();
        let mut report = DataUsageReport::new(period());
        report.set_portal_report(10, 5, 100, 2048);
        let first = store.upsert_usage_report(&report).unwrap();
        assert_eq!(first.portal_report, UsageStats::new(10, 5, 100, 2048));
        assert_eq!(first.all_report, UsageStats::default());

        report.set_portal_report(11, 5, 120, 4096);
        let second = store.upsert_usage_report(&report).unwrap();
        assert_eq!(second.portal_report.visits, 11);
        assert_eq!(second.date_created, first.date_created);
        assert!(second.last_updated >= first.last_updated);

        assert_eq!(store.get_usage_report(period()).unwrap(), Some(second));
    }

    #[test]
    fn test_usage_report_database_defaults() {
        let (_temp, store) = test_store();
        store
            .connection()
            .execute(
                "INSERT INTO data_usage_report (report_period) VALUES ('2018-12-31')",
                [],
            )
            .unwrap();
        let report = store
            .get_usage_report(NaiveDate::from_ymd_opt(2018, 12, 31).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(report.doc_site_report, UsageStats::default());
    }

    #[test]
    fn test_download_entries_replace_per_dimension() {
        let (_temp, store) = test_store();
        store
            .add_download_report_entry(period(), DownloadDimension::AccessType, "open", 1.5)
            .unwrap();
        store
            .add_download_report_entry(period(), DownloadDimension::AccessType, "controlled", 2.0)
            .unwrap();
        store
            .add_download_report_entry(period(), DownloadDimension::AccessType, "open", 3.0)
            .unwrap();
        let report = store
            .add_download_report_entry(period(), DownloadDimension::ProjectId, "TCGA-BRCA", 0.5)
            .unwrap();

        assert_eq!(report.access_type_report.len(), 2);
        assert_eq!(report.access_type_report.get("open"), Some(&3.0));
        assert_eq!(report.project_id_report.get("TCGA-BRCA"), Some(&0.5));
        assert!(report.access_location_report.is_empty());
        assert_eq!(
            store.get_download_report(period()).unwrap().unwrap().to_json()["access_type_report"],
            json!({"controlled": 2.0, "open": 3.0})
        );
    }

    #[test]
    fn test_awstats() {
        let (_temp, store) = test_store();
        let mut stats = MonthlyAwstats::new(period(), "portal.gdc.cancer.gov");
        stats.unique_visitors = Some(1200);
        stats.viewed_bw_gb = Some(12.5);
        store.upsert_monthly_awstats(&stats).unwrap();

        stats.unique_visitors = Some(1300);
        store.upsert_monthly_awstats(&stats).unwrap();

        let fetched = store
            .get_monthly_awstats(period(), "portal.gdc.cancer.gov")
            .unwrap()
            .unwrap();
        assert_eq!(fetched, stats);

        let long = MonthlyAwstats::new(period(), "s".repeat(MAX_AWSTATS_SITE_LEN + 1));
        assert!(matches!(
            store.upsert_monthly_awstats(&long),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_gdc_reports_by_type() {
        let (_temp, store) = test_store();
        let first = store
            .create_gdc_report(&GdcReport::new("data_release", json!({"cases": 10})))
            .unwrap();
        let second = store
            .create_gdc_report(
                &GdcReport::new("data_release", json!({"cases": 12})).for_project("TCGA", "BRCA"),
            )
            .unwrap();
        store
            .create_gdc_report(&GdcReport::new("other", json!({})))
            .unwrap();

        let reports = store.list_gdc_reports("data_release").unwrap();
        let ids: Vec<_> = reports.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(reports[0].project_id().as_deref(), Some("TCGA-BRCA"));
        assert_eq!(store.get_gdc_report(1).unwrap(), Some(first));
    }

    #[test]
    fn test_file_reports() {
        let (_temp, store) = test_store();
        let mut report = FileReport::new("file-1");
        report.streamed_bytes = Some(512);
        report.report_data = Some(json!({"range": "bytes=0-511"}));
        let created = store.create_file_report(&report).unwrap();
        assert_eq!(created.id, Some(1));

        let err = store.create_file_report(&created).unwrap_err();
        let violation = err.integrity().unwrap();
        assert!(violation.is(ConstraintKind::Unique));
        assert_eq!(violation.constraint(), Some("filereport_pkey"));

        assert_eq!(store.list_file_reports("file-1").unwrap(), vec![created]);
        assert!(store.list_file_reports("file-2").unwrap().is_empty());
    }
}
