mod constraint;
pub mod migrations;
pub mod schema;
mod sqlite;

pub use migrations::{Migration, Target};
pub use schema::Module;
pub use sqlite::SqliteStore;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::types::*;

/// Store defines the database interface: one sub-trait per table family.
pub trait Store:
    BatchStore
    + CohortStore
    + EntitySetStore
    + ReleasedDataStore
    + StudyStore
    + StudyRuleStore
    + NotificationStore
    + SubmissionStore
    + ReportStore
    + RedactionStore
    + QcReportStore
    + Send
    + Sync
{
    /// Brings the schema to the head revision. Safe to call repeatedly.
    fn initialize(&self) -> Result<()>;

    fn close(&self) -> Result<()>;
}

pub trait BatchStore {
    /// Inserts the batch and its members in one transaction. The id comes
    /// from `batch_id_seq` when unset.
    fn create_batch(&self, batch: &Batch) -> Result<Batch>;
    fn get_batch(&self, id: i64) -> Result<Option<Batch>>;
    fn list_batches(&self, project_id: &str) -> Result<Vec<Batch>>;
    fn update_batch(&self, batch: &Batch) -> Result<Batch>;
    fn delete_batch(&self, id: i64) -> Result<bool>;

    fn add_batch_member(&self, member: &BatchMembership) -> Result<BatchMembership>;
    fn remove_batch_member(&self, batch_id: i64, node_id: &str) -> Result<bool>;
    fn move_batch_member(&self, node_id: &str, from: i64, to: i64) -> Result<BatchMembership>;
    fn list_batch_members(&self, batch_id: i64) -> Result<Vec<BatchMembership>>;
}

pub trait CohortStore {
    fn create_anonymous_context(&self, context: &AnonymousContext) -> Result<AnonymousContext>;
    fn get_anonymous_context(&self, id: Uuid) -> Result<Option<AnonymousContext>>;
    /// Cascades to the context's cohorts, their filters and snapshots.
    fn delete_anonymous_context(&self, id: Uuid) -> Result<bool>;

    fn create_cohort(&self, cohort: &Cohort) -> Result<Cohort>;
    fn get_cohort(&self, id: Uuid) -> Result<Option<Cohort>>;
    fn list_cohorts(&self, context_id: Uuid) -> Result<Vec<Cohort>>;
    fn rename_cohort(&self, id: Uuid, name: &str) -> Result<Cohort>;
    fn delete_cohort(&self, id: Uuid) -> Result<bool>;

    fn create_cohort_filter(&self, filter: &CohortFilter) -> Result<CohortFilter>;
    /// Adds a filter whose parent is the cohort's current filter.
    fn append_cohort_filter(
        &self,
        cohort_id: Uuid,
        filters: &Value,
        cohort_type: CohortType,
    ) -> Result<CohortFilter>;
    fn get_cohort_filter(&self, id: i64) -> Result<Option<CohortFilter>>;
    fn get_current_filter(&self, cohort_id: Uuid) -> Result<Option<CohortFilter>>;
    /// Newest first.
    fn filter_history(&self, cohort_id: Uuid) -> Result<Vec<CohortFilter>>;

    fn create_cohort_snapshot(&self, snapshot: &CohortSnapshot) -> Result<CohortSnapshot>;
    fn get_cohort_snapshot(&self, id: i64) -> Result<Option<CohortSnapshot>>;
    fn get_cohort_snapshot_for_filter(&self, filter_id: i64) -> Result<Option<CohortSnapshot>>;
}

pub trait EntitySetStore {
    fn create_entity_set(&self, set: &EntitySet) -> Result<EntitySet>;
    fn get_entity_set(&self, id: &str) -> Result<Option<EntitySet>>;
    fn update_entity_set(&self, set: &EntitySet) -> Result<EntitySet>;
    fn mark_entity_set_accessed(&self, id: &str) -> Result<EntitySet>;
    fn delete_entity_set(&self, id: &str) -> Result<bool>;
    fn list_entity_sets(&self, entity_type: EntityType) -> Result<Vec<EntitySet>>;
}

pub trait ReleasedDataStore {
    fn upsert_released_data(&self, data: &ReleasedData) -> Result<ReleasedData>;
    fn get_released_data(
        &self,
        program_name: &str,
        project_code: &str,
        data_type: ReleasedDataType,
    ) -> Result<Option<ReleasedData>>;
    fn list_released_data(&self, project_id: &str) -> Result<Vec<ReleasedData>>;
    fn delete_released_data(
        &self,
        program_name: &str,
        project_code: &str,
        data_type: ReleasedDataType,
    ) -> Result<bool>;

    fn append_release_log(&self, log: &ReleasedDataLog) -> Result<ReleasedDataLog>;
    fn list_release_logs(&self, project_id: &str) -> Result<Vec<ReleasedDataLog>>;
    fn latest_release_log(
        &self,
        project_id: &str,
        data_type: ReleasedDataType,
    ) -> Result<Option<ReleasedDataLog>>;
}

pub trait StudyStore {
    fn create_study(&self, study: &Study) -> Result<Study>;
    fn get_study(&self, id: i64) -> Result<Option<Study>>;
    fn get_study_by_name(&self, name: &str) -> Result<Option<Study>>;
    fn list_studies(&self) -> Result<Vec<Study>>;
    fn rename_study(&self, id: i64, name: &str) -> Result<Study>;
    /// Fails with a foreign-key violation while program links remain.
    fn delete_study(&self, id: i64) -> Result<bool>;

    fn add_study_program(&self, study_id: i64, program_name: &str) -> Result<StudyProgram>;
    fn remove_study_program(&self, study_id: i64, program_name: &str) -> Result<bool>;
    fn list_study_programs(&self, study_id: i64) -> Result<Vec<StudyProgram>>;

    fn add_study_program_project(
        &self,
        study_id: i64,
        program_name: &str,
        project_code: &str,
    ) -> Result<StudyProgramProject>;
    fn remove_study_program_project(
        &self,
        study_id: i64,
        program_name: &str,
        project_code: &str,
    ) -> Result<bool>;
    fn list_study_program_projects(&self, study_id: i64) -> Result<Vec<StudyProgramProject>>;
}

pub trait StudyRuleStore {
    fn create_study_rule(&self, rule: &StudyRule) -> Result<StudyRule>;
    /// Loads `whole_programs` and `partial_programs` with the rule.
    fn get_study_rule(&self, id: i64) -> Result<Option<StudyRule>>;
    fn get_study_rule_by_name(&self, name: &str) -> Result<Option<StudyRule>>;
    fn list_study_rules(&self) -> Result<Vec<StudyRule>>;
    fn rename_study_rule(&self, id: i64, name: &str) -> Result<StudyRule>;
    fn delete_study_rule(&self, id: i64) -> Result<bool>;

    fn add_study_rule_program(
        &self,
        study_rule_id: i64,
        program_name: &str,
    ) -> Result<StudyRuleProgram>;
    fn remove_study_rule_program(&self, study_rule_id: i64, program_name: &str) -> Result<bool>;

    fn add_study_rule_program_project(
        &self,
        study_rule_id: i64,
        program_name: &str,
        project_code: &str,
    ) -> Result<StudyRuleProgramProject>;
    fn remove_study_rule_program_project(
        &self,
        study_rule_id: i64,
        program_name: &str,
        project_code: &str,
    ) -> Result<bool>;
}

pub trait NotificationStore {
    fn create_notification(&self, notification: &Notification) -> Result<Notification>;
    fn get_notification(&self, id: i64) -> Result<Option<Notification>>;
    fn list_notifications(&self) -> Result<Vec<Notification>>;
    fn list_active_notifications(&self, at: DateTime<Utc>) -> Result<Vec<Notification>>;
    fn update_notification(&self, notification: &Notification) -> Result<Notification>;
    fn delete_notification(&self, id: i64) -> Result<bool>;
}

pub trait SubmissionStore {
    /// Inserts the log with its snapshots and documents in one transaction.
    fn create_transaction_log(&self, log: &TransactionLog) -> Result<TransactionLog>;
    /// Loads entities and documents; `canonical_json` and document bodies
    /// stay unloaded until [`SubmissionStore::undefer_transaction_log`].
    fn get_transaction_log(&self, id: i64) -> Result<Option<TransactionLog>>;
    fn undefer_transaction_log(&self, log: &mut TransactionLog) -> Result<()>;
    fn list_transaction_logs(&self, project_id: &str) -> Result<Vec<TransactionLog>>;
    fn update_transaction_state(&self, id: i64, state: &str) -> Result<()>;
    fn close_transaction_log(&self, id: i64) -> Result<()>;
    fn set_committed_by(&self, id: i64, committed_by: i64) -> Result<()>;
    fn add_transaction_snapshot(
        &self,
        transaction_id: i64,
        snapshot: &TransactionSnapshot,
    ) -> Result<TransactionSnapshot>;
    fn add_transaction_document(
        &self,
        transaction_id: i64,
        document: &TransactionDocument,
    ) -> Result<TransactionDocument>;
}

pub trait ReportStore {
    fn upsert_usage_report(&self, report: &DataUsageReport) -> Result<DataUsageReport>;
    fn get_usage_report(&self, period: NaiveDate) -> Result<Option<DataUsageReport>>;

    fn upsert_download_report(&self, report: &DataDownloadReport) -> Result<DataDownloadReport>;
    fn get_download_report(&self, period: NaiveDate) -> Result<Option<DataDownloadReport>>;
    /// Sets `key` of one dimension to `size`, replacing any earlier value and
    /// creating the period's report when missing.
    fn add_download_report_entry(
        &self,
        period: NaiveDate,
        dimension: DownloadDimension,
        key: &str,
        size: f64,
    ) -> Result<DataDownloadReport>;

    fn upsert_monthly_awstats(&self, stats: &MonthlyAwstats) -> Result<MonthlyAwstats>;
    fn get_monthly_awstats(&self, date: NaiveDate, site: &str) -> Result<Option<MonthlyAwstats>>;

    fn create_gdc_report(&self, report: &GdcReport) -> Result<GdcReport>;
    fn get_gdc_report(&self, id: i64) -> Result<Option<GdcReport>>;
    fn list_gdc_reports(&self, report_type: &str) -> Result<Vec<GdcReport>>;

    fn create_file_report(&self, report: &FileReport) -> Result<FileReport>;
    fn list_file_reports(&self, node_id: &str) -> Result<Vec<FileReport>>;
}

pub trait RedactionStore {
    fn create_redaction_log(&self, log: &RedactionLog) -> Result<RedactionLog>;
    fn get_redaction_log(&self, id: i64) -> Result<Option<RedactionLog>>;
    fn get_redaction_log_by_annotation(&self, annotation_id: &str)
    -> Result<Option<RedactionLog>>;
    /// Stamps the log and every one of its entries.
    fn rescind_redaction_log(&self, id: i64, rescinded_by: &str) -> Result<RedactionLog>;
    fn rescind_redaction_entry(
        &self,
        redaction_id: i64,
        node_id: &str,
        rescinded_by: &str,
    ) -> Result<RedactionEntry>;
}

pub trait QcReportStore {
    fn create_test_run(&self, run: &TestRun) -> Result<TestRun>;
    fn get_test_run(&self, id: i64) -> Result<Option<TestRun>>;
    fn update_test_run_status(&self, id: i64, status: TestRunStatus) -> Result<TestRun>;
    fn mark_test_run_stale(&self, id: i64) -> Result<()>;
    fn add_validation_result(
        &self,
        test_run_id: i64,
        result: &ValidationResult,
    ) -> Result<ValidationResult>;
    fn list_validation_results(&self, test_run_id: i64) -> Result<Vec<ValidationResult>>;
    /// Cascades to the run's validation results.
    fn delete_test_run(&self, id: i64) -> Result<bool>;
}
