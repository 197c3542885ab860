//! SQL for every schema revision, and the catalog of tables per module.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

pub const BASELINE_UP: &str = r#"
-- Named sequences: nextval is an UPDATE ... RETURNING on this table
CREATE TABLE IF NOT EXISTS sequences (
    name TEXT NOT NULL PRIMARY KEY,
    last_value INTEGER NOT NULL
);

INSERT OR IGNORE INTO sequences (name, last_value) VALUES
    ('batch_id_seq', 999),
    ('cohort_filter_id_seq', 0),
    ('cohort_snapshot_id_seq', 0),
    ('release_data_log_id_seq', 0),
    ('study_id_seq', 0),
    ('study_rule_id_seq', 0),
    ('notifications_id_seq', 0),
    ('transaction_logs_id_seq', 0),
    ('transaction_documents_id_seq', 0),
    ('gdc_reports_id_seq', 0),
    ('filereport_id_seq', 0),
    ('redaction_log_id_seq', 0),
    ('qc_test_runs_id_seq', 0),
    ('qc_validation_results_id_seq', 0);

-- Batches group graph nodes of one project
CREATE TABLE batch (
    id INTEGER NOT NULL,
    name TEXT NOT NULL,
    project_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'OPEN',
    created_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT batch_pk PRIMARY KEY (id),
    CONSTRAINT batch_status_check CHECK (status IN ('OPEN', 'CLOSED'))
);

CREATE TABLE batch_membership (
    batch_id INTEGER NOT NULL,
    node_id TEXT NOT NULL,
    created_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT batch_membership_pk PRIMARY KEY (batch_id, node_id),
    CONSTRAINT batch_membership_batch_id_fk FOREIGN KEY (batch_id)
        REFERENCES batch (id) ON DELETE CASCADE
);

CREATE INDEX batch_name_idx ON batch (name);
CREATE INDEX batch_project_id_idx ON batch (project_id);
CREATE INDEX batch_status_idx ON batch (status);

-- Cohorts
CREATE TABLE anonymous_context (
    id TEXT NOT NULL,
    name TEXT NOT NULL,
    created_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT anonymous_context_pkey PRIMARY KEY (id)
);

CREATE TABLE cohort (
    id TEXT NOT NULL,
    name TEXT NOT NULL,
    context_id TEXT NOT NULL,
    created_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT cohort_pkey PRIMARY KEY (id),
    CONSTRAINT cohort_context_id_fkey FOREIGN KEY (context_id)
        REFERENCES anonymous_context (id) ON DELETE CASCADE
);

CREATE TABLE cohort_filter (
    id INTEGER NOT NULL,
    parent_id INTEGER,
    cohort_id TEXT NOT NULL,
    filters TEXT NOT NULL,
    cohort_type TEXT NOT NULL DEFAULT 'static',
    created_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT cohort_filter_pkey PRIMARY KEY (id),
    CONSTRAINT cohort_filter_parent_id_fkey FOREIGN KEY (parent_id)
        REFERENCES cohort_filter (id),
    CONSTRAINT cohort_filter_cohort_id_fkey FOREIGN KEY (cohort_id)
        REFERENCES cohort (id) ON DELETE CASCADE,
    CONSTRAINT cohort_filter_cohort_type_check CHECK (cohort_type IN ('static', 'dynamic')),
    CONSTRAINT cohort_filter_filters_check CHECK (json_valid(filters))
);

CREATE INDEX cohort_filter_cohort_id_idx ON cohort_filter (cohort_id);

CREATE TABLE cohort_snapshot (
    id INTEGER NOT NULL,
    filter_id INTEGER NOT NULL,
    data_release TEXT NOT NULL,
    case_ids TEXT NOT NULL,
    created_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT cohort_snapshot_pkey PRIMARY KEY (id),
    CONSTRAINT cohort_snapshot_filter_id_key UNIQUE (filter_id),
    CONSTRAINT cohort_snapshot_filter_id_fkey FOREIGN KEY (filter_id)
        REFERENCES cohort_filter (id) ON DELETE CASCADE,
    CONSTRAINT cohort_snapshot_case_ids_check CHECK (json_valid(case_ids))
);

-- Entity sets
CREATE TABLE entity_set (
    id TEXT NOT NULL,
    type TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_ids TEXT NOT NULL,
    created_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    accessed_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT entity_set_pkey PRIMARY KEY (id),
    CONSTRAINT entity_set_id_length_check CHECK (length(id) BETWEEN 1 AND 128),
    CONSTRAINT entity_set_type_check CHECK (type IN ('ephemeral', 'ephmeral', 'frozen', 'mutable')),
    CONSTRAINT entity_set_entity_type_check CHECK (entity_type IN ('case', 'file', 'gene', 'ssm')),
    CONSTRAINT entity_set_entity_ids_check CHECK (json_valid(entity_ids))
);

-- Released data
CREATE TABLE released_data (
    program_name TEXT NOT NULL,
    project_code TEXT NOT NULL,
    data_type TEXT NOT NULL,
    is_controlled INTEGER NOT NULL,
    is_open INTEGER NOT NULL,
    created_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT released_data_pk PRIMARY KEY (program_name, project_code, data_type),
    CONSTRAINT released_data_data_type_check CHECK (data_type IN ('ssm', 'cnv', 'case'))
);

CREATE TABLE released_data_log (
    id INTEGER NOT NULL,
    program_name TEXT NOT NULL,
    project_code TEXT NOT NULL,
    release_number TEXT NOT NULL,
    data_type TEXT NOT NULL,
    is_open INTEGER NOT NULL,
    action TEXT NOT NULL,
    created_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT released_data_log_pk PRIMARY KEY (id),
    CONSTRAINT released_data_log_data_type_check CHECK (data_type IN ('ssm', 'cnv', 'case')),
    CONSTRAINT released_data_log_action_check CHECK (action IN ('release', 'unrelease'))
);

CREATE INDEX released_data_log_program_name_project_code_idx
    ON released_data_log (program_name, project_code);

-- Studies: link rows do not cascade
CREATE TABLE study (
    id INTEGER NOT NULL,
    name TEXT NOT NULL,
    created_date TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_date TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT study_pk PRIMARY KEY (id)
);

CREATE UNIQUE INDEX study_name_idx ON study (name);

CREATE TABLE study_program (
    study_id INTEGER NOT NULL,
    program_name TEXT NOT NULL,
    created_date TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_date TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT study_program_pk PRIMARY KEY (study_id, program_name),
    CONSTRAINT study_program_study_id_fk FOREIGN KEY (study_id) REFERENCES study (id)
);

CREATE TABLE study_program_project (
    study_id INTEGER NOT NULL,
    program_name TEXT NOT NULL,
    project_code TEXT NOT NULL,
    created_date TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_date TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT study_program_project_pk PRIMARY KEY (study_id, program_name, project_code),
    CONSTRAINT study_program_project_study_id_fk FOREIGN KEY (study_id) REFERENCES study (id)
);

CREATE TABLE study_rule (
    id INTEGER NOT NULL,
    name TEXT NOT NULL,
    created_date TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_date TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT study_rule_pk PRIMARY KEY (id)
);

CREATE UNIQUE INDEX study_rule_name_idx ON study_rule (name);

CREATE TABLE study_rule_program (
    study_rule_id INTEGER NOT NULL,
    program_name TEXT NOT NULL,
    created_date TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_date TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT study_rule_program_pk PRIMARY KEY (study_rule_id, program_name),
    CONSTRAINT study_rule_program_study_rule_id_fk FOREIGN KEY (study_rule_id)
        REFERENCES study_rule (id)
);

CREATE TABLE study_rule_program_project (
    study_rule_id INTEGER NOT NULL,
    program_name TEXT NOT NULL,
    project_code TEXT NOT NULL,
    created_date TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_date TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT study_rule_program_project_pk
        PRIMARY KEY (study_rule_id, program_name, project_code),
    CONSTRAINT study_rule_program_project_study_rule_id_fk FOREIGN KEY (study_rule_id)
        REFERENCES study_rule (id)
);

-- Notifications
CREATE TABLE notifications (
    id INTEGER NOT NULL,
    components TEXT NOT NULL DEFAULT '[]',
    message TEXT,
    level TEXT,
    dismissible INTEGER NOT NULL DEFAULT 1,
    created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT notifications_pkey PRIMARY KEY (id),
    CONSTRAINT notifications_components_check CHECK (json_valid(components))
);

-- Submission transactions
CREATE TABLE transaction_logs (
    id INTEGER NOT NULL,
    submitter TEXT,
    role TEXT NOT NULL,
    program TEXT NOT NULL,
    project TEXT NOT NULL,
    committed_by INTEGER,
    is_dry_run INTEGER NOT NULL,
    state TEXT NOT NULL,
    closed INTEGER NOT NULL DEFAULT 0,
    created_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    canonical_json TEXT NOT NULL DEFAULT '[]',
    CONSTRAINT transaction_logs_pkey PRIMARY KEY (id),
    CONSTRAINT transaction_logs_canonical_json_check CHECK (json_valid(canonical_json))
);

CREATE INDEX transaction_logs_program_idx ON transaction_logs (program);
CREATE INDEX transaction_logs_project_idx ON transaction_logs (project);
CREATE INDEX transaction_logs_is_dry_run_idx ON transaction_logs (is_dry_run);
CREATE INDEX transaction_logs_committed_by_idx ON transaction_logs (committed_by);
CREATE INDEX transaction_logs_closed_idx ON transaction_logs (closed);
CREATE INDEX transaction_logs_state_idx ON transaction_logs (state);
CREATE INDEX transaction_logs_submitter_idx ON transaction_logs (submitter);
CREATE INDEX transaction_logs_created_datetime_idx ON transaction_logs (created_datetime);
CREATE INDEX transaction_logs_project_id_idx ON transaction_logs ((program || '-' || project));

CREATE TABLE transaction_snapshots (
    id TEXT NOT NULL,
    transaction_id INTEGER NOT NULL,
    action TEXT NOT NULL,
    old_props TEXT NOT NULL,
    new_props TEXT NOT NULL,
    CONSTRAINT transaction_snapshots_pkey PRIMARY KEY (id, transaction_id),
    CONSTRAINT transaction_snapshots_transaction_id_fkey FOREIGN KEY (transaction_id)
        REFERENCES transaction_logs (id),
    CONSTRAINT transaction_snapshots_props_check
        CHECK (json_valid(old_props) AND json_valid(new_props))
);

CREATE INDEX idx_transaction_snapshots_transactions_id ON transaction_snapshots (transaction_id);

CREATE TABLE transaction_documents (
    id INTEGER NOT NULL,
    transaction_id INTEGER NOT NULL,
    name TEXT,
    doc_format TEXT NOT NULL,
    doc TEXT NOT NULL,
    response_json TEXT,
    CONSTRAINT transaction_documents_pkey PRIMARY KEY (id, transaction_id),
    CONSTRAINT transaction_documents_transaction_id_fkey FOREIGN KEY (transaction_id)
        REFERENCES transaction_logs (id),
    CONSTRAINT transaction_documents_response_json_check
        CHECK (response_json IS NULL OR json_valid(response_json))
);

CREATE INDEX idx_transaction_document_transactions_id ON transaction_documents (transaction_id);

-- Reports
CREATE TABLE data_usage_report (
    report_period TEXT NOT NULL,
    all_report TEXT NOT NULL DEFAULT '{"visits":0,"visitors":0,"requests":0,"network_usage":0}',
    api_report TEXT NOT NULL DEFAULT '{"visits":0,"visitors":0,"requests":0,"network_usage":0}',
    portal_report TEXT NOT NULL DEFAULT '{"visits":0,"visitors":0,"requests":0,"network_usage":0}',
    website_report TEXT NOT NULL DEFAULT '{"visits":0,"visitors":0,"requests":0,"network_usage":0}',
    doc_site_report TEXT NOT NULL DEFAULT '{"visits":0,"visitors":0,"requests":0,"network_usage":0}',
    date_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    last_updated TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT data_usage_report_pkey PRIMARY KEY (report_period)
);

CREATE TABLE data_download_report (
    report_period TEXT NOT NULL,
    project_id_report TEXT NOT NULL DEFAULT '{}',
    experimental_strategy_report TEXT NOT NULL DEFAULT '{}',
    access_type_report TEXT NOT NULL DEFAULT '{}',
    access_location_report TEXT NOT NULL DEFAULT '{}',
    date_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    last_updated TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT data_download_report_pkey PRIMARY KEY (report_period)
);

CREATE TABLE monthly_awstats (
    date TEXT NOT NULL,
    site TEXT NOT NULL,
    unique_visitors INTEGER,
    number_of_visits INTEGER,
    viewed_pages INTEGER,
    viewed_hits INTEGER,
    viewed_bw_gb REAL,
    unviewed_pages INTEGER,
    unviewed_hits INTEGER,
    unviewed_bw_gb REAL,
    observium_bw_in_gb REAL,
    observium_bw_out_gb REAL,
    CONSTRAINT monthly_awstats_pkey PRIMARY KEY (date, site),
    CONSTRAINT monthly_awstats_site_length_check CHECK (length(site) <= 50)
);

CREATE TABLE gdc_reports (
    id INTEGER NOT NULL,
    program TEXT,
    project TEXT,
    report TEXT,
    report_type TEXT NOT NULL,
    created_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT gdc_reports_pkey PRIMARY KEY (id),
    CONSTRAINT gdc_reports_report_check CHECK (report IS NULL OR json_valid(report))
);

CREATE INDEX gdc_reports_report_type_idx ON gdc_reports (report_type);
CREATE INDEX gdc_reports_created_datetime_idx ON gdc_reports (created_datetime);
CREATE INDEX gdc_reports_program_idx ON gdc_reports (program);
CREATE INDEX gdc_reports_project_idx ON gdc_reports (project);

CREATE TABLE filereport (
    id INTEGER NOT NULL,
    node_id TEXT,
    ip TEXT,
    country_code TEXT,
    timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    streamed_bytes INTEGER,
    username TEXT,
    requested_bytes INTEGER,
    report_data TEXT,
    CONSTRAINT filereport_pkey PRIMARY KEY (id, timestamp),
    CONSTRAINT filereport_report_data_check CHECK (report_data IS NULL OR json_valid(report_data))
);

CREATE INDEX ix_filereport_node_id ON filereport (node_id);
CREATE INDEX ix_filereport_country_code ON filereport (country_code);
CREATE INDEX ix_filereport_username ON filereport (username);
CREATE INDEX timestamp_idx ON filereport (timestamp);

-- Redactions
CREATE TABLE redaction_log (
    id INTEGER NOT NULL,
    annotation_id TEXT NOT NULL,
    initiated_by TEXT NOT NULL,
    rescinded_by TEXT,
    reason TEXT NOT NULL,
    reason_category TEXT NOT NULL,
    project_id TEXT NOT NULL,
    redaction_type TEXT NOT NULL DEFAULT 'COMPLETE',
    created_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    date_rescinded TEXT,
    CONSTRAINT redaction_log_pkey PRIMARY KEY (id),
    CONSTRAINT redaction_log_annotation_id_key UNIQUE (annotation_id),
    CONSTRAINT redaction_log_annotation_id_length_check CHECK (length(annotation_id) <= 64),
    CONSTRAINT redaction_log_redaction_type_check
        CHECK (redaction_type IN ('LATEST', 'COMPLETE', 'PREVIOUS'))
);

CREATE INDEX ix_redaction_log_initiated_by ON redaction_log (initiated_by);
CREATE INDEX ix_redaction_log_reason_category ON redaction_log (reason_category);
CREATE INDEX ix_redaction_log_project_id ON redaction_log (project_id);

CREATE TABLE redaction_entry (
    node_id TEXT NOT NULL,
    redaction_id INTEGER NOT NULL,
    version TEXT,
    file_name TEXT,
    node_type TEXT NOT NULL,
    release_number TEXT,
    rescinded INTEGER NOT NULL DEFAULT 0,
    rescinded_by TEXT,
    created_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    date_rescinded TEXT,
    CONSTRAINT redaction_entry_pkey PRIMARY KEY (node_id, redaction_id),
    CONSTRAINT redaction_entry_redaction_id_fkey FOREIGN KEY (redaction_id)
        REFERENCES redaction_log (id)
);

CREATE INDEX ix_redaction_entry_version ON redaction_entry (version);
CREATE INDEX ix_redaction_entry_node_type ON redaction_entry (node_type);
CREATE INDEX ix_redaction_entry_release_number ON redaction_entry (release_number);

-- QC reports
CREATE TABLE qc_test_runs (
    id INTEGER NOT NULL,
    project_id TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    test_type TEXT NOT NULL,
    is_stale INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'PENDING',
    date_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    last_updated TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT qc_test_runs_pkey PRIMARY KEY (id),
    CONSTRAINT qc_test_runs_status_check
        CHECK (status IN ('PENDING', 'RUNNING', 'SUCCESS', 'ERROR', 'FAILED'))
);

CREATE INDEX ix_qc_test_runs_project_id ON qc_test_runs (project_id);
CREATE INDEX ix_qc_test_runs_test_type ON qc_test_runs (test_type);
CREATE INDEX ix_qc_test_runs_status ON qc_test_runs (status);

CREATE TABLE qc_validation_results (
    id INTEGER NOT NULL,
    test_run_id INTEGER NOT NULL,
    node_id TEXT NOT NULL,
    submitter_id TEXT NOT NULL,
    error_type TEXT DEFAULT '',
    node_type TEXT NOT NULL,
    message TEXT NOT NULL,
    severity TEXT,
    related_nodes TEXT,
    date_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    last_updated TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT qc_validation_results_pkey PRIMARY KEY (id, test_run_id),
    CONSTRAINT qc_validation_results_test_run_id_fkey FOREIGN KEY (test_run_id)
        REFERENCES qc_test_runs (id) ON DELETE CASCADE,
    CONSTRAINT qc_validation_results_severity_check
        CHECK (severity IS NULL OR severity IN ('CRITICAL', 'WARNING', 'PASSED')),
    CONSTRAINT qc_validation_results_related_nodes_check
        CHECK (related_nodes IS NULL OR json_valid(related_nodes))
);

CREATE INDEX ix_qc_validation_results_error_type ON qc_validation_results (error_type);
CREATE INDEX ix_qc_validation_results_node_type ON qc_validation_results (node_type);
CREATE INDEX ix_qc_validation_results_severity ON qc_validation_results (severity);
"#;

pub const BASELINE_DOWN: &str = r#"
DROP TABLE IF EXISTS qc_validation_results;
DROP TABLE IF EXISTS qc_test_runs;
DROP TABLE IF EXISTS redaction_entry;
DROP TABLE IF EXISTS redaction_log;
DROP TABLE IF EXISTS filereport;
DROP TABLE IF EXISTS gdc_reports;
DROP TABLE IF EXISTS monthly_awstats;
DROP TABLE IF EXISTS data_download_report;
DROP TABLE IF EXISTS data_usage_report;
DROP TABLE IF EXISTS transaction_documents;
DROP TABLE IF EXISTS transaction_snapshots;
DROP TABLE IF EXISTS transaction_logs;
DROP TABLE IF EXISTS notifications;
DROP TABLE IF EXISTS study_rule_program_project;
DROP TABLE IF EXISTS study_rule_program;
DROP TABLE IF EXISTS study_rule;
DROP TABLE IF EXISTS study_program_project;
DROP TABLE IF EXISTS study_program;
DROP TABLE IF EXISTS study;
DROP TABLE IF EXISTS released_data_log;
DROP TABLE IF EXISTS released_data;
DROP TABLE IF EXISTS entity_set;
DROP TABLE IF EXISTS cohort_snapshot;
DROP TABLE IF EXISTS cohort_filter;
DROP TABLE IF EXISTS cohort;
DROP TABLE IF EXISTS anonymous_context;
DROP TABLE IF EXISTS batch_membership;
DROP TABLE IF EXISTS batch;
DROP TABLE IF EXISTS sequences;
"#;

pub const NOTIFICATION_WINDOW_UP: &str = r#"
ALTER TABLE notifications ADD COLUMN start_date TEXT;
ALTER TABLE notifications ADD COLUMN end_date TEXT;
"#;

pub const NOTIFICATION_WINDOW_DOWN: &str = r#"
ALTER TABLE notifications DROP COLUMN start_date;
ALTER TABLE notifications DROP COLUMN end_date;
"#;

/// SQLite cannot add a NOT NULL column without a default, so the table is
/// rebuilt under the same constraint names. Existing rows get `''`.
pub const MEMBERSHIP_NODE_TYPE_UP: &str = r#"
CREATE TABLE batch_membership_new (
    batch_id INTEGER NOT NULL,
    node_id TEXT NOT NULL,
    node_type TEXT NOT NULL,
    created_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_datetime TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT batch_membership_pk PRIMARY KEY (batch_id, node_id),
    CONSTRAINT batch_membership_batch_id_fk FOREIGN KEY (batch_id)
        REFERENCES batch (id) ON DELETE CASCADE
);

INSERT INTO batch_membership_new (batch_id, node_id, node_type, created_datetime, updated_datetime)
    SELECT batch_id, node_id, '', created_datetime, updated_datetime FROM batch_membership;

DROP TABLE batch_membership;
ALTER TABLE batch_membership_new RENAME TO batch_membership;
"#;

pub const MEMBERSHIP_NODE_TYPE_DOWN: &str = r#"
ALTER TABLE batch_membership DROP COLUMN node_type;
"#;

/// A group of related tables, managed and granted together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Module {
    Batch,
    Cohort,
    EntitySet,
    Notifications,
    QcReport,
    Redaction,
    ReleasedData,
    Reports,
    Study,
    StudyRule,
    Submission,
}

impl Module {
    pub const ALL: [Module; 11] = [
        Module::Batch,
        Module::Cohort,
        Module::EntitySet,
        Module::Notifications,
        Module::QcReport,
        Module::Redaction,
        Module::ReleasedData,
        Module::Reports,
        Module::Study,
        Module::StudyRule,
        Module::Submission,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Cohort => "cohort",
            Self::EntitySet => "entity_set",
            Self::Notifications => "notifications",
            Self::QcReport => "qcreport",
            Self::Redaction => "redaction",
            Self::ReleasedData => "released_data",
            Self::Reports => "reports",
            Self::Study => "study",
            Self::StudyRule => "studyrule",
            Self::Submission => "submission",
        }
    }

    /// Tables owned by the module, parents before children.
    pub const fn tables(self) -> &'static [&'static str] {
        match self {
            Self::Batch => &["batch", "batch_membership"],
            Self::Cohort => &[
                "anonymous_context",
                "cohort",
                "cohort_filter",
                "cohort_snapshot",
            ],
            Self::EntitySet => &["entity_set"],
            Self::Notifications => &["notifications"],
            Self::QcReport => &["qc_test_runs", "qc_validation_results"],
            Self::Redaction => &["redaction_log", "redaction_entry"],
            Self::ReleasedData => &["released_data", "released_data_log"],
            Self::Reports => &[
                "data_usage_report",
                "data_download_report",
                "monthly_awstats",
                "gdc_reports",
                "filereport",
            ],
            Self::Study => &["study", "study_program", "study_program_project"],
            Self::StudyRule => &[
                "study_rule",
                "study_rule_program",
                "study_rule_program_project",
            ],
            Self::Submission => &[
                "transaction_logs",
                "transaction_snapshots",
                "transaction_documents",
            ],
        }
    }
}

impl FromStr for Module {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Module::ALL
            .into_iter()
            .find(|module| module.name() == s)
            .ok_or_else(|| Error::invalid_value("module", s))
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_module_round_trip() {
        for module in Module::ALL {
            assert_eq!(module.name().parse::<Module>().unwrap(), module);
        }
        assert!("graph".parse::<Module>().is_err());
    }

    #[test]
    fn test_tables_are_disjoint() {
        let mut seen = HashSet::new();
        for module in Module::ALL {
            for table in module.tables() {
                assert!(seen.insert(*table), "{table} listed twice");
            }
        }
        assert_eq!(seen.len(), 28);
    }
}
