mod batch;
mod cohort;
mod entity_set;
mod notification;
mod qc_report;
mod redaction;
mod released_data;
mod reports;
mod study;
mod study_rule;
mod submission;
mod timestamps;

pub use batch::*;
pub use cohort::*;
pub use entity_set::*;
pub use notification::*;
pub use qc_report::*;
pub use redaction::*;
pub use released_data::*;
pub use reports::*;
pub use study::*;
pub use study_rule::*;
pub use submission::*;
pub use timestamps::*;
