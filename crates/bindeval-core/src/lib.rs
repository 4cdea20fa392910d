//! bindeval core library
//!
//! Domain model and the synchronous stages of binder evaluation: stats
//! aggregation, sequence extraction, catalog joins, ranking, the ledger,
//! exports, work tracking and remote archival planning.

pub mod archive;
pub mod catalog;
pub mod domain;
pub mod export;
pub mod ledger;
pub mod metrics;
pub mod obs;
pub mod pdb;
pub mod ranking;
pub mod sequence;
pub mod stats;
pub mod telemetry;
pub mod tracker;

pub use archive::{execute_archive, plan_archive, ArchivePlan, ArchiveReport, SkippedFolder};

pub use catalog::{build_catalog, Catalog, JoinKey};

pub use domain::{
    columns, non_null, Design, Diagnostic, EvalError, Result, Stage, UnitState, WorkUnit,
};

pub use export::{
    af3_jobs, binder_fasta, write_af3_jobs, write_binder_fasta, Af3Job, ExportReport,
    BINDER_FASTA_FILE,
};

pub use ledger::{write_atomic, Ledger, MergeOutcome, LEDGER_FILE};

pub use metrics::{Metrics, METRICS};

pub use obs::{
    emit_job_cache_hit, emit_job_failed, emit_job_submitted, emit_ledger_flushed,
    emit_run_finished, emit_unit_finished, emit_unit_started, unit_span, UnitSpan,
};

pub use ranking::{rank_designs, sort_and_rank, Ranked, LEDGER_COLUMNS};

pub use sequence::{
    extract_accepted, PdbSequenceExtractor, SequenceExtractor, SequenceRecord, SequenceScan,
};

pub use stats::{aggregate_all, aggregate_folders, StatsOutcome, StatsTable, STATS_FILE};

pub use telemetry::init_tracing;

pub use tracker::WorkTracker;
