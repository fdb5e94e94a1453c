//! Telemetry capture for the NPC scheduler.
//!
//! A `tracing` subscriber turns INFO events into column-oriented tables, one
//! table per event target. Columns appear the first time a field is seen and
//! rows that lack a field are padded with the type's zero value.
//!
//! # Usage
//!
//! ```ignore
//! // In scheduler code:
//! tracing::info!(target: "rebucket", step, high, medium, low, players);
//!
//! // In a test:
//! let recorder = tracing::subscriber::with_default(DataFrameSubscriber::new(), || {
//!     // ... step the scheduler ...
//!     instrument::drain()
//! });
//! let rebuckets = recorder.table("rebucket").unwrap();
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing::{Event, Id, Level, Metadata, Subscriber};

/// Targets the scheduler emits rows for.
pub const SCHEDULER_TARGETS: [&str; 6] = [
    "rebucket",
    "cache_refresh",
    "group_formed",
    "social_bonds",
    "goal_complete",
    "planner_update",
];

// ============================================================================
// Columns & Tables
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum TypedColumn {
    U64(Vec<u64>),
    I64(Vec<i64>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

impl TypedColumn {
    pub fn len(&self) -> usize {
        match self {
            TypedColumn::U64(v) => v.len(),
            TypedColumn::I64(v) => v.len(),
            TypedColumn::F64(v) => v.len(),
            TypedColumn::Bool(v) => v.len(),
            TypedColumn::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_u64(&self) -> Option<&[u64]> {
        match self {
            TypedColumn::U64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            TypedColumn::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&[String]> {
        match self {
            TypedColumn::Str(v) => Some(v),
            _ => None,
        }
    }

    fn pad_to(&mut self, len: usize) {
        let missing = len.saturating_sub(self.len());
        if missing == 0 {
            return;
        }
        match self {
            TypedColumn::U64(v) => v.resize(len, 0),
            TypedColumn::I64(v) => v.resize(len, 0),
            TypedColumn::F64(v) => v.resize(len, 0.0),
            TypedColumn::Bool(v) => v.resize(len, false),
            TypedColumn::Str(v) => v.resize(len, String::new()),
        }
    }
}

/// One event target's rows.
#[derive(Debug, Clone, Default)]
pub struct DynamicTable {
    pub columns: HashMap<String, TypedColumn>,
    pub row_count: usize,
}

impl DynamicTable {
    pub fn column(&self, name: &str) -> Option<&TypedColumn> {
        self.columns.get(name)
    }

    pub fn u64s(&self, name: &str) -> Option<&[u64]> {
        self.column(name).and_then(TypedColumn::as_u64)
    }

    pub fn f64s(&self, name: &str) -> Option<&[f64]> {
        self.column(name).and_then(TypedColumn::as_f64)
    }

    pub fn strs(&self, name: &str) -> Option<&[String]> {
        self.column(name).and_then(TypedColumn::as_str)
    }

    fn align(&mut self) {
        let rows = self.row_count;
        for col in self.columns.values_mut() {
            col.pad_to(rows);
        }
    }
}

/// Tables keyed by tracing target.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub tables: HashMap<String, DynamicTable>,
}

impl Recorder {
    pub fn table(&self, target: &str) -> Option<&DynamicTable> {
        self.tables.get(target)
    }

    /// Row count for `target`, 0 if nothing was recorded.
    pub fn rows(&self, target: &str) -> usize {
        self.table(target).map_or(0, |t| t.row_count)
    }
}

thread_local! {
    static RECORDER: RefCell<Recorder> = RefCell::default();
}

// ============================================================================
// Subscriber
// ============================================================================

/// Appends one row per event field set. New columns are back-filled so that
/// every column has exactly `row_count` entries before the push.
struct ColumnVisitor<'a> {
    table: &'a mut DynamicTable,
}

impl ColumnVisitor<'_> {
    fn column(&mut self, field: &Field, empty: fn(usize) -> TypedColumn) -> &mut TypedColumn {
        let rows = self.table.row_count;
        self.table
            .columns
            .entry(field.name().to_owned())
            .or_insert_with(|| empty(rows))
    }
}

impl Visit for ColumnVisitor<'_> {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if let TypedColumn::U64(v) = self.column(field, |n| TypedColumn::U64(vec![0; n])) {
            v.push(value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if let TypedColumn::I64(v) = self.column(field, |n| TypedColumn::I64(vec![0; n])) {
            v.push(value);
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let TypedColumn::F64(v) = self.column(field, |n| TypedColumn::F64(vec![0.0; n])) {
            v.push(value);
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if let TypedColumn::Bool(v) = self.column(field, |n| TypedColumn::Bool(vec![false; n])) {
            v.push(value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        let column = self.column(field, |n| TypedColumn::Str(vec![String::new(); n]));
        if let TypedColumn::Str(v) = column {
            v.push(value.to_owned());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record_str(field, &format!("{value:?}"));
    }
}

/// Collects INFO-and-above events into the thread-local recorder. Spans are
/// ignored.
#[derive(Debug, Clone, Default)]
pub struct DataFrameSubscriber {
    /// `None` records every target
    targets: Option<Vec<String>>,
}

impl DataFrameSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record only the listed targets.
    pub fn only<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: Some(targets.into_iter().map(Into::into).collect()),
        }
    }

    /// Record only the scheduler's telemetry tables.
    pub fn scheduler() -> Self {
        Self::only(SCHEDULER_TARGETS)
    }

    fn wants(&self, target: &str) -> bool {
        self.targets
            .as_ref()
            .is_none_or(|allowed| allowed.iter().any(|t| t == target))
    }
}

impl Subscriber for DataFrameSubscriber {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.is_event() && *metadata.level() <= Level::INFO && self.wants(metadata.target())
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let target = event.metadata().target();
        RECORDER.with(|r| {
            let mut recorder = r.borrow_mut();
            let table = recorder.tables.entry(target.to_owned()).or_default();
            table.align();
            event.record(&mut ColumnVisitor { table: &mut *table });
            table.row_count += 1;
            table.align();
        });
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

/// Install a record-everything subscriber as the global default. Later calls
/// are ignored.
pub fn install_subscriber() {
    let _ = tracing::subscriber::set_global_default(DataFrameSubscriber::new());
}

/// Take everything recorded on this thread so far.
pub fn drain() -> Recorder {
    RECORDER.with(|r| std::mem::take(&mut *r.borrow_mut()))
}

pub fn clear() {
    RECORDER.with(|r| *r.borrow_mut() = Recorder::default());
}

// ============================================================================
// Polars Integration
// ============================================================================

use polars::prelude::*;

impl DynamicTable {
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut names: Vec<&String> = self.columns.keys().collect();
        names.sort();

        let columns = names
            .into_iter()
            .map(|name| match &self.columns[name] {
                TypedColumn::U64(v) => Column::new(name.as_str().into(), v),
                TypedColumn::I64(v) => Column::new(name.as_str().into(), v),
                TypedColumn::F64(v) => Column::new(name.as_str().into(), v),
                TypedColumn::Bool(v) => Column::new(name.as_str().into(), v),
                TypedColumn::Str(v) => Column::new(name.as_str().into(), v),
            })
            .collect();

        DataFrame::new(columns)
    }
}

impl Recorder {
    /// Tables that fail to convert are skipped.
    pub fn to_dataframes(&self) -> HashMap<String, DataFrame> {
        self.tables
            .iter()
            .filter_map(|(name, table)| table.to_dataframe().ok().map(|df| (name.clone(), df)))
            .collect()
    }
}

pub fn drain_to_dataframes() -> HashMap<String, DataFrame> {
    drain().to_dataframes()
}

fn io_error(e: std::io::Error) -> PolarsError {
    PolarsError::IO {
        error: e.into(),
        msg: None,
    }
}

/// Write `{dir}/{table}.parquet` for every table.
pub fn save_parquet(dfs: &mut HashMap<String, DataFrame>, dir: &Path) -> PolarsResult<()> {
    std::fs::create_dir_all(dir).map_err(io_error)?;
    for (name, df) in dfs.iter_mut() {
        let file = std::fs::File::create(dir.join(format!("{name}.parquet"))).map_err(io_error)?;
        ParquetWriter::new(file).finish(df)?;
    }
    Ok(())
}

fn run_dir_name(name: &str) -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let slug: String = name
        .chars()
        .take(60)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{secs}_{slug}")
}

/// Clears recorded data on creation and writes parquet files on drop.
///
/// Each run lands in `{parent}/{unix_secs}_{name}/` followed by an empty
/// `_ready` file once every table is written.
///
/// ```ignore
/// let mut rec = instrument::ScopedRecorder::new("data", "village_day");
/// // ... step the scheduler ...
/// let dfs = rec.get();
/// ```
pub struct ScopedRecorder {
    run_dir: PathBuf,
    dfs: Option<HashMap<String, DataFrame>>,
}

impl ScopedRecorder {
    pub fn new(parent: impl Into<PathBuf>, name: &str) -> Self {
        clear();
        install_subscriber();
        Self {
            run_dir: parent.into().join(run_dir_name(name)),
            dfs: None,
        }
    }

    /// First call drains the recorder; later calls return the same frames.
    pub fn get(&mut self) -> &HashMap<String, DataFrame> {
        self.dfs.get_or_insert_with(drain_to_dataframes)
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}

impl Drop for ScopedRecorder {
    fn drop(&mut self) {
        let mut dfs = self.dfs.take().unwrap_or_else(drain_to_dataframes);
        if dfs.is_empty() {
            return;
        }
        let written = save_parquet(&mut dfs, &self.run_dir)
            .map_err(|e| e.to_string())
            .and_then(|()| {
                std::fs::File::create(self.run_dir.join("_ready")).map_err(|e| e.to_string())
            });
        match written {
            Ok(_) => eprintln!(
                "ScopedRecorder: wrote {} tables to {}",
                dfs.len(),
                self.run_dir.display()
            ),
            Err(e) => eprintln!("ScopedRecorder({}): {e}", self.run_dir.display()),
        }
    }
}
