use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use arrow_array::cast::AsArray;
use arrow_array::types::{
    Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type, UInt32Type,
    UInt64Type, UInt8Type,
};
use arrow_array::{Array, ArrayRef, RecordBatch, StructArray};
use arrow_schema::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::error::StatsError;

/// Where the stats root lives inside a result store and how its groups are named.
///
/// Simulator dumps have named the private cache group differently over time
/// (`l1d_wimpy`, `l1_wimpy`), so every group name can be overridden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsLayout {
    /// Path of the stats root: nested record columns in Parquet, the dataset
    /// path in HDF5. Empty means the groups are top-level columns.
    pub root_path: Vec<String>,
    /// Per-core records carrying the `cycles` counter
    pub core_group: String,
    /// Shared cache records; index 0 is used
    pub shared_cache_group: String,
    /// Per-core private cache records, summed across cores
    pub private_cache_group: String,
    /// Top-level time array
    pub time_column: String,
}

impl Default for StatsLayout {
    fn default() -> Self {
        Self {
            root_path: vec!["stats".to_string(), "root".to_string()],
            core_group: "wimpy".to_string(),
            shared_cache_group: "l2_wimpy".to_string(),
            private_cache_group: "l1d_wimpy".to_string(),
            time_column: "time".to_string(),
        }
    }
}

impl StatsLayout {
    pub fn with_root_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.root_path = path.into_iter().map(Into::into).collect();
        self
    }

    /// Root path in dotted form, as used in messages and on the command line
    pub fn root_name(&self) -> String {
        self.root_path.join(".")
    }

    pub fn with_core_group(mut self, name: impl Into<String>) -> Self {
        self.core_group = name.into();
        self
    }

    pub fn with_shared_cache_group(mut self, name: impl Into<String>) -> Self {
        self.shared_cache_group = name.into();
        self
    }

    pub fn with_private_cache_group(mut self, name: impl Into<String>) -> Self {
        self.private_cache_group = name.into();
        self
    }

    pub fn with_time_column(mut self, name: impl Into<String>) -> Self {
        self.time_column = name.into();
        self
    }
}

/// Named numeric counters of one cache record, in schema order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CounterRecord {
    counters: Vec<(String, f64)>,
}

impl CounterRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a counter, replacing any previous value under the same name
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.counters.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.counters.push((name, value)),
        }
    }

    /// Looks up a counter; `None` when the record has no such counter
    pub fn get(&self, name: &str) -> Option<f64> {
        self.counters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| *value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.counters.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for CounterRecord {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut record = CounterRecord::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

/// One snapshot of the stats root
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// `cycles` counter of every per-core slot, active or not
    pub core_cycles: Vec<u64>,
    pub shared_cache: Vec<CounterRecord>,
    pub private_cache: Vec<CounterRecord>,
    pub time: Option<Vec<f64>>,
}

impl Snapshot {
    /// Number of active cores: all slots minus the trailing run of slots whose
    /// `cycles` counter is zero. Zeros before the last active core still count.
    pub fn core_count(&self) -> usize {
        self.core_cycles
            .iter()
            .rposition(|&cycles| cycles != 0)
            .map_or(0, |last_active| last_active + 1)
    }

    /// Mean `cycles` over the active cores only, 0 when no core ran
    pub fn average_active_cycles(&self) -> f64 {
        let active = &self.core_cycles[..self.core_count()];
        if active.is_empty() {
            return 0.0;
        }
        active.iter().map(|&c| c as f64).sum::<f64>() / active.len() as f64
    }

    /// Counter from the first shared cache record
    pub fn shared_counter(&self, name: &str) -> Option<f64> {
        self.shared_cache.first().and_then(|record| record.get(name))
    }

    /// Counter summed over every private cache record that carries it
    pub fn private_counter_sum(&self, name: &str) -> Option<f64> {
        self.private_cache
            .iter()
            .filter_map(|record| record.get(name))
            .fold(None, |sum, value| Some(sum.unwrap_or(0.0) + value))
    }

    /// Fourth element of the time array, used as the time bound of the run
    pub fn time_bound(&self) -> Option<f64> {
        self.time.as_ref().and_then(|time| time.get(3).copied())
    }

    /// Decodes the snapshot stored in `row` of `batch`.
    ///
    /// Only the core group is mandatory. Missing cache groups or a missing time
    /// column decode as empty, so every counter looked up in them is absent.
    pub(crate) fn from_batch_row(
        batch: &RecordBatch,
        row: usize,
        layout: &StatsLayout,
    ) -> Result<Self, String> {
        let root = resolve_root(batch, row, &layout.root_path)?;

        let core_group = &layout.core_group;
        let cores = root
            .column_by_name(core_group)
            .ok_or_else(|| format!("{} column not found", core_group))?;
        let cores = list_entry(cores, row, core_group)?
            .ok_or_else(|| format!("{} is null in the last snapshot", core_group))?;
        let cores = cores
            .as_struct_opt()
            .ok_or_else(|| format!("{} entries are not records", core_group))?;
        let cycles = cores
            .column_by_name("cycles")
            .ok_or_else(|| format!("{} records have no cycles counter", core_group))?;
        let core_cycles = (0..cores.len())
            .map(|i| cycles_value(cycles.as_ref(), i))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("{}.cycles: {}", core_group, e))?;

        let shared_cache = counter_records(&root, row, &layout.shared_cache_group)?;
        let private_cache = counter_records(&root, row, &layout.private_cache_group)?;
        let time = time_values(&root, row, &layout.time_column)?;

        Ok(Self {
            core_cycles,
            shared_cache,
            private_cache,
            time,
        })
    }
}

/// Follows `root_path` through nested record columns down to the stats root
fn resolve_root(
    batch: &RecordBatch,
    row: usize,
    root_path: &[String],
) -> Result<StructArray, String> {
    let mut root = StructArray::from(batch.clone());
    for (depth, segment) in root_path.iter().enumerate() {
        let name = root_path[..=depth].join(".");
        let child = root
            .column_by_name(segment)
            .ok_or_else(|| format!("{} not found", name))?;
        let child = child
            .as_struct_opt()
            .ok_or_else(|| format!("{} is not a record (found {})", name, child.data_type()))?;
        if child.is_null(row) {
            return Err(format!("{} is null in the last snapshot", name));
        }
        root = child.clone();
    }
    Ok(root)
}

/// Entry `row` of a list column; plain, large and fixed-size lists are accepted
fn list_entry(column: &ArrayRef, row: usize, name: &str) -> Result<Option<ArrayRef>, String> {
    if let Some(list) = column.as_list_opt::<i32>() {
        return Ok((!list.is_null(row)).then(|| list.value(row)));
    }
    if let Some(list) = column.as_list_opt::<i64>() {
        return Ok((!list.is_null(row)).then(|| list.value(row)));
    }
    if let Some(list) = column.as_fixed_size_list_opt() {
        return Ok((!list.is_null(row)).then(|| list.value(row)));
    }
    Err(format!(
        "{} column is not a list (found {})",
        name,
        column.data_type()
    ))
}

/// Counter types: every signed and unsigned integer width, `Float32` and `Float64`
fn is_counter_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::UInt64
            | DataType::UInt32
            | DataType::UInt16
            | DataType::UInt8
            | DataType::Int64
            | DataType::Int32
            | DataType::Int16
            | DataType::Int8
            | DataType::Float64
            | DataType::Float32
    )
}

/// Reads a counter as `f64`; `None` for nulls and non-counter columns
fn counter_value(array: &dyn Array, index: usize) -> Option<f64> {
    if array.is_null(index) {
        return None;
    }
    let value = match array.data_type() {
        DataType::UInt64 => array.as_primitive::<UInt64Type>().value(index) as f64,
        DataType::UInt32 => array.as_primitive::<UInt32Type>().value(index) as f64,
        DataType::UInt16 => array.as_primitive::<UInt16Type>().value(index) as f64,
        DataType::UInt8 => array.as_primitive::<UInt8Type>().value(index) as f64,
        DataType::Int64 => array.as_primitive::<Int64Type>().value(index) as f64,
        DataType::Int32 => array.as_primitive::<Int32Type>().value(index) as f64,
        DataType::Int16 => array.as_primitive::<Int16Type>().value(index) as f64,
        DataType::Int8 => array.as_primitive::<Int8Type>().value(index) as f64,
        DataType::Float64 => array.as_primitive::<Float64Type>().value(index),
        DataType::Float32 => array.as_primitive::<Float32Type>().value(index) as f64,
        _ => return None,
    };
    Some(value)
}

/// Cycle count from a signed integer counter; negative counts are rejected
pub(crate) fn cycles_from_signed(value: i64) -> Result<u64, String> {
    u64::try_from(value).map_err(|_| format!("negative cycle count {}", value))
}

/// Cycle count from a float counter; it must be a whole, non-negative number
pub(crate) fn cycles_from_float(value: f64) -> Result<u64, String> {
    if value < 0.0 || value.fract() != 0.0 {
        return Err(format!("invalid cycle count {}", value));
    }
    Ok(value as u64)
}

/// Accepts the same types as [`counter_value`]; a null cycles entry counts as 0
fn cycles_value(array: &dyn Array, index: usize) -> Result<u64, String> {
    if array.is_null(index) {
        return Ok(0);
    }
    match array.data_type() {
        // Read the 64-bit integers directly so large counts stay exact
        DataType::UInt64 => Ok(array.as_primitive::<UInt64Type>().value(index)),
        DataType::Int64 => cycles_from_signed(array.as_primitive::<Int64Type>().value(index)),
        other if is_counter_type(other) => {
            cycles_from_float(counter_value(array, index).unwrap_or(0.0))
        }
        other => Err(format!("unsupported counter type {}", other)),
    }
}

fn counter_records(
    root: &StructArray,
    row: usize,
    group: &str,
) -> Result<Vec<CounterRecord>, String> {
    let Some(column) = root.column_by_name(group) else {
        log::debug!("{} column not found, treating its counters as absent", group);
        return Ok(Vec::new());
    };
    let Some(entries) = list_entry(column, row, group)? else {
        return Ok(Vec::new());
    };
    let records = entries
        .as_struct_opt()
        .ok_or_else(|| format!("{} entries are not records", group))?;

    let mut decoded = Vec::with_capacity(records.len());
    for i in 0..records.len() {
        let mut record = CounterRecord::new();
        for (field, counter) in records.fields().iter().zip(records.columns()) {
            // Histograms and other nested stats are not scalar counters
            if let Some(value) = counter_value(counter.as_ref(), i) {
                record.insert(field.name().as_str(), value);
            }
        }
        decoded.push(record);
    }
    Ok(decoded)
}

fn time_values(root: &StructArray, row: usize, name: &str) -> Result<Option<Vec<f64>>, String> {
    let Some(column) = root.column_by_name(name) else {
        return Ok(None);
    };
    let Some(values) = list_entry(column, row, name)? else {
        return Ok(None);
    };
    if !is_counter_type(values.data_type()) {
        return Err(format!(
            "{} values are not numeric (found {})",
            name,
            values.data_type()
        ));
    }
    Ok(Some(
        (0..values.len())
            .map(|i| counter_value(values.as_ref(), i).unwrap_or(0.0))
            .collect(),
    ))
}

const HDF5_SIGNATURE: [u8; 8] = *b"\x89HDF\r\n\x1a\n";

/// Checks for the HDF5 superblock signature at the start of the file, then rewinds
fn has_hdf5_signature(file: &mut File) -> std::io::Result<bool> {
    let mut head = [0u8; 8];
    let found = match file.read_exact(&mut head) {
        Ok(()) => head == HDF5_SIGNATURE,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => false,
        Err(e) => return Err(e),
    };
    file.seek(SeekFrom::Start(0))?;
    Ok(found)
}

enum StoreFormat {
    Parquet(ParquetRecordBatchReaderBuilder<File>),
    #[cfg(feature = "hdf5")]
    Hdf5(crate::hdf5_store::Hdf5Store),
}

/// A result store on disk holding the snapshots of one run, in dump order.
///
/// Simulator HDF5 dumps (a compound dataset at the root path, one element per
/// snapshot) are read when the crate is built with the `hdf5` feature. Parquet
/// stores hold one row per snapshot with the stats root as nested records.
pub struct ResultFile {
    path: PathBuf,
    layout: StatsLayout,
    format: StoreFormat,
}

impl ResultFile {
    /// Opens the file, picking the reader from the file signature
    pub fn open(path: impl AsRef<Path>, layout: &StatsLayout) -> Result<Self, StatsError> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| StatsError::io(path, e))?;
        let format = if has_hdf5_signature(&mut file).map_err(|e| StatsError::io(path, e))? {
            Self::open_hdf5(path, layout)?
        } else {
            let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| {
                StatsError::malformed(path, format!("failed to read Parquet metadata: {}", e))
            })?;
            StoreFormat::Parquet(builder)
        };

        Ok(Self {
            path: path.to_path_buf(),
            layout: layout.clone(),
            format,
        })
    }

    #[cfg(feature = "hdf5")]
    fn open_hdf5(path: &Path, layout: &StatsLayout) -> Result<StoreFormat, StatsError> {
        crate::hdf5_store::Hdf5Store::open(path, layout).map(StoreFormat::Hdf5)
    }

    #[cfg(not(feature = "hdf5"))]
    fn open_hdf5(path: &Path, _layout: &StatsLayout) -> Result<StoreFormat, StatsError> {
        Err(StatsError::malformed(
            path,
            "HDF5 result stores need run_stats built with the hdf5 feature",
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot_count(&self) -> usize {
        match &self.format {
            StoreFormat::Parquet(builder) => {
                let rows = builder.metadata().file_metadata().num_rows();
                usize::try_from(rows).unwrap_or(0)
            }
            #[cfg(feature = "hdf5")]
            StoreFormat::Hdf5(store) => store.snapshot_count(),
        }
    }

    /// Decodes the last snapshot, the authoritative one
    pub fn last_snapshot(self) -> Result<Snapshot, StatsError> {
        let snapshot_count = self.snapshot_count();
        let Self {
            path,
            layout,
            format,
        } = self;
        if snapshot_count == 0 {
            return Err(StatsError::EmptySnapshots(path));
        }

        match format {
            StoreFormat::Parquet(builder) => {
                last_parquet_snapshot(&path, builder, snapshot_count, &layout)
            }
            #[cfg(feature = "hdf5")]
            StoreFormat::Hdf5(store) => store.last_snapshot(&layout),
        }
    }
}

fn last_parquet_snapshot(
    path: &Path,
    builder: ParquetRecordBatchReaderBuilder<File>,
    snapshot_count: usize,
    layout: &StatsLayout,
) -> Result<Snapshot, StatsError> {
    // Skip straight to the last row; earlier snapshots are never used
    let reader = builder
        .with_offset(snapshot_count - 1)
        .build()
        .map_err(|e| StatsError::malformed(path, format!("failed to build reader: {}", e)))?;

    let mut last_batch: Option<RecordBatch> = None;
    for batch in reader {
        let batch = batch.map_err(|e| {
            StatsError::malformed(path, format!("failed to read snapshot batch: {}", e))
        })?;
        if batch.num_rows() > 0 {
            last_batch = Some(batch);
        }
    }

    let batch = last_batch.ok_or_else(|| StatsError::EmptySnapshots(path.to_path_buf()))?;
    Snapshot::from_batch_row(&batch, batch.num_rows() - 1, layout)
        .map_err(|reason| StatsError::malformed(path, reason))
}
