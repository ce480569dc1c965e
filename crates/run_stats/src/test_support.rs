//! Builders for synthetic result stores used by unit and integration tests.
//!
//! Every counter is written as `UInt64`, the type the simulator dumps use.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow_array::{ArrayRef, ListArray, RecordBatch, StructArray, UInt64Array};
use arrow_buffer::OffsetBuffer;
use arrow_schema::{DataType, Field, Fields, Schema};
use parquet::arrow::ArrowWriter;

/// Records of one counter group; every record carries the same counter names
#[derive(Debug, Clone)]
pub struct GroupFixture {
    pub counters: Vec<&'static str>,
    pub records: Vec<Vec<u64>>,
}

impl GroupFixture {
    pub fn new(counters: &[&'static str], records: Vec<Vec<u64>>) -> Self {
        Self {
            counters: counters.to_vec(),
            records,
        }
    }
}

/// One snapshot of the stats root
#[derive(Debug, Clone)]
pub struct SnapshotFixture {
    pub cycles: Vec<u64>,
    pub shared: Option<GroupFixture>,
    pub private: Option<GroupFixture>,
    pub time: Option<Vec<u64>>,
}

impl SnapshotFixture {
    pub fn new(cycles: Vec<u64>) -> Self {
        Self {
            cycles,
            shared: None,
            private: None,
            time: None,
        }
    }

    pub fn shared(mut self, counters: &[&'static str], records: Vec<Vec<u64>>) -> Self {
        self.shared = Some(GroupFixture::new(counters, records));
        self
    }

    pub fn private(mut self, counters: &[&'static str], records: Vec<Vec<u64>>) -> Self {
        self.private = Some(GroupFixture::new(counters, records));
        self
    }

    pub fn time(mut self, time: Vec<u64>) -> Self {
        self.time = Some(time);
        self
    }
}

fn record_list_column(
    name: &str,
    counters: &[&'static str],
    rows: &[&[Vec<u64>]],
) -> (Field, ArrayRef) {
    let struct_fields: Fields = counters
        .iter()
        .map(|counter| Field::new(*counter, DataType::UInt64, false))
        .collect();

    let columns: Vec<ArrayRef> = (0..counters.len())
        .map(|j| {
            let values: Vec<u64> = rows
                .iter()
                .flat_map(|records| records.iter().map(move |record| record[j]))
                .collect();
            Arc::new(UInt64Array::from(values)) as ArrayRef
        })
        .collect();

    let records = StructArray::new(struct_fields.clone(), columns, None);
    let item = Arc::new(Field::new("item", DataType::Struct(struct_fields), false));
    let offsets = OffsetBuffer::from_lengths(rows.iter().map(|records| records.len()));
    let list = ListArray::new(item.clone(), offsets, Arc::new(records), None);

    (Field::new(name, DataType::List(item), false), Arc::new(list))
}

fn shared_of(snapshot: &SnapshotFixture) -> Option<&GroupFixture> {
    snapshot.shared.as_ref()
}

fn private_of(snapshot: &SnapshotFixture) -> Option<&GroupFixture> {
    snapshot.private.as_ref()
}

/// Builds a batch with one row per snapshot, the groups nested under `stats.root`
pub fn snapshot_batch(snapshots: &[SnapshotFixture]) -> RecordBatch {
    snapshot_batch_under(&["stats", "root"], snapshots)
}

/// Builds a batch with the default group names nested under `root_path`; an
/// empty path puts the groups at the top level.
///
/// Group columns are emitted when the first snapshot has them; later snapshots
/// without the group get an empty list.
pub fn snapshot_batch_under(root_path: &[&str], snapshots: &[SnapshotFixture]) -> RecordBatch {
    let first = &snapshots[0];
    let mut fields = Vec::new();
    let mut columns: Vec<ArrayRef> = Vec::new();

    let cycles: Vec<Vec<Vec<u64>>> = snapshots
        .iter()
        .map(|s| s.cycles.iter().map(|c| vec![*c]).collect())
        .collect();
    let cycle_rows: Vec<&[Vec<u64>]> = cycles.iter().map(|r| r.as_slice()).collect();
    let (field, column) = record_list_column("wimpy", &["cycles"], &cycle_rows);
    fields.push(field);
    columns.push(column);

    let groups: [(&str, fn(&SnapshotFixture) -> Option<&GroupFixture>); 2] =
        [("l2_wimpy", shared_of), ("l1d_wimpy", private_of)];
    for (name, group) in groups {
        if let Some(template) = group(first) {
            let empty: Vec<Vec<u64>> = Vec::new();
            let rows: Vec<&[Vec<u64>]> = snapshots
                .iter()
                .map(|s| group(s).map_or(empty.as_slice(), |g| g.records.as_slice()))
                .collect();
            let (field, column) = record_list_column(name, &template.counters, &rows);
            fields.push(field);
            columns.push(column);
        }
    }

    if first.time.is_some() {
        let lengths: Vec<usize> = snapshots
            .iter()
            .map(|s| s.time.as_ref().map_or(0, |t| t.len()))
            .collect();
        let values: Vec<u64> = snapshots
            .iter()
            .flat_map(|s| s.time.clone().unwrap_or_default())
            .collect();
        let item = Arc::new(Field::new("item", DataType::UInt64, false));
        let list = ListArray::new(
            item.clone(),
            OffsetBuffer::from_lengths(lengths),
            Arc::new(UInt64Array::from(values)),
            None,
        );
        fields.push(Field::new("time", DataType::List(item), false));
        columns.push(Arc::new(list));
    }

    // Wrap innermost first
    for name in root_path.iter().rev() {
        let record_fields = Fields::from(fields);
        let record = StructArray::new(record_fields.clone(), columns, None);
        fields = vec![Field::new(*name, DataType::Struct(record_fields), false)];
        columns = vec![Arc::new(record)];
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).unwrap()
}

/// Writes `snapshots` as a result store at `path`
pub fn write_result_file(path: &Path, snapshots: &[SnapshotFixture]) {
    let batch = snapshot_batch(snapshots);
    let file = File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

/// Writes a result store that has the expected columns but no snapshots
pub fn write_empty_result_file(path: &Path) {
    let batch = snapshot_batch(&[SnapshotFixture::new(vec![1])]);
    let file = File::create(path).unwrap();
    let writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.close().unwrap();
}
