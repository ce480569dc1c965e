use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use arrow_array::builder::{Float64Builder, Int64Builder, StringBuilder};
use arrow_array::{ArrayRef, RecordBatch};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;

use run_stats::MetricSeries;

/// Writes paired metric series as a long-format Parquet table, one row per
/// metric and core count
pub struct ComparisonWriter<W: Write + Send> {
    writer: ArrowWriter<W>,
    schema: SchemaRef,
}

impl<W: Write + Send> ComparisonWriter<W> {
    /// Creates a writer; `metadata` is stored as key-value file metadata
    pub fn new(writer: W, metadata: &HashMap<String, String>) -> Result<Self> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("metric", DataType::Utf8, false),
            Field::new("label", DataType::Utf8, false),
            Field::new("core_count", DataType::Int64, false),
            Field::new("coup", DataType::Float64, false),
            Field::new("regular", DataType::Float64, false),
            Field::new("ratio", DataType::Float64, true),
        ]));

        // Key-value metadata sorted by key
        let mut key_values: Vec<KeyValue> = metadata
            .iter()
            .map(|(key, value)| KeyValue::new(key.clone(), value.clone()))
            .collect();
        key_values.sort_by(|a, b| a.key.cmp(&b.key));
        let props = WriterProperties::builder()
            .set_key_value_metadata(Some(key_values))
            .build();

        let arrow_writer = ArrowWriter::try_new(writer, schema.clone(), Some(props))
            .map_err(|e| anyhow!("Failed to create Arrow writer: {}", e))?;

        Ok(Self {
            writer: arrow_writer,
            schema,
        })
    }

    /// Writes every point of `series`
    pub fn write(&mut self, series: &MetricSeries) -> Result<()> {
        let batch = self.series_to_batch(series)?;

        self.writer
            .write(&batch)
            .map_err(|e| anyhow!("Failed to write batch to Parquet: {}", e))?;

        Ok(())
    }

    /// Closes the writer, finishing the Parquet file
    pub fn close(self) -> Result<()> {
        self.writer
            .close()
            .map(|_| ())
            .map_err(|e| anyhow!("Failed to close Parquet writer: {}", e))
    }

    fn series_to_batch(&self, series: &MetricSeries) -> Result<RecordBatch> {
        let points = series.core_counts.len();
        let metric = series.key.to_string();

        // Create builders for each column

        let mut metric_builder = StringBuilder::with_capacity(points, points * metric.len());
        let mut label_builder = StringBuilder::with_capacity(points, points * series.label.len());
        let mut core_count_builder = Int64Builder::with_capacity(points);
        let mut coup_builder = Float64Builder::with_capacity(points);
        let mut regular_builder = Float64Builder::with_capacity(points);
        let mut ratio_builder = Float64Builder::with_capacity(points);

        // One row per core count; metric and label repeat on every row
        for (i, ratio) in series.ratio().into_iter().enumerate() {
            metric_builder.append_value(&metric);
            label_builder.append_value(&series.label);
            core_count_builder.append_value(series.core_counts[i] as i64);
            coup_builder.append_value(series.coup[i]);
            regular_builder.append_value(series.regular[i]);
            // Null when the regular value is 0
            ratio_builder.append_option(ratio);
        }

        // Finish the arrays in schema order
        let arrays: Vec<ArrayRef> = vec![
            Arc::new(metric_builder.finish()),
            Arc::new(label_builder.finish()),
            Arc::new(core_count_builder.finish()),
            Arc::new(coup_builder.finish()),
            Arc::new(regular_builder.finish()),
            Arc::new(ratio_builder.finish()),
        ];

        RecordBatch::try_new(self.schema.clone(), arrays)
            .map_err(|e| anyhow!("Failed to create RecordBatch: {}", e))
    }
}
