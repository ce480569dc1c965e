use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use run_stats::{
    align, extract, parse_label_override, Comparison, ExtractRequest, FieldLabels, MetricSeries,
    StatsError, StatsLayout, DEFAULT_LABELS,
};

mod comparison_writer;
use comparison_writer::ComparisonWriter;

#[derive(Debug, Parser)]
#[command(name = "coup-compare")]
#[command(about = "Compare coup and regular simulation runs by core count")]
struct Cli {
    #[arg(help = "Folder with the coup result files")]
    coup: PathBuf,

    #[arg(help = "Folder with the non-coup result files")]
    regular: PathBuf,

    #[arg(help = "Name of the comparison, used as the output file prefix")]
    name: String,

    #[arg(
        long,
        value_delimiter = ',',
        help = "Shared cache counters, comma separated (defaults to the coherence counters; '' for none)"
    )]
    shared: Option<Vec<String>>,

    #[arg(
        long,
        value_delimiter = ',',
        help = "Private cache counters summed over cores (defaults to the coherence counters; '' for none)"
    )]
    private: Option<Vec<String>>,

    #[arg(long, help = "Also compare average cycles of the active cores and the time bound")]
    cycles: bool,

    #[arg(
        long = "label",
        value_parser = parse_label,
        help = "Display label for a counter, as name=label (repeatable)"
    )]
    labels: Vec<(String, String)>,

    #[arg(
        long,
        default_value = "stats.root",
        help = "Dotted path of the stats root inside each result file (empty for top level)"
    )]
    root_path: String,

    #[arg(long, default_value = "wimpy", help = "Per-core group holding the cycles counter")]
    core_group: String,

    #[arg(long, default_value = "l2_wimpy", help = "Shared cache group")]
    shared_group: String,

    #[arg(long, default_value = "l1d_wimpy", help = "Private cache group")]
    private_group: String,

    #[arg(long, default_value_t = 1.0, help = "Factor applied to every coup value")]
    coup_scale: f64,

    #[arg(long, help = "Directory for the comparison file (defaults to the current directory)")]
    output_dir: Option<PathBuf>,

    /// Verbose debug output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_label(arg: &str) -> std::result::Result<(String, String), String> {
    parse_label_override(arg).ok_or_else(|| format!("expected name=label, got '{}'", arg))
}

fn counter_list(requested: Option<&[String]>) -> Vec<String> {
    match requested {
        Some(names) => names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        None => DEFAULT_LABELS
            .iter()
            .map(|(name, _)| name.to_string())
            .collect(),
    }
}

impl Cli {
    fn extract_request(&self) -> ExtractRequest {
        let root_path = self
            .root_path
            .split('.')
            .map(str::trim)
            .filter(|segment| !segment.is_empty());
        let layout = StatsLayout::default()
            .with_root_path(root_path)
            .with_core_group(&self.core_group)
            .with_shared_cache_group(&self.shared_group)
            .with_private_cache_group(&self.private_group);

        ExtractRequest::new()
            .with_shared_fields(counter_list(self.shared.as_deref()))
            .with_private_fields(counter_list(self.private.as_deref()))
            .with_cycle_metrics(self.cycles)
            .with_layout(layout)
    }

    fn field_labels(&self) -> FieldLabels {
        self.labels
            .iter()
            .fold(FieldLabels::default(), |labels, (name, label)| {
                labels.with_label(name, label)
            })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let output_filename = run(&cli)?;
    println!("Comparison written to: {}", output_filename.display());

    Ok(())
}

fn run(cli: &Cli) -> Result<PathBuf> {
    // Neither configuration is read unless both folders exist
    for dir in [&cli.coup, &cli.regular] {
        if !dir.exists() {
            return Err(StatsError::InputNotFound(dir.clone()).into());
        }
    }

    let request = cli.extract_request();
    log::debug!("Metric slots: {:?}", request.metric_keys());

    let coup = extract(&cli.coup, &request)
        .with_context(|| format!("Failed to extract coup runs from {}", cli.coup.display()))?;
    let regular = extract(&cli.regular, &request).with_context(|| {
        format!(
            "Failed to extract regular runs from {}",
            cli.regular.display()
        )
    })?;

    let comparison = Comparison::pair(request.metric_keys(), align(coup), align(regular))
        .with_context(|| "Coup and regular runs cannot be paired")?
        .with_coup_scale(cli.coup_scale);

    let series = comparison.all_series(&cli.field_labels());
    print_summary(&cli.name, &series);

    let output_filename = determine_output_filename(cli.output_dir.as_deref(), &cli.name);
    let metadata = HashMap::from([
        ("name".to_string(), cli.name.clone()),
        ("coup_dir".to_string(), cli.coup.display().to_string()),
        ("regular_dir".to_string(), cli.regular.display().to_string()),
    ]);

    let file = File::create(&output_filename).with_context(|| {
        format!(
            "Failed to create output file: {}",
            output_filename.display()
        )
    })?;
    let mut writer = ComparisonWriter::new(file, &metadata)?;
    for metric in &series {
        writer.write(metric)?;
    }
    writer.close()?;

    Ok(output_filename)
}

fn print_summary(name: &str, series: &[MetricSeries]) {
    println!("{}", name);
    for metric in series {
        println!("{}", "-".repeat(60));
        println!("{} ({})", metric.label, metric.key);
        println!(
            "  {:>6} {:>16} {:>16} {:>10}",
            "cores", "coup", "regular", "ratio"
        );
        for (i, ratio) in metric.ratio().into_iter().enumerate() {
            let ratio = ratio.map_or_else(|| "-".to_string(), |r| format!("{:.3}", r));
            println!(
                "  {:>6} {:>16.1} {:>16.1} {:>10}",
                metric.core_counts[i], metric.coup[i], metric.regular[i], ratio
            );
        }
    }
}

fn determine_output_filename(output_dir: Option<&Path>, name: &str) -> PathBuf {
    let output_filename = format!("{}_comparison.parquet", name);

    match output_dir {
        Some(dir) => dir.join(output_filename),
        None => PathBuf::from(output_filename),
    }
}

#[cfg(test)]
#[allow(dead_code)]
#[path = "../../run_stats/src/test_support.rs"]
mod test_support;
