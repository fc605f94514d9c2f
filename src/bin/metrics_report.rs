use std::path::PathBuf;

use gridiron_edge::evaluation::BUCKET_NAMES;
use gridiron_edge::history::{MetricsHistory, MetricsRecord, format_value};
use gridiron_edge::storage::{self, DataLayout};

fn main() -> anyhow::Result<()> {
    gridiron_edge::config::load_dotenv();
    let root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var("OUTPUT_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(gridiron_edge::config::DEFAULT_OUTPUT_DIR));
    let layout = DataLayout::new(root);

    let path = layout.metrics_path();
    if !path.exists() {
        anyhow::bail!("no metrics snapshot at {}; run `gridiron_edge evaluate` first", path.display());
    }
    let record: MetricsRecord = storage::read_json(&path)?;
    let m = &record.metrics;
    let e = &m.errors;

    println!("run {} ({}) model {}", record.run_id, record.timestamp, record.model_hash);
    println!(
        "games {:>4}  mae {}  rmse {}  bias {}  r2 {}",
        e.samples,
        format_value(e.mae),
        format_value(e.rmse),
        format_value(e.bias),
        format_value(e.r2)
    );
    println!(
        "baseline      mae {}  rmse {}  (mean margin {})",
        format_value(e.baseline_mae),
        format_value(e.baseline_rmse),
        format_value(e.mean_actual)
    );
    println!(
        "cover accuracy {} over {} games with a spread",
        format_value(m.accuracy),
        m.accuracy_samples
    );
    println!();
    println!("{:<26} {:>7} {:>7} {:>9}", "bucket", "correct", "total", "accuracy");
    for name in BUCKET_NAMES {
        let tally = m.bucket(name);
        if tally.total == 0 {
            continue;
        }
        println!(
            "{:<26} {:>7} {:>7} {:>9}",
            name,
            tally.correct,
            tally.total,
            format_value(tally.accuracy())
        );
    }

    let runs = MetricsHistory::new(layout.history_dir()).load()?;
    if !runs.is_empty() {
        println!();
        println!("{:<40} {:>9} {:>9} {:>8}", "history", "accuracy", "mae", "games");
        for run in runs.iter().rev().take(10) {
            println!(
                "{:<40} {:>9} {:>9} {:>8}",
                run.run_id,
                format_value(run.metrics.accuracy),
                format_value(run.metrics.errors.mae),
                run.metrics.errors.samples
            );
        }
    }
    Ok(())
}
