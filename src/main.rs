use bot_communities::render::{CsvSink, DotSink};
use bot_communities::*;
use clap::Parser;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt};

fn main() -> ExitCode {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            e.exit_code()
        }
    }
}

fn run(args: &Args) -> Result<()> {
    // 1. Load tweets
    let source: Box<dyn RecordSource> = match &args.input {
        Some(path) if !args.synthetic => Box::new(CsvSource::new(path)),
        _ => Box::new(args.synthetic_source()),
    };
    let records = source.fetch()?;

    // 2. Aggregate, build the neighbor graph and cluster
    let report = Pipeline::new(AnalysisConfig::from(args)).run(&records);

    // 3. Save tables and graphs
    report.write_tables(&args.out_dir)?;
    if !args.no_render {
        report.render(&DotSink {
            out_dir: args.out_dir.clone(),
            png: args.png,
            open: args.open,
        })?;
    }
    report.render(&CsvSink {
        out_dir: args.out_dir.clone(),
    })?;

    // 4. Print summaries
    println!("Accounts per creation date:");
    for (date, count) in &report.date_counts {
        println!("  {date}  {count}");
    }
    println!("Quantiles of accounts per date:");
    for q in &report.quantiles {
        println!("  {:>3}%  {:.2}", q.percent, q.value);
    }

    let groups = report.assignment.groups();
    println!(
        "Detected {} communities ({}, modularity {:.3}):",
        groups.len(),
        report.assignment.algorithm.label(),
        report.assignment.modularity
    );
    for (id, members) in groups {
        println!("Community {} ({} members): {}", id, members.len(), members.join(", "));
    }
    Ok(())
}
