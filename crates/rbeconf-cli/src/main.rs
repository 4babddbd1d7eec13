use atty::Stream;
use clap::Parser;
use color_eyre::Result;
use rbeconf_core::{CommandStatus, ExecutionOutcome, GenerationSummary};
use serde_json::Value;

mod cli;
mod style;

use cli::RbeconfCli;
use style::Style;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = RbeconfCli::parse();
    init_tracing(cli.trace, cli.verbose, cli.quiet);

    let opts = cli.to_options();
    let outcome = match rbeconf_core::generate(&opts) {
        Ok(summary) => success_outcome(&summary)?,
        Err(err) => {
            tracing::debug!(error = ?err, "config generation failed");
            ExecutionOutcome::from(&err)
        }
    };
    let code = emit_output(&cli, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8, quiet: bool) {
    let level = if trace {
        "trace"
    } else if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("rbeconf={level},rbeconf_core={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn success_outcome(summary: &GenerationSummary) -> Result<ExecutionOutcome> {
    let message = format!("generated toolchain configs from {}", summary.resolved_image);
    Ok(ExecutionOutcome::success(message, serde_json::to_value(summary)?))
}

fn emit_output(cli: &RbeconfCli, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.status.exit_code();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(code);
    }

    if outcome.status == CommandStatus::Ok {
        if !cli.quiet {
            let style = Style::new(cli.no_color, atty::is(Stream::Stdout));
            println!("{}", style.status(outcome.status, &outcome.message));
            for line in summary_lines(&style, &outcome.details) {
                println!("{line}");
            }
        }
    } else {
        let style = Style::new(cli.no_color, atty::is(Stream::Stderr));
        eprintln!("{}", style.status(outcome.status, &outcome.message));
        for line in failure_lines(&style, &outcome.details) {
            eprintln!("{line}");
        }
    }

    Ok(code)
}

fn summary_lines(style: &Style, details: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    let field = |key: &str| details.get(key).and_then(Value::as_str);
    if let Some(path) = field("output_tarball") {
        lines.push(style.field("tarball", path));
    }
    if let Some(digest) = field("tarball_sha256") {
        lines.push(style.field("sha256", digest));
    }
    if let Some(dir) = field("output_dir") {
        lines.push(style.field("directory", dir));
    }
    if let Some(manifest) = field("output_manifest") {
        lines.push(style.field("manifest", manifest));
    }
    if let Some(kept) = field("retained_work_dir") {
        lines.push(style.info(&format!("Intermediate files were kept in {kept}")));
    }
    lines
}

fn failure_lines(style: &Style, details: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(problems) = details.get("problems").and_then(Value::as_array) {
        for problem in problems.iter().filter_map(Value::as_str) {
            lines.push(format!("  - {problem}"));
        }
    }
    if let Some(output) = details.get("output").and_then(Value::as_str) {
        let tail: Vec<&str> = output.lines().rev().take(20).collect();
        for line in tail.into_iter().rev() {
            lines.push(format!("  | {line}"));
        }
    }
    if let Some(code) = details.get("code").and_then(Value::as_str) {
        lines.push(style.info(&format!("error code {code}")));
    }
    lines
}
