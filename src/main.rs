use std::env;
use std::process::exit;
use std::time::Duration;

use clap::Parser;
use colored::*;
use dotenv::dotenv;

use dbtune::errors::TuneError;
use dbtune::refine::{self, OpenAiAdvisor};
use dbtune::report;
use dbtune::rules;
use dbtune::telemetry::Telemetry;

///Analyzes a Cloud SQL telemetry snapshot (metrics, database flags, slow query log)
///and produces prioritized tuning recommendations as a CSV report.
///Heuristic findings can optionally be refined by an AI model; when the model is
///unavailable the heuristic findings are always delivered as-is.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
struct Args {
    ///Metrics snapshot file (JSON object of numeric values)
    metrics: String,

    ///Database flags file (key=value lines, # comments)
    flags: String,

    ///Slow query log (timestamp | duration | query per line)
    slow_log: String,

    ///Write report to nondefault file
    #[clap(short, long, default_value = "outputs/recommendations.csv")]
    outfile: String,

    ///Use AI model to refine recommendations.
    ///Environment variable OPENAI_API_KEY should be set to your personal API key.
    ///The parameter should be set to the value in format: VENDOR:MODEL_NAME (for example openai:gpt-4)
    #[clap(short, long, default_value = "NO")]
    ai: String,

    ///Timeout in seconds for the AI service call
    #[clap(short, long, default_value_t = 30)]
    timeout: u64,

    ///Should I be quiet? This mode suppresses terminal output but still writes the report
    #[clap(short, long)]
    quiet: bool,
}

fn main() {
    dotenv().ok();
    let args = Args::parse();
    if !args.quiet {
        println!("{}{}", "dbtune v".bright_yellow(), env!("CARGO_PKG_VERSION").bright_yellow());
    }
    if let Err(e) = run(args) {
        eprintln!("{} {}", "Error:".bright_red(), e);
        exit(1);
    }
}

fn run(args: Args) -> Result<(), TuneError> {
    let telemetry = Telemetry::load(&args.metrics, &args.flags, &args.slow_log)?;

    let findings = rules::evaluate(&telemetry.metrics, &telemetry.flags, &telemetry.slow_queries);
    let findings = rules::dedup(findings);

    let findings = if args.ai == "NO" {
        refine::heuristic_only(findings)
    } else {
        let (vendor, model) = args
            .ai
            .split_once(':')
            .ok_or_else(|| TuneError::Usage(format!("--ai must be VENDOR:MODEL_NAME, got '{}'", args.ai)))?;
        if vendor != "openai" {
            return Err(TuneError::Usage(format!("unsupported advisory vendor '{}'", vendor)));
        }
        match env::var("OPENAI_API_KEY") {
            Err(_) => {
                if !args.quiet {
                    println!(
                        "{}",
                        "⚠️  OPENAI_API_KEY is not set, keeping heuristic findings".yellow()
                    );
                }
                refine::heuristic_only(findings)
            }
            Ok(api_key) => {
                if !args.quiet {
                    println!("{}{}{}", "=== Consulting AI model: ".bright_cyan(), model, " ===".bright_cyan());
                }
                let advisor = OpenAiAdvisor::new(api_key, model.to_string(), Duration::from_secs(args.timeout));
                let context = refine::telemetry_context(&telemetry);
                match advisor {
                    Ok(advisor) => {
                        let rt = tokio::runtime::Runtime::new().expect("Can't build tokio runtime");
                        rt.block_on(refine::refine(&advisor, findings, &context, args.quiet))
                    }
                    Err(e) => {
                        if !args.quiet {
                            println!(
                                "{} {}",
                                "⚠️  Advisory client unavailable, keeping heuristic findings:".yellow(),
                                e
                            );
                        }
                        refine::heuristic_only(findings)
                    }
                }
            }
        }
    };

    let rows = report::assemble(&findings);
    report::write_csv(&rows, &args.outfile)?;

    if !args.quiet {
        if rows.is_empty() {
            println!("{}", "No tuning findings: telemetry is within all thresholds.".green());
        } else {
            report::render_table(&rows).printstd();
        }
        println!("{}{}", "Saved recommendations to ".green(), args.outfile.green());
    }
    Ok(())
}
