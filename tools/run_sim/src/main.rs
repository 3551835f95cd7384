use std::{fs::File, io::Write, path::PathBuf};

use clap::Parser;
use env_logger::Builder;

use locsched_scheduler::{config::Scenario, simulation::Simulation};

#[derive(Parser, Debug)]
struct Args {
    /// Path to scenario.
    #[arg(short, long)]
    scenario: PathBuf,

    /// Path to file with resulting stats; stdout if not set.
    #[arg(short, long, default_value = None)]
    output: Option<PathBuf>,

    /// Path to file with the scheduling trace.
    #[arg(short, long, default_value = None)]
    trace: Option<PathBuf>,
}

fn main() {
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let args = Args::parse();
    let scenario = Scenario::from_yaml(&args.scenario);
    let run_stats = Simulation::new(scenario, args.trace).run();
    let json = serde_json::to_string_pretty(&run_stats).unwrap();
    match args.output {
        Some(path) => File::create(&path)
            .unwrap_or_else(|_| panic!("Can't create output file {}", path.display()))
            .write_all(json.as_bytes())
            .unwrap_or_else(|_| panic!("Can't write to output file {}", path.display())),
        None => println!("{}", json),
    }
}
