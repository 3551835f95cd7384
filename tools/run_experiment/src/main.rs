use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use clap::Parser;
use env_logger::Builder;
use serde::Deserialize;

use locsched_dfs::config::DfsPolicyKind;
use locsched_scheduler::experiment::{Experiment, Plan};

#[derive(Deserialize)]
struct Config {
    scenarios: Vec<PathBuf>,
    dfs_types: Vec<DfsPolicyKind>,
    placement_modes: Vec<String>,
}

#[derive(Parser, Debug)]
struct Args {
    /// Path to config.
    #[arg(short, long)]
    config: PathBuf,

    /// Path to folder with traces.
    #[arg(short, long, default_value = None)]
    traces: Option<PathBuf>,

    /// Path to file with results.
    #[arg(short, long)]
    output: PathBuf,

    /// Number of threads.
    #[arg(long, default_value_t = std::thread::available_parallelism().unwrap().get())]
    threads: usize,
}

fn filename(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .split('.')
        .next()
        .unwrap()
        .to_string()
}

fn main() {
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let args = Args::parse();
    let config: Config = serde_yaml::from_str(&std::fs::read_to_string(args.config).expect("Can't read config file"))
        .expect("Can't parse config file");
    let experiment = Experiment::new(
        config
            .scenarios
            .into_iter()
            .map(|path| Plan {
                name: filename(&path),
                scenario_path: path,
            })
            .collect(),
        config.dfs_types,
        config.placement_modes,
        args.traces,
    );

    let result = experiment.run(args.threads);
    File::create(args.output)
        .expect("Can't create output file")
        .write_all(serde_json::to_string_pretty(&result).unwrap().as_bytes())
        .expect("Can't write to output file");
}
