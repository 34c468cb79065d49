//! Scheduler entry point: run one maintenance action and write the
//! execution result JSON.
//!
//! The process exits 0 whenever an action ran, even if the action itself
//! reported a failure (the scheduler reads the result file); -1 is
//! reserved for usage errors.

use std::process::exit;

use tracing::{error, info};

use ghs::actions::{action_for_name, ActionOptions, ExecutionResult, StatsCollector};
use ghs::cli::{parse_args, USAGE};
use ghs::logging;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = match parse_args(&args) {
        Ok(invocation) => invocation,
        Err(err) => {
            eprintln!("{err}");
            eprintln!("{USAGE}");
            exit(-1);
        }
    };

    logging::init(invocation.verbose);

    let options = ActionOptions {
        single_pack: invocation.single_pack,
    };
    let Some(action) = action_for_name(&invocation.action_name, options) else {
        error!(action = %invocation.action_name, "unknown action name");
        eprintln!("unknown action: {}", invocation.action_name);
        eprintln!("{USAGE}");
        exit(-1);
    };

    let collector = StatsCollector::start();
    let result = action.apply(&invocation.repository_path);
    let stats = collector.stop();

    info!(
        action = %invocation.action_name,
        repo = %invocation.repository_path.display(),
        successful = result.successful,
        message = result.message.as_deref().unwrap_or(""),
        wall_time_ms = stats.wall_time_ms,
        "action finished"
    );

    let execution = ExecutionResult::new(result, stats);
    if let Err(err) = execution.write_to(&invocation.output_file) {
        error!(
            output = %invocation.output_file.display(),
            "cannot write execution result: {err}"
        );
        exit(-1);
    }
}
