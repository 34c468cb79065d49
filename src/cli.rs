//! Command line parsing for the `ghs-action` binary.
//!
//! Shape: `ghs-action [-v] [--sequential-bitmap-generation] <actionName>
//! <repositoryPath> [<outputFile>]`. Flags may appear in any order before
//! the action name; everything after it is positional.

use std::path::PathBuf;

/// Default output file template; `<pid>` is the current process id.
fn default_output_file() -> PathBuf {
    PathBuf::from(format!(
        "/tmp/ghs-action-execution-{}.json",
        std::process::id()
    ))
}

/// A parsed invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    /// Raise log verbosity to debug.
    pub verbose: bool,
    /// Force bitmap generation into single-pack mode.
    pub single_pack: bool,
    /// External action name (see `actions::ACTION_NAMES`).
    pub action_name: String,
    /// Repository to operate on.
    pub repository_path: PathBuf,
    /// Where the execution-result JSON is written.
    pub output_file: PathBuf,
}

/// Usage string printed on argument errors.
pub const USAGE: &str = "usage: ghs-action [-v] [--sequential-bitmap-generation] \
<actionName> <repositoryPath> [<outputFile>]";

/// Parses command line arguments (without the program name).
pub fn parse_args(args: &[String]) -> Result<Invocation, String> {
    let mut verbose = false;
    let mut single_pack = false;
    let mut positionals: Vec<&str> = Vec::new();

    for arg in args {
        if positionals.is_empty() && arg.starts_with('-') {
            match arg.as_str() {
                "-v" => verbose = true,
                "--sequential-bitmap-generation" => single_pack = true,
                other => return Err(format!("unknown flag: {other}")),
            }
        } else {
            positionals.push(arg.as_str());
        }
    }

    let mut positionals = positionals.into_iter();
    let action_name = positionals
        .next()
        .ok_or_else(|| "missing <actionName>".to_string())?
        .to_string();
    let repository_path = PathBuf::from(
        positionals
            .next()
            .ok_or_else(|| "missing <repositoryPath>".to_string())?,
    );
    let output_file = positionals
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(default_output_file);
    if positionals.next().is_some() {
        return Err("too many arguments".to_string());
    }

    Ok(Invocation {
        verbose,
        single_pack,
        action_name,
        repository_path,
        output_file,
    })
}
