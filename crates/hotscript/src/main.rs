//! `hs`: register a script file and call its functions from the shell.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use hotscript_core::logging::{LogFormat, init_logging};
use hotscript_core::{Bindings, HostConfig, ScriptError, ScriptHost, ScriptSource, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;

#[derive(Parser)]
#[command(name = "hs", version)]
#[command(about = "Compile scripts once and call their functions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Host configuration file (TOML)
    #[arg(long, global = true, env = "HOTSCRIPT_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format (pretty or json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a script and call one of its functions
    Call {
        /// Script file
        script: PathBuf,

        /// Function to call
        function: String,

        /// Arguments, parsed as JSON with a plain-string fallback
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,

        /// Registry key (defaults to the file stem)
        #[arg(long)]
        key: Option<String>,

        /// Binding visible while the script is pre-executed
        #[arg(long = "bind", value_name = "NAME=JSON")]
        bindings: Vec<String>,
    },

    /// Evaluate a script once without registering it
    Eval {
        /// Script file
        script: PathBuf,

        /// Function to call after evaluation
        #[arg(short, long)]
        function: Option<String>,

        /// Arguments for --function
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,

        #[arg(long = "bind", value_name = "NAME=JSON")]
        bindings: Vec<String>,
    },

    /// Compile and pre-execute a script, then report
    Check {
        /// Script file
        script: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<ScriptError>() {
                Some(script_err) => eprintln!("error[{}]: {err:#}", script_err.kind()),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => HostConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => HostConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.log.level = level;
    }
    if let Some(format) = cli.log_format {
        config.log.format = format;
    }
    init_logging(&config.log)?;

    let host = ScriptHost::from_config(&config);
    if !host.provider().is_available() {
        bail!("no scripting engine available for language `{}`", config.language);
    }
    if !config.scripts.is_empty() {
        host.preload(&config.scripts);
    }

    match cli.command {
        Commands::Call {
            script,
            function,
            args,
            key,
            bindings,
        } => {
            let key = match key {
                Some(key) => key,
                None => default_key(&script)?,
            };
            let bindings = parse_bindings(&bindings)?;
            host.try_register(&key, ScriptSource::file(&script), &bindings)?;
            let value = host.try_call(&key, &function, &parse_args(&args))?;
            print_value(&value);
        }
        Commands::Eval {
            script,
            function,
            args,
            bindings,
        } => {
            let bindings = parse_bindings(&bindings)?;
            let value = match function {
                Some(function) => {
                    host.try_eval_file(&script, &bindings, &function, &parse_args(&args))?
                }
                None => {
                    if !args.is_empty() {
                        bail!("arguments given without --function");
                    }
                    let source = std::fs::read_to_string(&script)
                        .with_context(|| format!("failed to read {}", script.display()))?;
                    host.try_eval(&source, &bindings)?
                }
            };
            print_value(&value);
        }
        Commands::Check { script } => {
            let key = default_key(&script)?;
            let value = host.try_register(&key, ScriptSource::file(&script), &Bindings::new())?;
            debug!(key, "check passed");
            if value.is_null() {
                println!("ok {}", script.display());
            } else {
                println!("ok {} -> {}", script.display(), value.to_json());
            }
        }
    }
    Ok(())
}

fn default_key(script: &Path) -> Result<String> {
    script
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .with_context(|| format!("cannot derive a key from {}", script.display()))
}

fn parse_value(text: &str) -> Value {
    serde_json::from_str::<serde_json::Value>(text).map_or_else(|_| Value::from(text), Value::from)
}

fn parse_args(args: &[String]) -> Vec<Value> {
    args.iter().map(|arg| parse_value(arg)).collect()
}

fn parse_bindings(entries: &[String]) -> Result<Bindings> {
    let mut bindings = Bindings::new();
    for entry in entries {
        let Some((name, value)) = entry.split_once('=') else {
            bail!("binding `{entry}` must look like NAME=VALUE");
        };
        if name.is_empty() {
            bail!("binding `{entry}` has an empty name");
        }
        bindings.insert(name, parse_value(value));
    }
    Ok(bindings)
}

fn print_value(value: &Value) {
    println!("{}", value.to_json());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_fall_back_to_strings() {
        assert_eq!(parse_value("42"), Value::I64(42));
        assert_eq!(parse_value("\"quoted\""), Value::from("quoted"));
        assert_eq!(parse_value("world"), Value::from("world"));
        assert_eq!(parse_value("[1,true]"), Value::Array(vec![Value::I64(1), Value::Bool(true)]));
    }

    #[test]
    fn bindings_need_a_name() {
        let bindings = parse_bindings(&["limit=3".into(), "tag=a=b".into()]).unwrap();
        assert_eq!(bindings.get("limit"), Some(&Value::I64(3)));
        assert_eq!(bindings.get("tag"), Some(&Value::from("a=b")));
        assert!(parse_bindings(&["novalue".into()]).is_err());
        assert!(parse_bindings(&["=1".into()]).is_err());
    }

    #[test]
    fn key_defaults_to_file_stem() {
        assert_eq!(default_key(Path::new("dir/rules.lua")).unwrap(), "rules");
    }

    #[test]
    fn cli_parses_call() {
        let cli = Cli::try_parse_from(["hs", "call", "--bind", "x=1", "greet.lua", "hello", "world", "-3"])
            .unwrap();
        match cli.command {
            Commands::Call { function, args, bindings, .. } => {
                assert_eq!(function, "hello");
                assert_eq!(args, vec!["world".to_string(), "-3".to_string()]);
                assert_eq!(bindings, vec!["x=1".to_string()]);
            }
            _ => panic!("expected call"),
        }
    }
}
