//! Entry point for the pulsegrid dashboard. Parses args, resolves config and runs the App.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use pulsegrid::app::{run_headless, App};
use pulsegrid::config::{save_file, Config, Overrides};
use pulsegrid::logging;
use tracing::info;

const USAGE: &str = "[--api URL|-a URL] [--limit N|-l N] [--window N|-w N] [--reconnect-ms MS] [--merge-backfill] [--headless] [--log-file PATH] [--save] [--dry-run] [ws://HOST:PORT/ws]";

#[derive(Debug, Default)]
struct ParsedArgs {
    overrides: Overrides,
    headless: bool,
    log_file: Option<PathBuf>,
    save: bool,
    dry_run: bool,
}

#[derive(Debug)]
enum ArgError {
    Help(String),
    Invalid(String),
}

fn value(flag: &str, v: Option<String>) -> Result<String, ArgError> {
    match v {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ArgError::Invalid(format!("{flag} needs a value"))),
    }
}

fn number<T: std::str::FromStr>(flag: &str, v: Option<String>) -> Result<T, ArgError> {
    let v = value(flag, v)?;
    v.parse()
        .map_err(|_| ArgError::Invalid(format!("{flag}: not a number: {v}")))
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, ArgError> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "pulsegrid".into());
    let mut out = ParsedArgs::default();

    while let Some(arg) = it.next() {
        // `--flag=value` is the same as `--flag value`
        let (flag, inline) = match arg.split_once('=') {
            Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
            _ => (arg.clone(), None),
        };
        let has_inline = inline.is_some();
        let mut next = || if has_inline { inline.clone() } else { it.next() };

        match flag.as_str() {
            "-h" | "--help" => {
                return Err(ArgError::Help(format!("Usage: {prog} {USAGE}")));
            }
            "--api" | "-a" => {
                out.overrides.api_url = Some(value(&flag, next())?);
            }
            "--limit" | "-l" => {
                out.overrides.history_limit = Some(number(&flag, next())?);
            }
            "--window" | "-w" => {
                out.overrides.window = Some(number(&flag, next())?);
            }
            "--reconnect-ms" => {
                out.overrides.reconnect_delay_ms = Some(number(&flag, next())?);
            }
            "--log-file" => {
                out.log_file = Some(PathBuf::from(value(&flag, next())?));
            }
            "--merge-backfill" | "--headless" | "--save" | "--dry-run" if has_inline => {
                return Err(ArgError::Invalid(format!("{flag} takes no value")));
            }
            "--merge-backfill" => out.overrides.merge_backfill = true,
            "--headless" => out.headless = true,
            "--save" => out.save = true,
            "--dry-run" => out.dry_run = true,
            _ if flag.starts_with('-') => {
                return Err(ArgError::Invalid(format!(
                    "Unknown flag {flag}. Usage: {prog} {USAGE}"
                )));
            }
            _ => {
                if out.overrides.ws_url.is_none() {
                    out.overrides.ws_url = Some(arg);
                } else {
                    return Err(ArgError::Invalid(format!(
                        "Unexpected argument. Usage: {prog} {USAGE}"
                    )));
                }
            }
        }
    }
    Ok(out)
}

#[tokio::main]
async fn main() -> Result<()> {
    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(ArgError::Help(msg)) => {
            eprintln!("{msg}");
            return Ok(());
        }
        Err(ArgError::Invalid(msg)) => anyhow::bail!(msg),
    };

    logging::init(parsed.log_file.as_deref(), parsed.headless)?;

    let cfg = Config::resolve(&parsed.overrides);
    cfg.validate().context("invalid configuration")?;

    if parsed.save {
        save_file(&cfg).context("saving config")?;
        info!(path = %pulsegrid::config::config_path().display(), "config saved");
    }
    if parsed.dry_run {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
        return Ok(());
    }

    if parsed.headless {
        run_headless(&cfg).await
    } else {
        let mut app = App::new();
        app.run(&cfg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        std::iter::once("pulsegrid")
            .chain(v.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn long_and_short_flags() {
        let p = parse_args(args(&[
            "--api=http://h:1",
            "--limit=50",
            "-w",
            "20",
            "--reconnect-ms",
            "500",
            "--merge-backfill",
            "--headless",
            "ws://h:1/ws",
        ]))
        .unwrap();
        assert_eq!(p.overrides.api_url.as_deref(), Some("http://h:1"));
        assert_eq!(p.overrides.history_limit, Some(50));
        assert_eq!(p.overrides.window, Some(20));
        assert_eq!(p.overrides.reconnect_delay_ms, Some(500));
        assert!(p.overrides.merge_backfill);
        assert!(p.headless);
        assert_eq!(p.overrides.ws_url.as_deref(), Some("ws://h:1/ws"));
    }

    #[test]
    fn every_valued_flag_requires_its_value() {
        for flags in [
            &["--api"][..],
            &["-a"],
            &["--api="],
            &["--limit"],
            &["--window="],
            &["--reconnect-ms"],
            &["--log-file"],
            &["--log-file="],
        ] {
            assert!(
                matches!(parse_args(args(flags)), Err(ArgError::Invalid(_))),
                "{flags:?}"
            );
        }
        let p = parse_args(args(&["--log-file=/tmp/pg.log", "--window=5"])).unwrap();
        assert_eq!(p.log_file, Some(PathBuf::from("/tmp/pg.log")));
        assert_eq!(p.overrides.window, Some(5));
        assert!(matches!(parse_args(args(&["--headless=yes"])), Err(ArgError::Invalid(_))));
    }

    #[test]
    fn bad_number_and_extra_positional_are_errors() {
        assert!(matches!(parse_args(args(&["-l", "lots"])), Err(ArgError::Invalid(_))));
        assert!(matches!(
            parse_args(args(&["ws://a/ws", "ws://b/ws"])),
            Err(ArgError::Invalid(_))
        ));
        assert!(matches!(parse_args(args(&["--help"])), Err(ArgError::Help(_))));
    }
}
