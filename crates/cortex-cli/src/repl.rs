//! REPL – Read-Eval-Print Loop for the Cortex interactive shell.
//!
//! Supported slash-commands:
//!   /help                                        – show this list
//!   /regions                                     – list registered regions
//!   /ops <region>                                – list a region's operations
//!   /call <region> <op> [json-args] [json-kwargs] – dispatch any operation
//!   /admit <name> [priority]                     – queue a task
//!   /next                                        – take the highest-ranked task
//!   /feedback <name> <success|failure> [detail]  – report a task outcome
//!   /reprioritize [urgency] [decay]              – rescore the queue
//!   /quit | /exit                                – gracefully exit the CLI

use colored::Colorize;
use serde_json::{Map, Value};
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;

use cortex_kernel::{cancel_pair, CancelHandle, DispatchOptions};
use cortex_runtime::{Call, Coordinator};
use cortex_types::{Args, Outcome, Priority};

/// Slot holding the cancel handle of the dispatch currently in flight.
pub type InFlight = Arc<Mutex<Option<CancelHandle>>>;

/// One parsed line of input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Regions,
    Ops(String),
    Dispatch(Call),
    Quit,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
/// While a dispatch runs its cancel handle sits in `in_flight`.
pub fn run(shutdown: Arc<AtomicBool>, rt: &Runtime, coordinator: &Coordinator, in_flight: InFlight) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "cortex>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match parse_command(input) {
            Ok(Command::Help) => cmd_help(),
            Ok(Command::Regions) => cmd_regions(coordinator),
            Ok(Command::Ops(region)) => cmd_ops(coordinator, &region),
            Ok(Command::Dispatch(call)) => cmd_dispatch(rt, coordinator, &in_flight, call),
            Ok(Command::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Err(msg) => println!("{} {}", "✗".red().bold(), msg),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Turn one input line into a [`Command`].
pub fn parse_command(input: &str) -> Result<Command, String> {
    let input = input.trim();
    let (head, rest) = match input.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (input, ""),
    };

    match head {
        "/help" => Ok(Command::Help),
        "/regions" => Ok(Command::Regions),
        "/ops" if !rest.is_empty() => Ok(Command::Ops(rest.to_string())),
        "/ops" => Err(usage("/ops <region>")),
        "/call" => parse_call(rest).map(Command::Dispatch),
        "/admit" => parse_admit(rest).map(Command::Dispatch),
        "/next" => Ok(Command::Dispatch(Call::new("scheduler", "next", Args::new()))),
        "/feedback" => parse_feedback(rest).map(Command::Dispatch),
        "/reprioritize" => parse_reprioritize(rest).map(Command::Dispatch),
        "/quit" | "/exit" => Ok(Command::Quit),
        other => Err(format!(
            "Unknown command '{}'. Type {} for available commands.",
            other.yellow(),
            "/help".bold()
        )),
    }
}

fn usage(form: &str) -> String {
    format!("Usage: {}", form.bold())
}

/// `<region> <op> [json-args] [json-kwargs]`
///
/// A JSON array supplies positional arguments; any other JSON value is a
/// single positional argument.  The optional second value must be an object.
fn parse_call(rest: &str) -> Result<Call, String> {
    let form = "/call <region> <op> [json-args] [json-kwargs]";
    let mut parts = rest.splitn(3, char::is_whitespace);
    let region = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| usage(form))?;
    let operation = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| usage(form))?;
    let tail = parts.next().unwrap_or("").trim();

    let mut values = Vec::new();
    for value in serde_json::Deserializer::from_str(tail).into_iter::<Value>() {
        values.push(value.map_err(|e| format!("Invalid JSON argument: {e}"))?);
    }
    if values.len() > 2 {
        return Err(usage(form));
    }

    let mut values = values.into_iter();
    let positional = match values.next() {
        None => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(single) => vec![single],
    };
    let keyword = match values.next() {
        None => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => return Err("Keyword arguments must be a JSON object".to_string()),
    };

    Ok(Call::new(region, operation, Args { positional, keyword }))
}

/// `<name> [priority]`; a trailing word naming a priority is taken as one.
fn parse_admit(rest: &str) -> Result<Call, String> {
    if rest.is_empty() {
        return Err(usage("/admit <name> [priority]"));
    }
    let (name, priority) = match rest.rsplit_once(char::is_whitespace) {
        Some((name, last)) if last.parse::<Priority>().is_ok() => (name.trim(), Some(last)),
        _ => (rest, None),
    };
    let mut args = Args::new().arg(name);
    if let Some(p) = priority {
        args = args.arg(p);
    }
    Ok(Call::new("scheduler", "admit", args))
}

/// `<name> <success|failure> [detail]`; the first outcome word splits the
/// name from the detail.
fn parse_feedback(rest: &str) -> Result<Call, String> {
    let form = "/feedback <name> <success|failure> [detail]";
    let words: Vec<&str> = rest.split_whitespace().collect();
    let at = words
        .iter()
        .skip(1)
        .position(|w| w.parse::<Outcome>().is_ok())
        .map(|i| i + 1)
        .ok_or_else(|| usage(form))?;

    let name = words[..at].join(" ");
    let mut args = Args::new().arg(name).arg(words[at]);
    if at + 1 < words.len() {
        args = args.arg(words[at + 1..].join(" "));
    }
    Ok(Call::new("scheduler", "feedback", args))
}

/// `[urgency] [decay]`
fn parse_reprioritize(rest: &str) -> Result<Call, String> {
    let form = "/reprioritize [urgency] [decay]";
    let mut args = Args::new();
    for (word, name) in rest.split_whitespace().zip(["urgency_factor", "decay_factor"]) {
        let n: f64 = word.parse().map_err(|_| usage(form))?;
        args = args.kwarg(name, n);
    }
    if rest.split_whitespace().count() > 2 {
        return Err(usage(form));
    }
    Ok(Call::new("scheduler", "reprioritize", args))
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Cortex Commands".bold().underline());
    println!("  {}  – list registered regions", "/regions".bold().cyan());
    println!("  {}  – list a region's operations", "/ops <region>".bold().cyan());
    println!(
        "  {}  – dispatch any operation",
        "/call <region> <op> [json-args] [json-kwargs]".bold().cyan()
    );
    println!("  {}  – queue a task (high / normal / low / number)", "/admit <name> [priority]".bold().cyan());
    println!("  {}  – take the highest-ranked task", "/next".bold().cyan());
    println!(
        "  {}  – report a task outcome",
        "/feedback <name> <success|failure> [detail]".bold().cyan()
    );
    println!("  {}  – rescore the queue", "/reprioritize [urgency] [decay]".bold().cyan());
    println!("  {}  – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
    println!("  Example: {}", r#"/call cache put ["k", 1, {"priority": "high"}]"#.dimmed());
    println!();
}

fn cmd_regions(coordinator: &Coordinator) {
    println!("{}", "Regions".bold().underline());
    for name in coordinator.region_names() {
        println!("  • {}", name.bold());
    }
}

fn cmd_ops(coordinator: &Coordinator, region: &str) {
    match coordinator.operations(region) {
        Ok(ops) => {
            println!("{} {}", "Operations on".bold(), region.bold().cyan());
            for op in ops {
                println!("  • {}", op);
            }
        }
        Err(e) => println!("{} {}", "✗".red().bold(), e),
    }
}

fn cmd_dispatch(rt: &Runtime, coordinator: &Coordinator, in_flight: &InFlight, call: Call) {
    let (handle, signal) = cancel_pair();
    set_in_flight(in_flight, Some(handle));

    let result = rt.block_on(coordinator.dispatch_with(
        &call.region,
        &call.operation,
        call.args,
        DispatchOptions::default().with_cancel(signal),
    ));

    set_in_flight(in_flight, None);

    match result {
        Ok(value) => {
            let pretty = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
            println!("{}", pretty.green());
        }
        Err(e) => println!("{} [{}] {}", "✗".red().bold(), e.kind().yellow(), e),
    }
}

fn set_in_flight(slot: &InFlight, handle: Option<CancelHandle>) {
    *slot.lock().unwrap_or_else(|p| p.into_inner()) = handle;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dispatch(input: &str) -> Call {
        match parse_command(input).expect("parses") {
            Command::Dispatch(call) => call,
            other => panic!("expected dispatch, got {other:?}"),
        }
    }

    #[test]
    fn simple_commands() {
        assert_eq!(parse_command("/help"), Ok(Command::Help));
        assert_eq!(parse_command("  /regions  "), Ok(Command::Regions));
        assert_eq!(parse_command("/ops cache"), Ok(Command::Ops("cache".into())));
        assert_eq!(parse_command("/exit"), Ok(Command::Quit));
        assert!(parse_command("/ops").is_err());
        assert!(parse_command("/launch").is_err());
    }

    #[test]
    fn call_with_positional_and_keyword_json() {
        let call = dispatch(r#"/call cache put ["k", {"a": 1}] {"metadata": {"priority": "high"}}"#);
        assert_eq!(call.region, "cache");
        assert_eq!(call.operation, "put");
        assert_eq!(call.args.positional, vec![json!("k"), json!({"a": 1})]);
        assert_eq!(call.args.keyword["metadata"], json!({"priority": "high"}));
    }

    #[test]
    fn call_scalar_becomes_single_argument() {
        let call = dispatch(r#"/call working_memory get "k""#);
        assert_eq!(call.args.positional, vec![json!("k")]);
        let bare = dispatch("/call scheduler len");
        assert_eq!(bare.args, Args::new());
    }

    #[test]
    fn call_rejects_bad_json_and_non_object_kwargs() {
        assert!(parse_command("/call cache put [1,").is_err());
        assert!(parse_command("/call cache put [1] [2]").is_err());
        assert!(parse_command("/call cache").is_err());
    }

    #[test]
    fn admit_splits_trailing_priority() {
        let call = dispatch("/admit Prepare Dataset high");
        assert_eq!(call.operation, "admit");
        assert_eq!(call.args.positional, vec![json!("Prepare Dataset"), json!("high")]);

        let call = dispatch("/admit Write Report");
        assert_eq!(call.args.positional, vec![json!("Write Report")]);

        let call = dispatch("/admit job 7.5");
        assert_eq!(call.args.positional, vec![json!("job"), json!("7.5")]);

        assert!(parse_command("/admit").is_err());
    }

    #[test]
    fn feedback_splits_name_outcome_and_detail() {
        let call = dispatch("/feedback Prepare Dataset success Workflow created successfully");
        assert_eq!(
            call.args.positional,
            vec![
                json!("Prepare Dataset"),
                json!("success"),
                json!("Workflow created successfully")
            ]
        );

        let call = dispatch("/feedback job failure");
        assert_eq!(call.args.positional, vec![json!("job"), json!("failure")]);

        assert!(parse_command("/feedback job maybe").is_err());
        assert!(parse_command("/feedback success").is_err());
    }

    #[test]
    fn reprioritize_takes_optional_factors() {
        let call = dispatch("/reprioritize");
        assert!(call.args.keyword.is_empty());

        let call = dispatch("/reprioritize 2 0.5");
        assert_eq!(call.args.keyword["urgency_factor"], json!(2.0));
        assert_eq!(call.args.keyword["decay_factor"], json!(0.5));

        assert!(parse_command("/reprioritize fast").is_err());
        assert!(parse_command("/reprioritize 1 2 3").is_err());
    }

    #[test]
    fn next_targets_scheduler() {
        let call = dispatch("/next");
        assert_eq!((call.region.as_str(), call.operation.as_str()), ("scheduler", "next"));
    }
}
