//! Command-line front end for evaluating CEL expressions.
//!
//! Reads newline-delimited JSON documents from stdin (one evaluation per
//! document, jq-style) unless `-n` is given or stdin is a terminal;
//! `--slurp` treats all of stdin as a single document. Exit status: 0 on
//! success, 1 on boolean-false (`-b`) or a reported evaluation error, 2 on
//! usage errors (clap's default).

use std::{
    io::{IsTerminal, Read},
    path::PathBuf,
    process::ExitCode,
};

use celo::{Activation, Duration, Environment, EvalResult, Timestamp, Value, json_to_value};
use clap::Parser;
use serde::Deserialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "celo", version, about = "Evaluate a CEL expression", max_term_width = 100)]
struct Cli {
    /// CEL expression to evaluate.
    expr: String,

    /// Do not read stdin as JSON input.
    #[arg(short = 'n', long = "null-input")]
    null_input: bool,

    /// Typed variable binding, repeatable. TYPE is one of int, uint,
    /// double, string, bool, bytes, duration, timestamp, list, map.
    #[arg(short = 'a', long = "arg", value_name = "NAME:TYPE=VALUE")]
    arg: Vec<String>,

    /// Treat the result as a boolean: exit 0 if true, 1 if false, no stdout.
    #[arg(short = 'b', long = "boolean")]
    boolean: bool,

    /// Format the result with a printf-style spec, e.g. '%08.2f'.
    #[arg(short = 'f', long = "format", value_name = "SPEC")]
    format: Option<String>,

    /// Bind the stdin JSON document to this variable name.
    #[arg(long = "json-document", value_name = "NAME")]
    json_document: Option<String>,

    /// Expose the top-level keys of the stdin JSON document as variables.
    #[arg(long = "json-package")]
    json_package: bool,

    /// Read all of stdin as one document instead of one document per line.
    #[arg(long = "slurp")]
    slurp: bool,

    /// Optional TOML configuration file (logging setup only).
    #[arg(long = "config", value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct Config {
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingConfig {
    /// A tracing env-filter directive, e.g. "celo=debug".
    filter: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(message) = init_logging(cli.config.as_deref()) {
        eprintln!("error: {message}");
        return ExitCode::from(2);
    }

    let mut base = Activation::new();
    for binding in &cli.arg {
        match parse_arg_binding(binding) {
            Ok((name, value)) => {
                base.bind(name, value);
            }
            Err(message) => {
                eprintln!("error: invalid --arg '{binding}': {message}");
                return ExitCode::from(2);
            }
        }
    }

    let env = Environment::new("");
    let program = match env.compile(&cli.expr) {
        Ok(p) => p,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    debug!(expr = %cli.expr, "compiled expression");

    let documents = match read_documents(&cli) {
        Ok(docs) => docs,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::FAILURE;
        }
    };

    let mut status = ExitCode::SUCCESS;
    match documents {
        None => {
            if !run_one(&cli, &program, base) {
                status = ExitCode::FAILURE;
            }
        }
        Some(docs) => {
            for doc in docs {
                let mut activation = base.clone();
                bind_document(&cli, &mut activation, &doc);
                if !run_one(&cli, &program, activation) {
                    status = ExitCode::FAILURE;
                }
            }
        }
    }
    status
}

/// Evaluates once and reports. Returns false when the exit status should be
/// a failure (evaluation error, or boolean-false under `-b`).
fn run_one(cli: &Cli, program: &celo::Program<'_>, activation: Activation) -> bool {
    match program.evaluate(&activation) {
        Ok(value) => {
            if cli.boolean {
                return matches!(value, Value::Bool(true));
            }
            match render(cli.format.as_deref(), &value) {
                Ok(text) => {
                    println!("{text}");
                    true
                }
                Err(message) => {
                    eprintln!("error: {message}");
                    false
                }
            }
        }
        Err(err) => {
            eprintln!("error: {err}");
            false
        }
    }
}

fn init_logging(config_path: Option<&std::path::Path>) -> Result<(), String> {
    let config = match config_path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
            toml::from_str::<Config>(&text).map_err(|e| format!("invalid config {}: {e}", path.display()))?
        }
        None => Config::default(),
    };
    let filter = match config.logging.filter {
        Some(directive) => EnvFilter::try_new(directive).map_err(|e| format!("invalid logging filter: {e}"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Reads stdin documents per the flags; None means no input was consumed.
fn read_documents(cli: &Cli) -> Result<Option<Vec<serde_json::Value>>, String> {
    if cli.null_input || std::io::stdin().is_terminal() {
        return Ok(None);
    }
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .map_err(|e| format!("cannot read stdin: {e}"))?;
    if cli.slurp {
        let doc: serde_json::Value = serde_json::from_str(&text).map_err(|e| format!("invalid JSON input: {e}"))?;
        return Ok(Some(vec![doc]));
    }
    let mut docs = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let doc: serde_json::Value =
            serde_json::from_str(line).map_err(|e| format!("invalid JSON input line: {e}"))?;
        docs.push(doc);
    }
    Ok(Some(docs))
}

fn bind_document(cli: &Cli, activation: &mut Activation, doc: &serde_json::Value) {
    if cli.json_package {
        if let serde_json::Value::Object(fields) = doc {
            for (name, field) in fields {
                activation.bind(name.as_str(), json_to_value(field));
            }
        }
        return;
    }
    let name = cli.json_document.as_deref().unwrap_or("doc");
    activation.bind(name, json_to_value(doc));
}

/// Parses one `name:type=value` binding.
fn parse_arg_binding(binding: &str) -> Result<(String, Value), String> {
    let (name, rest) = binding
        .split_once(':')
        .ok_or_else(|| "expected name:type=value".to_owned())?;
    let (type_tag, text) = rest.split_once('=').ok_or_else(|| "expected name:type=value".to_owned())?;
    let value = typed_value(type_tag, text)?;
    Ok((name.to_owned(), value))
}

fn typed_value(type_tag: &str, text: &str) -> Result<Value, String> {
    match type_tag {
        "int" => text.parse::<i64>().map(Value::Int).map_err(|e| e.to_string()),
        "uint" => text.parse::<u64>().map(Value::Uint).map_err(|e| e.to_string()),
        "double" => text.parse::<f64>().map(Value::Double).map_err(|e| e.to_string()),
        "string" => Ok(Value::from(text)),
        "bool" => match text {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(format!("invalid bool '{text}'")),
        },
        "bytes" => Ok(Value::bytes(text.as_bytes().to_vec())),
        "duration" => first_err_message(Duration::parse(text).map(Value::Duration)),
        "timestamp" => first_err_message(Timestamp::parse(text).map(Value::Timestamp)),
        "list" => {
            let doc: serde_json::Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
            match json_to_value(&doc) {
                v @ Value::List(_) => Ok(v),
                _ => Err("expected a JSON array".to_owned()),
            }
        }
        "map" => {
            let doc: serde_json::Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
            match json_to_value(&doc) {
                v @ Value::Map(_) => Ok(v),
                _ => Err("expected a JSON object".to_owned()),
            }
        }
        other => Err(format!("unknown type tag '{other}'")),
    }
}

fn first_err_message(result: EvalResult<Value>) -> Result<Value, String> {
    result.map_err(|e| e.to_string())
}

/// Renders the result, applying a printf-style spec when given.
fn render(spec: Option<&str>, value: &Value) -> Result<String, String> {
    let Some(spec) = spec else {
        return Ok(value.to_string());
    };
    let mut out = String::new();
    let mut chars = spec.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }
        // flags, width, precision
        let mut zero_pad = false;
        let mut width = 0usize;
        let mut precision: Option<usize> = None;
        while chars.peek() == Some(&'0') {
            zero_pad = true;
            chars.next();
        }
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            width = width * 10 + d as usize;
            chars.next();
        }
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut p = 0usize;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                p = p * 10 + d as usize;
                chars.next();
            }
            precision = Some(p);
        }
        let conv = chars.next().ok_or_else(|| "truncated format spec".to_owned())?;
        let rendered = format_one(conv, precision, value)?;
        if rendered.len() < width {
            let pad = if zero_pad { '0' } else { ' ' };
            for _ in 0..(width - rendered.len()) {
                out.push(pad);
            }
        }
        out.push_str(&rendered);
    }
    Ok(out)
}

fn format_one(conv: char, precision: Option<usize>, value: &Value) -> Result<String, String> {
    let as_int = || -> Result<i64, String> {
        match value {
            Value::Int(i) => Ok(*i),
            Value::Uint(u) => i64::try_from(*u).map_err(|_| "uint too large for this format".to_owned()),
            Value::Bool(b) => Ok(i64::from(*b)),
            other => Err(format!("cannot format {} as an integer", other.cel_type())),
        }
    };
    let as_double = || -> Result<f64, String> {
        match value {
            Value::Double(d) => Ok(*d),
            Value::Int(i) => Ok(*i as f64),
            Value::Uint(u) => Ok(*u as f64),
            other => Err(format!("cannot format {} as a double", other.cel_type())),
        }
    };
    match conv {
        'd' | 'i' | 'u' => as_int().map(|i| i.to_string()),
        'x' => as_int().map(|i| format!("{i:x}")),
        'X' => as_int().map(|i| format!("{i:X}")),
        'o' => as_int().map(|i| format!("{i:o}")),
        'f' | 'e' | 'g' => {
            let d = as_double()?;
            let p = precision.unwrap_or(6);
            Ok(match conv {
                'f' => format!("{d:.p$}"),
                'e' => format!("{d:.p$e}"),
                _ => format!("{d}"),
            })
        }
        's' => Ok(match value {
            Value::String(s) => s.to_string(),
            other => other.to_string(),
        }),
        other => Err(format!("unsupported format conversion '%{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_bindings_parse() {
        assert_eq!(typed_value("int", "-3").unwrap(), Value::Int(-3));
        assert_eq!(typed_value("uint", "3").unwrap(), Value::Uint(3));
        assert_eq!(typed_value("bool", "true").unwrap(), Value::Bool(true));
        assert!(matches!(typed_value("duration", "10s").unwrap(), Value::Duration(_)));
        assert!(matches!(typed_value("list", "[1, 2]").unwrap(), Value::List(_)));
        assert!(typed_value("bool", "yes").is_err());
        assert!(typed_value("complex", "1").is_err());
    }

    #[test]
    fn arg_binding_splits_on_first_colon_and_equals() {
        let (name, value) = parse_arg_binding("greeting:string=a=b").unwrap();
        assert_eq!(name, "greeting");
        assert_eq!(value, Value::from("a=b"));
    }

    #[test]
    fn printf_rendering() {
        assert_eq!(render(Some("%d"), &Value::Int(42)).unwrap(), "42");
        assert_eq!(render(Some("%05d"), &Value::Int(42)).unwrap(), "00042");
        assert_eq!(render(Some("%.2f"), &Value::Double(1.2345)).unwrap(), "1.23");
        assert_eq!(render(Some("x=%x!"), &Value::Int(255)).unwrap(), "x=ff!");
        assert_eq!(render(Some("%s"), &Value::from("hi")).unwrap(), "hi");
        assert_eq!(render(Some("100%%"), &Value::Int(1)).unwrap(), "100%");
    }

    #[test]
    fn plain_rendering_uses_literal_forms() {
        assert_eq!(render(None, &Value::Uint(3)).unwrap(), "3u");
        assert_eq!(render(None, &Value::from("hi")).unwrap(), "\"hi\"");
    }
}
