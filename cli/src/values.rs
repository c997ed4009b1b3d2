use std::collections::BTreeMap;
use std::path::Path;

use renderer::Value;

/// Parse a `--set KEY=VALUE` argument.
pub fn parse_assignment(arg: &str) -> Result<(String, Value), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", arg))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing variable name in '{}'", arg));
    }
    Ok((key.to_string(), parse_value(value)))
}

/// Interpret a command-line value.
/// Numbers, `true`/`false` and `none` map to their types, a comma makes a
/// list, anything else is a string.
pub fn parse_value(s: &str) -> Value {
    if s.contains(',') {
        return Value::Seq(
            s.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(parse_value)
                .collect(),
        );
    }
    if let Ok(n) = s.parse::<i64>() {
        return Value::Int(n);
    }
    if let Ok(n) = s.parse::<f64>() {
        return Value::Float(n);
    }
    match s {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "none" | "None" => Value::None,
        _ => Value::String(s.to_string()),
    }
}

pub fn toml_to_value(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s.clone()),
        toml::Value::Integer(n) => Value::Int(*n),
        toml::Value::Float(n) => Value::Float(*n),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Seq(items.iter().map(toml_to_value).collect()),
        toml::Value::Table(table) => Value::Map(table_to_vars(table)),
    }
}

pub fn table_to_vars(table: &toml::Table) -> BTreeMap<String, Value> {
    table
        .iter()
        .map(|(key, value)| (key.clone(), toml_to_value(value)))
        .collect()
}

/// Read render variables from a TOML file.
pub fn load_context(path: &Path) -> Result<BTreeMap<String, Value>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    let table: toml::Table = content
        .parse()
        .map_err(|e| format!("invalid context file '{}': {}", path.display(), e))?;
    Ok(table_to_vars(&table))
}
