use std::{fs, path::Path};

use serde_yaml::Value;

/// Reads and parses a YAML file. An empty file parses to `Value::Null`.
pub fn read_yaml(path: &Path) -> Result<Value, String> {
    let txt = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    parse_yaml(&txt).map_err(|e| format!("{}: {e}", path.display()))
}

pub fn parse_yaml(txt: &str) -> Result<Value, serde_yaml::Error> {
    if txt.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_yaml::from_str(txt)
}
