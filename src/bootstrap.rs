use std::{fs, path::Path};

use crate::{info, warn};

pub const DEFAULT_CONFIG: &str = r#"# Window switcher configuration
hotkey:
  # modifiers (win|ctrl|alt|shift) joined with '+' and one key
  chord: "win+s"
  # "hook" taps the keyboard and only swallows the chord's key
  # "register" asks the OS for the chord exclusively (fails if it is taken)
  strategy: "hook"

catalog:
  # added to the built-in shell/helper lists
  excluded_classes: []
  excluded_processes: []

watcher:
  poll_interval_ms: 10
  timeout_ms: 5000

icons:
  # optional PNG shown for windows without a usable icon
  fallback: ""
  emit: true

development:
  debug: false
  log_level: "info"
"#;

/// Creates the app root and a default `config.yaml` if they are missing.
/// Failures are logged; the switcher still runs on defaults.
pub fn bootstrap(root: &Path) {
    if let Err(e) = fs::create_dir_all(root) {
        warn!("[SWITCHER] Cannot create app directory {}: {e}", root.display());
        return;
    }
    scaffold_config_yaml(root);
}

fn scaffold_config_yaml(root: &Path) {
    let path = root.join("config.yaml");
    if path.exists() {
        return;
    }

    match fs::write(&path, DEFAULT_CONFIG) {
        Ok(_) => info!("[SWITCHER] Created {}", path.display()),
        Err(e) => warn!("[SWITCHER] Failed to create {}: {e}", path.display()),
    }
}
