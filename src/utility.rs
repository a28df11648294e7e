use std::{
    env,
    path::{Path, PathBuf},
};

pub const APP_DIR_NAME: &str = "WindowSwitcher";

#[cfg(windows)]
pub fn to_wstring(s: &str) -> Vec<u16> {
    use std::{ffi::OsStr, os::windows::ffi::OsStrExt};

    OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// Decodes a UTF-16 buffer up to the first NUL.
pub fn from_wide(buf: &[u16]) -> String {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..end])
}

pub fn exe_dir() -> Option<PathBuf> {
    let exe_path = env::current_exe().ok()?;
    exe_path.parent().map(Path::to_path_buf)
}

/// `%LOCALAPPDATA%\WindowSwitcher`, else the executable directory, else the
/// working directory.
pub fn app_root_dir() -> PathBuf {
    env::var_os("LOCALAPPDATA")
        .filter(|v| !v.is_empty())
        .map(|p| PathBuf::from(p).join(APP_DIR_NAME))
        .or_else(exe_dir)
        .unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

pub fn config_path() -> PathBuf {
    app_root_dir().join("config.yaml")
}

/// Lower-cased stem of this executable, used to keep the switcher out of its own list.
pub fn own_process_name() -> String {
    env::current_exe()
        .ok()
        .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().to_lowercase()))
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}
