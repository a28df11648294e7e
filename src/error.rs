use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwitcherError {
    #[error("failed to register hotkey {chord}: {message} (code {code:#X})")]
    HotkeyRegistration {
        chord: String,
        code: i32,
        message: String,
    },

    #[error("failed to install keyboard hook: {message} (code {code:#X})")]
    HookInstall { code: i32, message: String },

    #[error("hotkey listener thread failed: {0}")]
    HotkeyThread(String),

    #[error("invalid hotkey chord: {0}")]
    InvalidChord(String),

    #[error("window switching is only supported on Windows")]
    UnsupportedPlatform,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
