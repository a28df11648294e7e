use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::icon::IconImage;

/// Opaque top-level window identifier. The OS recycles values after a window is
/// destroyed, so a handle only identifies a window while it is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowHandle(pub isize);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// Virtual desktop identifier. The nil UUID is the "no real desktop" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesktopId(pub Uuid);

impl DesktopId {
    pub const EMPTY: DesktopId = DesktopId(Uuid::nil());

    pub fn is_empty(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for DesktopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[derive(Debug, Clone)]
pub struct WindowRecord {
    pub handle: WindowHandle,
    pub title: String,
    /// Executable stem, lower-cased.
    pub process_name: String,
    pub icon: IconImage,
    pub desktop: DesktopId,
}

pub type Catalog = HashMap<WindowHandle, WindowRecord>;

/// Everything one refresh produces, handed to the view thread by value.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub catalog: Catalog,
    pub current_desktop: DesktopId,
    pub desktop_labels: HashMap<DesktopId, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesktopSummary {
    pub id: DesktopId,
    pub label: String,
    pub window_count: usize,
    pub is_current: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_desktop_is_nil_uuid() {
        assert!(DesktopId::EMPTY.is_empty());
        assert!(DesktopId::default().is_empty());
        assert!(!DesktopId(Uuid::from_u128(7)).is_empty());
    }

    #[test]
    fn handle_displays_as_hex() {
        assert_eq!(WindowHandle(0x1A2B).to_string(), "0x1A2B");
    }
}
