use std::{
    collections::{HashMap, HashSet},
    time::Instant,
};

use uuid::Uuid;

use crate::{
    debug,
    icon::IconImage,
    info,
    model::{Catalog, CatalogSnapshot, DesktopId, WindowHandle, WindowRecord},
};

/* =========================
   BUILT-IN EXCLUSIONS
   ========================= */

/// Shell and notification-area surfaces that are never switch targets.
pub const EXCLUDED_CLASSES: &[&str] = &[
    "Shell_TrayWnd",
    "Shell_SecondaryTrayWnd",
    "DV2ControlHost",
    "WorkerW",
    "Progman",
    "ButtonNotification",
    "NotifyIconOverflowWindow",
    "NotifyIconWindow",
    "Microsoft.UI.Content.PopupWindowSiteBridge",
];

/// OS chrome processes, by lower-cased executable stem.
pub const EXCLUDED_PROCESSES: &[&str] = &[
    "textinputhost",
    "startmenuexperiencehost",
    "searchui",
    "searchhost",
    "shellexperiencehost",
    "systemsettings",
    "lockapp",
    "runtimebroker",
    "backgroundtaskhost",
    "cortana",
    "sihost",
    "taskhostw",
    "logioverlay",
];

/* =========================
   COLLABORATORS
   ========================= */

/// One visible top-level window as reported by the OS, before any filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawWindow {
    pub handle: WindowHandle,
    pub title: String,
    pub class_name: String,
    /// Executable stem as reported; empty when the owning process could not be opened.
    pub process_name: String,
}

pub trait WindowProbe {
    /// Single pass over the visible top-level windows.
    fn enumerate(&self) -> Vec<RawWindow>;

    /// Best-effort PNG bytes for a window's icon. Only called for windows that
    /// survive exclusion.
    fn icon_for(&self, _handle: WindowHandle) -> Option<Vec<u8>> {
        None
    }
}

pub trait DesktopClassifier {
    /// `DesktopId::EMPTY` when the window is gone or lives on no real desktop.
    fn desktop_of(&self, handle: WindowHandle) -> DesktopId;

    fn current_desktop(&self) -> DesktopId;

    fn desktop_labels(&self) -> HashMap<DesktopId, String> {
        HashMap::new()
    }
}

/* =========================
   EXCLUSION RULES
   ========================= */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Class,
    EmptyTitle,
    OwnProcess,
    Process,
    NoDesktop,
}

#[derive(Debug, Clone)]
pub struct ExclusionRules {
    classes: HashSet<String>,
    processes: HashSet<String>,
    self_process: Option<String>,
}

impl Default for ExclusionRules {
    fn default() -> Self {
        Self::new(
            EXCLUDED_CLASSES.iter().copied(),
            EXCLUDED_PROCESSES.iter().copied(),
        )
    }
}

impl ExclusionRules {
    pub fn new<C, P>(classes: C, processes: P) -> Self
    where
        C: IntoIterator,
        C::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        Self {
            classes: classes
                .into_iter()
                .map(|c| c.as_ref().trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect(),
            processes: processes
                .into_iter()
                .map(|p| normalize_process_name(p.as_ref()))
                .filter(|p| !p.is_empty())
                .collect(),
            self_process: None,
        }
    }

    /// Built-in lists plus user additions.
    pub fn with_extra(extra_classes: &[String], extra_processes: &[String]) -> Self {
        let mut rules = Self::default();
        rules.classes.extend(
            extra_classes
                .iter()
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty()),
        );
        rules.processes.extend(
            extra_processes
                .iter()
                .map(|p| normalize_process_name(p))
                .filter(|p| !p.is_empty()),
        );
        rules
    }

    pub fn excluding_self(mut self, own_process: &str) -> Self {
        let own = normalize_process_name(own_process);
        self.self_process = (!own.is_empty()).then_some(own);
        self
    }

    /// Checks everything that can be decided without asking the desktop classifier.
    /// `process` must already be normalised.
    pub fn check(&self, raw: &RawWindow, process: &str) -> Result<(), Rejection> {
        if self.classes.contains(&raw.class_name.to_lowercase()) {
            return Err(Rejection::Class);
        }
        if raw.title.trim().is_empty() {
            return Err(Rejection::EmptyTitle);
        }
        if self.self_process.as_deref() == Some(process) {
            return Err(Rejection::OwnProcess);
        }
        if self.processes.contains(process) {
            return Err(Rejection::Process);
        }
        Ok(())
    }
}

/// Lower-cased executable stem: `C:\Apps\Code.EXE` and `Code` both become `code`.
pub fn normalize_process_name(name: &str) -> String {
    let name = name.trim();
    let file = name.rsplit(['\\', '/']).next().unwrap_or(name);
    let lower = file.to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

/* =========================
   BUILDER
   ========================= */

pub struct CatalogBuilder<'a> {
    probe: &'a dyn WindowProbe,
    classifier: &'a dyn DesktopClassifier,
    rules: &'a ExclusionRules,
}

impl<'a> CatalogBuilder<'a> {
    pub fn new(
        probe: &'a dyn WindowProbe,
        classifier: &'a dyn DesktopClassifier,
        rules: &'a ExclusionRules,
    ) -> Self {
        Self {
            probe,
            classifier,
            rules,
        }
    }

    /// Never fails: per-window lookup failures only drop that window.
    pub fn refresh(&self) -> CatalogSnapshot {
        let started = Instant::now();
        let raw = self.probe.enumerate();
        let enumerated = raw.len();
        let mut catalog = Catalog::with_capacity(enumerated);

        for window in raw {
            let process = normalize_process_name(&window.process_name);
            if let Err(reason) = self.rules.check(&window, &process) {
                debug!(
                    "[SWITCHER][CATALOG] skip {} ({:?}) class={} process={}",
                    window.handle, reason, window.class_name, process
                );
                continue;
            }

            let desktop = self.classifier.desktop_of(window.handle);
            if desktop.is_empty() {
                debug!(
                    "[SWITCHER][CATALOG] skip {} ({:?}) \"{}\"",
                    window.handle,
                    Rejection::NoDesktop,
                    window.title
                );
                continue;
            }

            let icon = IconImage::from_bytes_or_fallback(self.probe.icon_for(window.handle));
            catalog.insert(
                window.handle,
                WindowRecord {
                    handle: window.handle,
                    title: window.title,
                    process_name: process,
                    icon,
                    desktop,
                },
            );
        }

        let current_desktop = self.classifier.current_desktop();
        let desktop_labels = self.classifier.desktop_labels();

        info!(
            "[SWITCHER][CATALOG] loaded {} of {} windows in {} ms",
            catalog.len(),
            enumerated,
            started.elapsed().as_millis()
        );

        CatalogSnapshot {
            catalog,
            current_desktop,
            desktop_labels,
        }
    }
}

/* =========================
   DESKTOP LABELS
   ========================= */

/// Parses the registry's desktop order blob: consecutive 16-byte GUIDs in
/// little-endian field layout. A trailing partial chunk is ignored.
pub fn parse_desktop_order(bytes: &[u8]) -> Vec<DesktopId> {
    bytes
        .chunks_exact(16)
        .filter_map(|chunk| <[u8; 16]>::try_from(chunk).ok())
        .map(|raw| DesktopId(Uuid::from_bytes_le(raw)))
        .filter(|id| !id.is_empty())
        .collect()
}

/// User-assigned names win; unnamed desktops get their 1-based ordinal.
pub fn label_desktops(
    order: &[DesktopId],
    names: &HashMap<DesktopId, String>,
) -> HashMap<DesktopId, String> {
    order
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let label = names
                .get(id)
                .map(|n| n.trim())
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Desktop {}", i + 1));
            (*id, label)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use pretty_assertions::assert_eq;

    use super::*;

    const D1: DesktopId = DesktopId(Uuid::from_u128(1));
    const D2: DesktopId = DesktopId(Uuid::from_u128(2));

    fn raw(handle: isize, title: &str, class: &str, process: &str) -> RawWindow {
        RawWindow {
            handle: WindowHandle(handle),
            title: title.to_string(),
            class_name: class.to_string(),
            process_name: process.to_string(),
        }
    }

    #[derive(Default)]
    struct FakeProbe {
        windows: Vec<RawWindow>,
        icons: HashMap<WindowHandle, Vec<u8>>,
        icon_requests: RefCell<Vec<WindowHandle>>,
    }

    impl WindowProbe for FakeProbe {
        fn enumerate(&self) -> Vec<RawWindow> {
            self.windows.clone()
        }

        fn icon_for(&self, handle: WindowHandle) -> Option<Vec<u8>> {
            self.icon_requests.borrow_mut().push(handle);
            self.icons.get(&handle).cloned()
        }
    }

    struct FakeClassifier {
        desktops: HashMap<WindowHandle, DesktopId>,
        current: DesktopId,
        current_calls: RefCell<usize>,
    }

    impl FakeClassifier {
        fn new(desktops: &[(isize, DesktopId)], current: DesktopId) -> Self {
            Self {
                desktops: desktops
                    .iter()
                    .map(|(h, d)| (WindowHandle(*h), *d))
                    .collect(),
                current,
                current_calls: RefCell::new(0),
            }
        }
    }

    impl DesktopClassifier for FakeClassifier {
        fn desktop_of(&self, handle: WindowHandle) -> DesktopId {
            self.desktops.get(&handle).copied().unwrap_or(DesktopId::EMPTY)
        }

        fn current_desktop(&self) -> DesktopId {
            *self.current_calls.borrow_mut() += 1;
            self.current
        }
    }

    fn handles(snapshot: &CatalogSnapshot) -> Vec<isize> {
        let mut h: Vec<isize> = snapshot.catalog.keys().map(|k| k.0).collect();
        h.sort();
        h
    }

    #[test]
    fn applies_every_exclusion_rule() {
        let probe = FakeProbe {
            windows: vec![
                raw(1, "Inbox - Mail", "ApplicationFrameWindow", "Mail.exe"),
                raw(2, "", "Chrome_WidgetWin_1", "chrome"),
                raw(3, "   ", "Chrome_WidgetWin_1", "chrome"),
                raw(4, "Taskbar", "Shell_TrayWnd", "explorer"),
                raw(5, "Start", "Windows.UI.Core.CoreWindow", "StartMenuExperienceHost"),
                raw(6, "Switcher", "SwitcherHost", "window-switcher"),
                raw(7, "Tray helper", "HelperClass", "helper"),
                raw(8, "main.rs - Code", "Chrome_WidgetWin_1", "Code"),
            ],
            ..Default::default()
        };
        let classifier = FakeClassifier::new(
            &[(1, D1), (2, D1), (3, D1), (4, D1), (5, D1), (6, D1), (8, D2)],
            D1,
        );
        let rules = ExclusionRules::default().excluding_self("Window-Switcher.exe");

        let snapshot = CatalogBuilder::new(&probe, &classifier, &rules).refresh();

        assert_eq!(handles(&snapshot), vec![1, 8]);
        let code = &snapshot.catalog[&WindowHandle(8)];
        assert_eq!(code.process_name, "code");
        assert_eq!(code.desktop, D2);
        assert_eq!(snapshot.current_desktop, D1);
    }

    #[test]
    fn current_desktop_is_resolved_once_per_refresh() {
        let probe = FakeProbe {
            windows: (1..=5).map(|h| raw(h, "w", "C", "app")).collect(),
            ..Default::default()
        };
        let classifier =
            FakeClassifier::new(&[(1, D1), (2, D1), (3, D2), (4, D2), (5, D2)], D2);
        let rules = ExclusionRules::default();

        CatalogBuilder::new(&probe, &classifier, &rules).refresh();

        assert_eq!(*classifier.current_calls.borrow(), 1);
    }

    #[test]
    fn icons_are_requested_only_for_survivors_and_fall_back() {
        let good_png = crate::icon::encode_rgba_png(2, 2, vec![0xFF; 16]).expect("png");
        let probe = FakeProbe {
            windows: vec![
                raw(1, "Has icon", "C", "a"),
                raw(2, "Broken icon", "C", "b"),
                raw(3, "Excluded", "Progman", "explorer"),
            ],
            icons: HashMap::from([
                (WindowHandle(1), good_png),
                (WindowHandle(2), vec![0, 1, 2]),
            ]),
            ..Default::default()
        };
        let classifier = FakeClassifier::new(&[(1, D1), (2, D1), (3, D1)], D1);
        let rules = ExclusionRules::default();

        let snapshot = CatalogBuilder::new(&probe, &classifier, &rules).refresh();

        let mut requested = probe.icon_requests.borrow().clone();
        requested.sort();
        assert_eq!(requested, vec![WindowHandle(1), WindowHandle(2)]);
        assert_eq!(snapshot.catalog[&WindowHandle(1)].icon.width(), 2);
        assert_eq!(snapshot.catalog[&WindowHandle(2)].icon, IconImage::fallback());
    }

    #[test]
    fn empty_enumeration_is_a_valid_snapshot() {
        let probe = FakeProbe::default();
        let classifier = FakeClassifier::new(&[], DesktopId::EMPTY);
        let rules = ExclusionRules::default();

        let snapshot = CatalogBuilder::new(&probe, &classifier, &rules).refresh();

        assert!(snapshot.catalog.is_empty());
        assert!(snapshot.current_desktop.is_empty());
    }

    #[test]
    fn user_rules_extend_builtins() {
        let rules = ExclusionRules::with_extra(&["MyOverlay".into()], &["Overlay.EXE".into()]);
        let overlay = raw(1, "Overlay", "myoverlay", "x");
        let helper = raw(2, "Helper", "C", "overlay");
        let tray = raw(3, "Tray", "Shell_TrayWnd", "explorer");

        assert_eq!(rules.check(&overlay, "x"), Err(Rejection::Class));
        assert_eq!(rules.check(&helper, "overlay"), Err(Rejection::Process));
        assert_eq!(rules.check(&tray, "explorer"), Err(Rejection::Class));
    }

    #[test]
    fn normalizes_process_names() {
        assert_eq!(normalize_process_name(r"C:\Program Files\App\Code.EXE"), "code");
        assert_eq!(normalize_process_name("Explorer"), "explorer");
        assert_eq!(normalize_process_name("  "), "");
    }

    #[test]
    fn parses_desktop_order_blob() {
        let first = Uuid::parse_str("a1b2c3d4-0001-0002-0304-050607080910").expect("uuid");
        let second = Uuid::from_u128(0xFEED);
        let mut blob = Vec::new();
        blob.extend_from_slice(&first.to_bytes_le());
        blob.extend_from_slice(&second.to_bytes_le());
        blob.extend_from_slice(&[0xAA; 5]);

        assert_eq!(
            parse_desktop_order(&blob),
            vec![DesktopId(first), DesktopId(second)]
        );
    }

    #[test]
    fn labels_prefer_user_names_then_ordinals() {
        let names = HashMap::from([(D2, "Work".to_string()), (D1, "  ".to_string())]);
        let labels = label_desktops(&[D1, D2], &names);

        assert_eq!(labels[&D1], "Desktop 1");
        assert_eq!(labels[&D2], "Work");
    }
}
