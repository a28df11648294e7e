use std::{cmp::Reverse, collections::HashMap};

use serde::{Deserialize, Serialize};

use crate::model::{CatalogSnapshot, DesktopId, DesktopSummary, WindowHandle, WindowRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Next,
    Previous,
}

/// Filtered, sorted projection of the last catalog snapshot plus the keyboard
/// selection state. Every mutating call re-derives all outputs before returning.
#[derive(Debug, Default)]
pub struct ViewEngine {
    snapshot: CatalogSnapshot,
    filter_text: String,
    scope: Option<DesktopId>,
    selected_index: Option<usize>,
    selected_desktop_index: Option<usize>,
    visible: Vec<WindowHandle>,
    desktops: Vec<DesktopSummary>,
}

impl ViewEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /* =========================
       OPERATIONS
       ========================= */

    /// Replaces the snapshot and drops any scope the user picked. The fresh view
    /// opens on the current desktop when it has windows, else on all desktops.
    pub fn load(&mut self, snapshot: CatalogSnapshot) {
        self.snapshot = snapshot;
        let current = self.snapshot.current_desktop;
        self.scope = (!current.is_empty()
            && self.snapshot.catalog.values().any(|r| r.desktop == current))
        .then_some(current);
        self.selected_index = None;
        self.rederive();
    }

    pub fn set_filter_text(&mut self, text: &str) {
        if self.filter_text == text {
            return;
        }
        self.filter_text = text.to_string();
        self.rederive();
    }

    pub fn set_desktop_scope(&mut self, scope: Option<DesktopId>) {
        self.scope = scope.filter(|id| !id.is_empty());
        self.rederive();
    }

    pub fn move_selection(&mut self, delta: isize) {
        let len = self.visible.len();
        if len == 0 {
            return;
        }
        let current = self.selected_index.unwrap_or(0) as isize;
        let next = current.saturating_add(delta).clamp(0, len as isize - 1);
        self.selected_index = Some(next as usize);
    }

    pub fn cycle_desktop_scope(&mut self, direction: Direction) {
        let count = self.desktops.len();
        if count == 0 {
            return;
        }
        let next = match (direction, self.selected_desktop_index) {
            (Direction::Next, Some(i)) => (i + 1) % count,
            (Direction::Next, None) => 0,
            (Direction::Previous, Some(i)) => (i + count - 1) % count,
            (Direction::Previous, None) => count - 1,
        };
        self.scope = Some(self.desktops[next].id);
        self.rederive();
    }

    /// Binary toggle between "all desktops" and the current desktop. Does nothing
    /// while unscoped if the OS could not report a current desktop.
    pub fn toggle_scope_to_current(&mut self) {
        match self.scope {
            Some(_) => self.scope = None,
            None if self.snapshot.current_desktop.is_empty() => return,
            None => self.scope = Some(self.snapshot.current_desktop),
        }
        self.rederive();
    }

    pub fn remove(&mut self, handle: WindowHandle) -> Option<WindowRecord> {
        let removed = self.snapshot.catalog.remove(&handle)?;
        self.rederive();
        Some(removed)
    }

    /* =========================
       OUTPUTS
       ========================= */

    pub fn visible(&self) -> Vec<&WindowRecord> {
        self.visible
            .iter()
            .filter_map(|h| self.snapshot.catalog.get(h))
            .collect()
    }

    pub fn desktops(&self) -> &[DesktopSummary] {
        &self.desktops
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected_index
    }

    pub fn selected(&self) -> Option<&WindowRecord> {
        self.selected_index
            .and_then(|i| self.visible.get(i))
            .and_then(|h| self.snapshot.catalog.get(h))
    }

    pub fn selected_desktop_index(&self) -> Option<usize> {
        self.selected_desktop_index
    }

    pub fn scope(&self) -> Option<DesktopId> {
        self.scope
    }

    pub fn filter_text(&self) -> &str {
        &self.filter_text
    }

    pub fn show_desktops(&self) -> bool {
        self.desktops.len() > 1
    }

    /* =========================
       DERIVATION
       ========================= */

    fn rederive(&mut self) {
        self.visible = self.derive_visible();
        self.desktops = self.derive_desktops();
        self.clamp_selection();
        self.selected_desktop_index = self
            .scope
            .and_then(|scope| self.desktops.iter().position(|d| d.id == scope));
    }

    fn derive_visible(&self) -> Vec<WindowHandle> {
        let needle = self.filter_text.to_lowercase();
        let match_all = needle.trim().is_empty();

        let mut rows: Vec<&WindowRecord> = self
            .snapshot
            .catalog
            .values()
            .filter(|r| !r.desktop.is_empty())
            .filter(|r| self.scope.map_or(true, |scope| r.desktop == scope))
            .filter(|r| {
                match_all
                    || r.title.to_lowercase().contains(&needle)
                    || r.process_name.to_lowercase().contains(&needle)
            })
            .collect();

        rows.sort_by(|a, b| a.title.cmp(&b.title).then(a.handle.cmp(&b.handle)));
        rows.into_iter().map(|r| r.handle).collect()
    }

    fn derive_desktops(&self) -> Vec<DesktopSummary> {
        let current = self.snapshot.current_desktop;
        let mut counts: HashMap<DesktopId, usize> = HashMap::new();
        for record in self.snapshot.catalog.values() {
            if !record.desktop.is_empty() {
                *counts.entry(record.desktop).or_default() += 1;
            }
        }

        let mut ordered: Vec<(DesktopId, usize)> = counts.into_iter().collect();
        ordered.sort_by_key(|(id, count)| (Reverse(*count), *id != current, *id));

        ordered
            .into_iter()
            .enumerate()
            .map(|(pos, (id, window_count))| DesktopSummary {
                id,
                label: self
                    .snapshot
                    .desktop_labels
                    .get(&id)
                    .cloned()
                    .unwrap_or_else(|| format!("Desktop {}", pos + 1)),
                window_count,
                is_current: !current.is_empty() && id == current,
            })
            .collect()
    }

    fn clamp_selection(&mut self) {
        let len = self.visible.len();
        self.selected_index = match self.selected_index {
            _ if len == 0 => None,
            None => Some(0),
            Some(i) => Some(i.min(len - 1)),
        };
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use super::*;
    use crate::icon::IconImage;

    const D1: DesktopId = DesktopId(Uuid::from_u128(1));
    const D2: DesktopId = DesktopId(Uuid::from_u128(2));
    const D3: DesktopId = DesktopId(Uuid::from_u128(3));

    fn record(handle: isize, title: &str, process: &str, desktop: DesktopId) -> WindowRecord {
        WindowRecord {
            handle: WindowHandle(handle),
            title: title.to_string(),
            process_name: process.to_string(),
            icon: IconImage::fallback(),
            desktop,
        }
    }

    fn snapshot(records: Vec<WindowRecord>, current: DesktopId) -> CatalogSnapshot {
        CatalogSnapshot {
            catalog: records.into_iter().map(|r| (r.handle, r)).collect(),
            current_desktop: current,
            desktop_labels: HashMap::new(),
        }
    }

    /// Mail, Code, Chat on D1 and Docs on D2; D1 is current.
    fn scenario_a() -> ViewEngine {
        let mut view = ViewEngine::new();
        view.load(snapshot(
            vec![
                record(10, "Mail", "outlook", D1),
                record(11, "Code", "code", D1),
                record(12, "Chat", "teams", D1),
                record(20, "Docs", "winword", D2),
            ],
            D1,
        ));
        view
    }

    fn titles(view: &ViewEngine) -> Vec<&str> {
        view.visible().iter().map(|r| r.title.as_str()).collect()
    }

    fn summary(view: &ViewEngine) -> Vec<(DesktopId, usize, bool)> {
        view.desktops()
            .iter()
            .map(|d| (d.id, d.window_count, d.is_current))
            .collect()
    }

    #[test]
    fn load_sorts_and_summarises() {
        let view = scenario_a();
        assert_eq!(titles(&view), vec!["Chat", "Code", "Mail"]);
        assert_eq!(view.scope(), Some(D1));
        assert_eq!(view.selected_desktop_index(), Some(0));
        assert_eq!(summary(&view), vec![(D1, 3, true), (D2, 1, false)]);
        assert_eq!(view.selected_index(), Some(0));
        assert!(view.show_desktops());
    }

    #[test]
    fn filter_matches_title_case_insensitively() {
        let mut view = scenario_a();
        view.set_filter_text("co");
        assert_eq!(titles(&view), vec!["Code"]);
        assert_eq!(view.selected_index(), Some(0));
    }

    #[test]
    fn filter_matches_process_name() {
        let mut view = scenario_a();
        view.set_desktop_scope(None);
        view.set_filter_text("WORD");
        assert_eq!(titles(&view), vec!["Docs"]);
    }

    #[test]
    fn whitespace_filter_matches_everything() {
        let mut view = scenario_a();
        view.set_filter_text("   ");
        assert_eq!(titles(&view), vec!["Chat", "Code", "Mail"]);
        view.set_desktop_scope(None);
        assert_eq!(view.visible().len(), 4);
    }

    #[test]
    fn scope_restricts_rows_but_not_summary() {
        let mut view = scenario_a();
        let before = summary(&view);
        view.set_desktop_scope(Some(D2));
        assert_eq!(titles(&view), vec!["Docs"]);
        assert_eq!(view.selected_index(), Some(0));
        assert_eq!(summary(&view), before);
        assert_eq!(view.selected_desktop_index(), Some(1));
    }

    #[test]
    fn move_selection_clamps_at_both_ends() {
        let mut view = scenario_a();
        view.move_selection(1);
        view.move_selection(1);
        view.move_selection(1);
        assert_eq!(view.selected_index(), Some(2));
        view.move_selection(-10);
        assert_eq!(view.selected_index(), Some(0));
    }

    #[test]
    fn move_selection_on_empty_list_is_noop() {
        let mut view = scenario_a();
        view.set_filter_text("zzz");
        view.move_selection(1);
        assert_eq!(view.selected_index(), None);
    }

    #[test]
    fn remove_updates_rows_and_counts() {
        let mut view = scenario_a();
        let removed = view.remove(WindowHandle(10));
        assert_eq!(removed.map(|r| r.title), Some("Mail".to_string()));
        assert_eq!(titles(&view), vec!["Chat", "Code"]);
        assert_eq!(summary(&view)[0], (D1, 2, true));
        assert!(view.remove(WindowHandle(10)).is_none());
    }

    #[test]
    fn remove_last_selected_row_reclamps() {
        let mut view = scenario_a();
        view.move_selection(2);
        assert_eq!(view.selected().map(|r| r.title.as_str()), Some("Mail"));
        view.remove(WindowHandle(10));
        assert_eq!(view.selected_index(), Some(1));
    }

    #[test]
    fn selection_tracks_shrinking_and_growing_lists() {
        let mut view = scenario_a();
        view.move_selection(2);
        view.set_filter_text("c");
        assert_eq!(titles(&view), vec!["Chat", "Code"]);
        assert_eq!(view.selected_index(), Some(1));
        view.set_filter_text("ma");
        assert_eq!(view.selected_index(), Some(0));
        view.set_filter_text("nothing matches");
        assert_eq!(view.selected_index(), None);
        view.set_filter_text("");
        assert_eq!(view.selected_index(), Some(0));
    }

    #[test]
    fn toggle_scope_round_trips() {
        let mut view = scenario_a();
        view.toggle_scope_to_current();
        assert_eq!(view.scope(), None);
        assert_eq!(view.visible().len(), 4);
        view.toggle_scope_to_current();
        assert_eq!(view.scope(), Some(D1));
        assert_eq!(titles(&view), vec!["Chat", "Code", "Mail"]);
    }

    #[test]
    fn toggle_clears_any_scope() {
        let mut view = scenario_a();
        view.set_desktop_scope(Some(D2));
        view.toggle_scope_to_current();
        assert_eq!(view.scope(), None);
    }

    #[test]
    fn toggle_without_current_desktop_does_nothing() {
        let mut view = ViewEngine::new();
        view.load(snapshot(vec![record(1, "A", "a", D1)], DesktopId::EMPTY));
        view.toggle_scope_to_current();
        assert_eq!(view.scope(), None);
    }

    #[test]
    fn cycle_wraps_in_both_directions() {
        let mut view = scenario_a();
        view.cycle_desktop_scope(Direction::Next);
        assert_eq!(view.scope(), Some(D2));
        view.cycle_desktop_scope(Direction::Next);
        assert_eq!(view.scope(), Some(D1));
        view.cycle_desktop_scope(Direction::Next);
        assert_eq!(view.scope(), Some(D2));

        view.set_desktop_scope(None);
        view.cycle_desktop_scope(Direction::Next);
        assert_eq!(view.scope(), Some(D1));

        view.set_desktop_scope(None);
        view.cycle_desktop_scope(Direction::Previous);
        assert_eq!(view.scope(), Some(D2));
        view.cycle_desktop_scope(Direction::Previous);
        assert_eq!(view.scope(), Some(D1));
        view.cycle_desktop_scope(Direction::Previous);
        assert_eq!(view.scope(), Some(D2));
    }

    #[test]
    fn cycle_on_empty_catalog_is_noop() {
        let mut view = ViewEngine::new();
        view.cycle_desktop_scope(Direction::Next);
        assert_eq!(view.scope(), None);
        assert_eq!(view.selected_desktop_index(), None);
    }

    #[test]
    fn load_replaces_chosen_scope_with_current_desktop() {
        let mut view = scenario_a();
        view.set_desktop_scope(Some(D2));
        view.move_selection(1);
        let again = snapshot(
            view.snapshot.catalog.values().cloned().collect(),
            D1,
        );
        view.load(again);
        assert_eq!(view.scope(), Some(D1));
        assert_eq!(view.selected_desktop_index(), Some(0));
        assert_eq!(view.selected_index(), Some(0));
    }

    #[test]
    fn load_without_windows_on_current_desktop_shows_all() {
        let mut view = ViewEngine::new();
        view.load(snapshot(
            vec![record(1, "Mail", "outlook", D1), record(2, "Docs", "winword", D2)],
            D3,
        ));
        assert_eq!(view.scope(), None);
        assert_eq!(titles(&view), vec!["Docs", "Mail"]);

        view.load(snapshot(vec![record(1, "Mail", "outlook", D1)], DesktopId::EMPTY));
        assert_eq!(view.scope(), None);
        assert_eq!(titles(&view), vec!["Mail"]);
    }

    #[test]
    fn load_is_idempotent() {
        let mut view = scenario_a();
        let first = titles(&view).into_iter().map(String::from).collect::<Vec<_>>();
        let same = view.snapshot.clone();
        view.load(same);
        assert_eq!(titles(&view), first);
        assert_eq!(view.selected_index(), Some(0));
    }

    #[test]
    fn empty_catalog_is_valid() {
        let mut view = ViewEngine::new();
        view.load(CatalogSnapshot::default());
        assert!(view.visible().is_empty());
        assert!(view.desktops().is_empty());
        assert_eq!(view.selected_index(), None);
        assert!(!view.show_desktops());
    }

    #[test]
    fn summary_orders_by_count_then_current() {
        let mut view = ViewEngine::new();
        view.load(snapshot(
            vec![
                record(1, "a", "p", D1),
                record(2, "b", "p", D2),
                record(3, "c", "p", D3),
                record(4, "d", "p", D3),
            ],
            D2,
        ));
        assert_eq!(
            summary(&view),
            vec![(D3, 2, false), (D2, 1, true), (D1, 1, false)]
        );
        let total: usize = view.desktops().iter().map(|d| d.window_count).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn labels_come_from_snapshot_or_position() {
        let mut snap = snapshot(
            vec![record(1, "a", "p", D1), record(2, "b", "p", D2), record(3, "c", "p", D2)],
            D1,
        );
        snap.desktop_labels.insert(D1, "Work".into());
        let mut view = ViewEngine::new();
        view.load(snap);

        let labels: Vec<&str> = view.desktops().iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["Desktop 1", "Work"]);
    }

    #[test]
    fn ties_in_title_break_by_handle() {
        let mut view = ViewEngine::new();
        view.load(snapshot(
            vec![
                record(9, "Same", "p", D1),
                record(3, "Same", "p", D1),
                record(5, "same", "p", D1),
            ],
            D1,
        ));
        let handles: Vec<isize> = view.visible().iter().map(|r| r.handle.0).collect();
        assert_eq!(handles, vec![3, 9, 5]);
    }

    #[test]
    fn records_without_desktop_are_never_presented() {
        let mut view = ViewEngine::new();
        view.load(snapshot(
            vec![record(1, "Ghost", "p", DesktopId::EMPTY), record(2, "Real", "p", D1)],
            D1,
        ));
        assert_eq!(titles(&view), vec!["Real"]);
        assert_eq!(summary(&view), vec![(D1, 1, true)]);
    }

    #[test]
    fn visible_list_equals_brute_force_filter() {
        let mut view = scenario_a();
        let all: Vec<WindowRecord> = view.snapshot.catalog.values().cloned().collect();

        for scope in [None, Some(D1), Some(D2)] {
            view.set_desktop_scope(scope);
            for text in ["", " ", "c", "CO", "a", "t", "docs", "xyz", "OUT"] {
                view.set_filter_text(text);
                let needle = text.to_lowercase();
                let mut expected: Vec<&str> = all
                    .iter()
                    .filter(|r| scope.map_or(true, |s| r.desktop == s))
                    .filter(|r| {
                        needle.trim().is_empty()
                            || r.title.to_lowercase().contains(&needle)
                            || r.process_name.contains(&needle)
                    })
                    .map(|r| r.title.as_str())
                    .collect();
                expected.sort();
                assert_eq!(titles(&view), expected, "scope={scope:?} text={text:?}");

                let len = expected.len();
                match view.selected_index() {
                    None => assert_eq!(len, 0),
                    Some(i) => assert!(i < len),
                }
            }
        }
    }
}
