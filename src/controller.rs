use std::{
    collections::HashSet,
    io::{BufRead, Write},
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::{
    debug, info,
    model::{CatalogSnapshot, DesktopId, DesktopSummary, WindowHandle, WindowRecord},
    view::{Direction, ViewEngine},
    warn,
};

/* =========================
   COLLABORATORS
   ========================= */

/// Produces a fresh snapshot. Called on a worker thread, never on the
/// controller thread.
pub trait CatalogSource: Send + Sync + 'static {
    fn refresh(&self) -> CatalogSnapshot;
}

pub trait WindowActions: Send + Sync + 'static {
    fn focus(&self, handle: WindowHandle) -> bool;
    fn close(&self, handle: WindowHandle) -> bool;
    fn is_open(&self, handle: WindowHandle) -> bool;
}

pub trait Presenter {
    fn present(&mut self, message: &PresenterMessage);
}

/* =========================
   MESSAGES
   ========================= */

/// User actions coming from the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    SetFilterText { text: String },
    MoveSelection { delta: isize },
    CycleDesktopScope { direction: Direction },
    ToggleScopeToCurrent,
    SetDesktopScope {
        #[serde(default)]
        desktop: Option<DesktopId>,
    },
    ActivateSelected,
    CloseSelected,
    Dismiss,
    Refresh,
    Quit,
}

#[derive(Debug)]
pub enum AppEvent {
    Activated,
    CatalogLoaded(CatalogSnapshot),
    WindowGone(WindowHandle),
    Intent(Intent),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowView {
    pub handle: WindowHandle,
    pub title: String,
    pub process_name: String,
    pub desktop_id: DesktopId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewSnapshot {
    pub rows: Vec<RowView>,
    pub desktops: Vec<DesktopSummary>,
    pub selected_index: Option<usize>,
    pub selected_desktop_index: Option<usize>,
    pub scope: Option<DesktopId>,
    pub filter_text: String,
    pub show_desktops: bool,
}

impl ViewSnapshot {
    pub fn capture(view: &ViewEngine, emit_icons: bool) -> Self {
        Self {
            rows: view
                .visible()
                .into_iter()
                .map(|r| RowView {
                    handle: r.handle,
                    title: r.title.clone(),
                    process_name: r.process_name.clone(),
                    desktop_id: r.desktop,
                    icon: emit_icons.then(|| r.icon.to_base64()),
                })
                .collect(),
            desktops: view.desktops().to_vec(),
            selected_index: view.selected_index(),
            selected_desktop_index: view.selected_desktop_index(),
            scope: view.scope(),
            filter_text: view.filter_text().to_string(),
            show_desktops: view.show_desktops(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PresenterMessage {
    View(ViewSnapshot),
    Show,
    Hide,
}

/// One JSON object per line.
pub struct JsonLinePresenter<W: Write> {
    out: W,
}

impl<W: Write> JsonLinePresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Presenter for JsonLinePresenter<W> {
    fn present(&mut self, message: &PresenterMessage) {
        let written = serde_json::to_writer(&mut self.out, message)
            .map_err(std::io::Error::from)
            .and_then(|_| self.out.write_all(b"\n"))
            .and_then(|_| self.out.flush());
        if let Err(e) = written {
            warn!("[SWITCHER][PRESENT] Failed to write message: {}", e);
        }
    }
}

/// Reads intents line by line until EOF, which is treated as a shutdown request.
pub fn spawn_intent_reader<R>(reader: R, tx: Sender<AppEvent>) -> std::io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("intent-reader".into())
        .spawn(move || {
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("[SWITCHER][INTENT] Input closed with error: {}", e);
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Intent>(line) {
                    Ok(intent) => {
                        if tx.send(AppEvent::Intent(intent)).is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!("[SWITCHER][INTENT] Ignoring malformed intent {:?}: {}", line, e),
                }
            }
            let _ = tx.send(AppEvent::Shutdown);
        })
}

/* =========================
   CONTROLLER
   ========================= */

#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    pub poll_interval: Duration,
    pub close_timeout: Duration,
    pub emit_icons: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            close_timeout: Duration::from_millis(5000),
            emit_icons: true,
        }
    }
}

/// Sole owner of the view state. Everything else talks to it through `AppEvent`.
pub struct Controller<S: CatalogSource, A: WindowActions, P: Presenter> {
    view: ViewEngine,
    source: Arc<S>,
    actions: Arc<A>,
    presenter: P,
    settings: ControllerSettings,
    tx: Sender<AppEvent>,
    rx: Receiver<AppEvent>,
    shown: bool,
    show_pending: bool,
    refresh_in_flight: bool,
    /// Windows removed after the running refresh may already have enumerated them.
    removed_during_refresh: HashSet<WindowHandle>,
}

impl<S: CatalogSource, A: WindowActions, P: Presenter> Controller<S, A, P> {
    pub fn new(source: S, actions: A, presenter: P, settings: ControllerSettings) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            view: ViewEngine::new(),
            source: Arc::new(source),
            actions: Arc::new(actions),
            presenter,
            settings,
            tx,
            rx,
            shown: false,
            show_pending: false,
            refresh_in_flight: false,
            removed_during_refresh: HashSet::new(),
        }
    }

    pub fn sender(&self) -> Sender<AppEvent> {
        self.tx.clone()
    }

    pub fn view(&self) -> &ViewEngine {
        &self.view
    }

    pub fn is_shown(&self) -> bool {
        self.shown
    }

    pub fn run(mut self) {
        info!("[SWITCHER] Controller loop started");
        while let Ok(event) = self.rx.recv() {
            if !self.handle(event) {
                break;
            }
        }
        info!("[SWITCHER] Controller loop stopped");
    }

    /// Applies one event. Returns false when the application should exit.
    pub fn handle(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::Activated => self.on_activated(),
            AppEvent::CatalogLoaded(snapshot) => self.on_catalog_loaded(snapshot),
            AppEvent::WindowGone(handle) => {
                if let Some(record) = self.remove(handle) {
                    info!("[SWITCHER][WATCH] window \"{}\" closed", record.title);
                    self.publish();
                }
            }
            AppEvent::Intent(intent) => return self.on_intent(intent),
            AppEvent::Shutdown => return false,
        }
        true
    }

    fn on_activated(&mut self) {
        if self.shown {
            debug!("[SWITCHER][HOTKEY] Activation ignored, already shown");
            return;
        }
        info!("[SWITCHER][HOTKEY] Activated");
        self.view.set_filter_text("");
        self.show_pending = true;
        self.request_refresh();
    }

    fn on_catalog_loaded(&mut self, mut snapshot: CatalogSnapshot) {
        self.refresh_in_flight = false;
        for handle in self.removed_during_refresh.drain() {
            if snapshot.catalog.remove(&handle).is_some() {
                debug!("[SWITCHER][CATALOG] Dropped {} closed during refresh", handle);
            }
        }
        self.view.load(snapshot);
        self.publish();
        if self.show_pending {
            self.show_pending = false;
            self.shown = true;
            self.presenter.present(&PresenterMessage::Show);
        }
    }

    fn on_intent(&mut self, intent: Intent) -> bool {
        debug!("[SWITCHER][INTENT] {:?}", intent);
        match intent {
            Intent::SetFilterText { text } => self.view.set_filter_text(&text),
            Intent::MoveSelection { delta } => self.view.move_selection(delta),
            Intent::CycleDesktopScope { direction } => self.view.cycle_desktop_scope(direction),
            Intent::ToggleScopeToCurrent => self.view.toggle_scope_to_current(),
            Intent::SetDesktopScope { desktop } => self.view.set_desktop_scope(desktop),
            Intent::ActivateSelected => {
                self.activate_selected();
                return true;
            }
            Intent::CloseSelected => {
                self.close_selected();
                return true;
            }
            Intent::Dismiss => {
                self.hide();
                return true;
            }
            Intent::Refresh => {
                self.request_refresh();
                return true;
            }
            Intent::Quit => return false,
        }
        self.publish();
        true
    }

    /// Handle and title of the selected row, if it still exists on screen.
    fn live_selection(&mut self) -> Option<(WindowHandle, String)> {
        let (handle, title) = self
            .view
            .selected()
            .map(|r| (r.handle, r.title.clone()))?;

        if self.actions.is_open(handle) {
            return Some((handle, title));
        }

        debug!("[SWITCHER][ACTION] {} \"{}\" vanished before action", handle, title);
        self.remove(handle);
        self.publish();
        None
    }

    fn activate_selected(&mut self) {
        let Some((handle, title)) = self.live_selection() else {
            return;
        };
        if self.actions.focus(handle) {
            self.hide();
        } else {
            warn!("[SWITCHER][ACTION] Failed to focus {} \"{}\"", handle, title);
        }
    }

    fn close_selected(&mut self) {
        let Some((handle, title)) = self.live_selection() else {
            return;
        };
        if self.actions.close(handle) {
            self.spawn_close_watch(handle, title);
        } else {
            warn!("[SWITCHER][ACTION] Failed to close {} \"{}\"", handle, title);
        }
    }

    fn remove(&mut self, handle: WindowHandle) -> Option<WindowRecord> {
        if self.refresh_in_flight {
            self.removed_during_refresh.insert(handle);
        }
        self.view.remove(handle)
    }

    fn hide(&mut self) {
        self.show_pending = false;
        if !self.shown {
            return;
        }
        self.shown = false;
        self.view.set_filter_text("");
        self.presenter.present(&PresenterMessage::Hide);
        self.publish();
    }

    fn publish(&mut self) {
        let snapshot = ViewSnapshot::capture(&self.view, self.settings.emit_icons);
        self.presenter.present(&PresenterMessage::View(snapshot));
    }

    /// At most one refresh runs at a time; requests made meanwhile are served
    /// by the one already running.
    fn request_refresh(&mut self) {
        if self.refresh_in_flight {
            debug!("[SWITCHER][CATALOG] Refresh already running, coalesced");
            return;
        }

        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        let spawned = thread::Builder::new()
            .name("catalog-refresh".into())
            .spawn(move || {
                let _ = tx.send(AppEvent::CatalogLoaded(source.refresh()));
            });

        match spawned {
            Ok(_) => self.refresh_in_flight = true,
            Err(e) => warn!("[SWITCHER][CATALOG] Failed to spawn refresh thread: {}", e),
        }
    }

    /// Polls liveness until the window disappears or the timeout passes. Only a
    /// confirmed disappearance produces `WindowGone`.
    fn spawn_close_watch(&self, handle: WindowHandle, title: String) {
        let actions = Arc::clone(&self.actions);
        let tx = self.tx.clone();
        let ControllerSettings {
            poll_interval,
            close_timeout,
            ..
        } = self.settings;

        let spawned = thread::Builder::new()
            .name("close-watch".into())
            .spawn(move || {
                let deadline = Instant::now() + close_timeout;
                loop {
                    if !actions.is_open(handle) {
                        let _ = tx.send(AppEvent::WindowGone(handle));
                        return;
                    }
                    if Instant::now() >= deadline {
                        debug!(
                            "[SWITCHER][WATCH] {} \"{}\" still open after {} ms",
                            handle,
                            title,
                            close_timeout.as_millis()
                        );
                        return;
                    }
                    thread::sleep(poll_interval);
                }
            });

        if let Err(e) = spawned {
            warn!("[SWITCHER][WATCH] Failed to spawn close watcher: {}", e);
        }
    }
}
