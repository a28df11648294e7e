use std::{
    sync::{mpsc, Mutex, MutexGuard},
    thread::{self, JoinHandle},
};

use windows::Win32::{
    Foundation::{HINSTANCE, LPARAM, LRESULT, WPARAM},
    System::{LibraryLoader::GetModuleHandleW, Threading::GetCurrentThreadId},
    UI::{
        Input::KeyboardAndMouse::{
            GetAsyncKeyState, RegisterHotKey, UnregisterHotKey, HOT_KEY_MODIFIERS, MOD_ALT,
            MOD_CONTROL, MOD_NOREPEAT, MOD_SHIFT, MOD_WIN,
        },
        WindowsAndMessaging::{
            CallNextHookEx, GetMessageW, PeekMessageW, PostThreadMessageW, SetWindowsHookExW,
            UnhookWindowsHookEx, HC_ACTION, HHOOK, KBDLLHOOKSTRUCT, LLKHF_INJECTED, MSG,
            PM_NOREMOVE, WH_KEYBOARD_LL, WM_HOTKEY, WM_KEYDOWN, WM_QUIT, WM_SYSKEYDOWN,
        },
    },
};

use super::send_keys;
use crate::{
    error::SwitcherError,
    hotkey::{vk, Chord, ChordTracker, HotkeyStrategy, KeyEvent, Modifiers},
    info, warn,
};

const HOTKEY_ID: i32 = 0x5357;

const MODIFIER_KEYS: [u32; 8] = [
    vk::LWIN,
    vk::RWIN,
    vk::LCONTROL,
    vk::RCONTROL,
    vk::LMENU,
    vk::RMENU,
    vk::LSHIFT,
    vk::RSHIFT,
];

type Notify = Box<dyn Fn() + Send>;

struct HookState {
    tracker: ChordTracker,
    notify: Notify,
}

/// The low-level hook callback has no user pointer, so its state is global.
static HOOK_STATE: Mutex<Option<HookState>> = Mutex::new(None);

fn lock_state() -> MutexGuard<'static, Option<HookState>> {
    HOOK_STATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Running listener. Stopping unregisters the chord or removes the hook and
/// joins the listener thread.
pub struct HotkeyHandle {
    thread_id: u32,
    thread: Option<JoinHandle<()>>,
}

impl HotkeyHandle {
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        unsafe {
            let _ = PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
        if thread.join().is_err() {
            warn!("[SWITCHER][HOTKEY] Listener thread panicked");
        }
        info!("[SWITCHER][HOTKEY] Listener stopped");
    }
}

impl Drop for HotkeyHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Installed {
    Registered(Notify),
    Hooked(HHOOK),
}

impl Installed {
    fn release(self) {
        match self {
            Installed::Registered(_) => unsafe {
                let _ = UnregisterHotKey(None, HOTKEY_ID);
            },
            Installed::Hooked(hook) => {
                unsafe {
                    let _ = UnhookWindowsHookEx(hook);
                }
                *lock_state() = None;
            }
        }
    }
}

/// Starts listening for `chord`. Returns only after the OS accepted the
/// registration or hook, so a conflict surfaces here.
pub fn start<F>(
    chord: Chord,
    strategy: HotkeyStrategy,
    on_activate: F,
) -> Result<HotkeyHandle, SwitcherError>
where
    F: Fn() + Send + 'static,
{
    let (init_tx, init_rx) = mpsc::channel::<Result<u32, SwitcherError>>();
    let notify: Notify = Box::new(on_activate);

    let thread = thread::Builder::new()
        .name("hotkey-listener".into())
        .spawn(move || {
            let thread_id = unsafe { GetCurrentThreadId() };
            let mut msg = MSG::default();
            // creates the thread's message queue so WM_QUIT can be posted to it
            unsafe {
                let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
            }

            let installed = match strategy {
                HotkeyStrategy::Register => register(chord).map(|()| Installed::Registered(notify)),
                HotkeyStrategy::Hook => install_hook(chord, notify).map(Installed::Hooked),
            };
            let installed = match installed {
                Ok(installed) => installed,
                Err(e) => {
                    let _ = init_tx.send(Err(e));
                    return;
                }
            };
            let _ = init_tx.send(Ok(thread_id));

            pump(&installed);
            installed.release();
        })?;

    match init_rx.recv() {
        Ok(Ok(thread_id)) => {
            info!("[SWITCHER][HOTKEY] Listening for {} ({:?})", chord, strategy);
            Ok(HotkeyHandle {
                thread_id,
                thread: Some(thread),
            })
        }
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => {
            let _ = thread.join();
            Err(SwitcherError::HotkeyThread(
                "listener exited before reporting its state".into(),
            ))
        }
    }
}

fn pump(installed: &Installed) {
    let mut msg = MSG::default();
    while unsafe { GetMessageW(&mut msg, None, 0, 0) }.0 > 0 {
        if msg.message != WM_HOTKEY || msg.wParam.0 != HOTKEY_ID as usize {
            continue;
        }
        if let Installed::Registered(notify) = installed {
            notify();
        }
    }
}

/// Win32 error code carried inside an HRESULT, or the HRESULT itself.
fn os_code(e: &windows::core::Error) -> i32 {
    let hr = e.code().0 as u32;
    if hr & 0xFFFF_0000 == 0x8007_0000 {
        (hr & 0xFFFF) as i32
    } else {
        hr as i32
    }
}

/* =========================
   REGISTERED HOTKEY
   ========================= */

fn to_hot_key_modifiers(modifiers: Modifiers) -> HOT_KEY_MODIFIERS {
    let mut mods = MOD_NOREPEAT;
    if modifiers.contains(Modifiers::WIN) {
        mods |= MOD_WIN;
    }
    if modifiers.contains(Modifiers::CTRL) {
        mods |= MOD_CONTROL;
    }
    if modifiers.contains(Modifiers::ALT) {
        mods |= MOD_ALT;
    }
    if modifiers.contains(Modifiers::SHIFT) {
        mods |= MOD_SHIFT;
    }
    mods
}

fn register(chord: Chord) -> Result<(), SwitcherError> {
    unsafe { RegisterHotKey(None, HOTKEY_ID, to_hot_key_modifiers(chord.modifiers), chord.key) }
        .map_err(|e| SwitcherError::HotkeyRegistration {
            chord: chord.to_string(),
            code: os_code(&e),
            message: e.message(),
        })
}

/* =========================
   LOW-LEVEL KEYBOARD TAP
   ========================= */

fn install_hook(chord: Chord, notify: Notify) -> Result<HHOOK, SwitcherError> {
    {
        let mut state = lock_state();
        if state.is_some() {
            return Err(SwitcherError::HotkeyThread(
                "a keyboard hook is already installed".into(),
            ));
        }
        *state = Some(HookState {
            tracker: ChordTracker::new(chord),
            notify,
        });
    }

    let module = unsafe { GetModuleHandleW(None) }.ok().map(|h| HINSTANCE(h.0));
    match unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), module, 0) } {
        Ok(hook) => Ok(hook),
        Err(e) => {
            *lock_state() = None;
            Err(SwitcherError::HookInstall {
                code: os_code(&e),
                message: e.message(),
            })
        }
    }
}

fn held_modifier_keys() -> impl Iterator<Item = u32> {
    MODIFIER_KEYS
        .into_iter()
        .filter(|&code| unsafe { GetAsyncKeyState(code as i32) } as u16 & 0x8000 != 0)
}

/// Runs on the listener thread for every key event system-wide. Must return
/// quickly: activation is only a channel send.
unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code != HC_ACTION as i32 {
        return CallNextHookEx(None, code, wparam, lparam);
    }

    let Some(kb) = (lparam.0 as *const KBDLLHOOKSTRUCT).as_ref() else {
        return CallNextHookEx(None, code, wparam, lparam);
    };
    let event = KeyEvent {
        code: kb.vkCode,
        down: matches!(wparam.0 as u32, WM_KEYDOWN | WM_SYSKEYDOWN),
        injected: kb.flags.0 & LLKHF_INJECTED.0 != 0,
    };

    let decision = {
        let mut guard = lock_state();
        let Some(state) = guard.as_mut() else {
            return CallNextHookEx(None, code, wparam, lparam);
        };
        if state.tracker.wants_resync(&event) {
            state.tracker.resync(held_modifier_keys());
        }
        let decision = state.tracker.on_event(event);
        if decision.activate {
            (state.notify)();
        }
        decision
    };

    if decision.inject_mask {
        send_keys(&[(vk::MASK, false), (vk::MASK, true), (event.code, true)]);
        return LRESULT(1);
    }
    if decision.consume {
        return LRESULT(1);
    }
    CallNextHookEx(None, code, wparam, lparam)
}
