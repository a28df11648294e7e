pub mod actions;
pub mod desktops;
pub mod hotkey;
pub mod icon;
pub mod probe;

use std::{ffi::c_void, mem};

use windows::Win32::{
    Foundation::HWND,
    UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS,
        KEYEVENTF_EXTENDEDKEY, KEYEVENTF_KEYUP, VIRTUAL_KEY,
    },
};

use crate::{
    catalog::{CatalogBuilder, ExclusionRules},
    controller::CatalogSource,
    hotkey::vk,
    model::{CatalogSnapshot, WindowHandle},
    warn,
};

use self::{
    desktops::{ComApartment, SingleDesktopClassifier, VirtualDesktopClassifier},
    probe::Win32Probe,
};

pub fn hwnd(handle: WindowHandle) -> HWND {
    HWND(handle.0 as *mut c_void)
}

pub fn handle_of(hwnd: HWND) -> WindowHandle {
    WindowHandle(hwnd.0 as isize)
}

/// Injects key events in order. `true` marks a release.
pub fn send_keys(keys: &[(u32, bool)]) -> bool {
    let inputs: Vec<INPUT> = keys
        .iter()
        .map(|&(code, up)| {
            let mut flags = KEYBD_EVENT_FLAGS(0);
            if up {
                flags |= KEYEVENTF_KEYUP;
            }
            if matches!(code, vk::LWIN | vk::RWIN | vk::RCONTROL | vk::RMENU) {
                flags |= KEYEVENTF_EXTENDEDKEY;
            }
            INPUT {
                r#type: INPUT_KEYBOARD,
                Anonymous: INPUT_0 {
                    ki: KEYBDINPUT {
                        wVk: VIRTUAL_KEY(code as u16),
                        wScan: 0,
                        dwFlags: flags,
                        time: 0,
                        dwExtraInfo: 0,
                    },
                },
            }
        })
        .collect();

    let sent = unsafe { SendInput(&inputs, mem::size_of::<INPUT>() as i32) };
    sent as usize == inputs.len()
}

/// Builds a fresh catalog from live OS state. COM objects are created per
/// refresh because each refresh runs on its own worker thread.
pub struct Win32CatalogSource {
    rules: ExclusionRules,
}

impl Win32CatalogSource {
    pub fn new(rules: ExclusionRules) -> Self {
        Self { rules }
    }
}

impl CatalogSource for Win32CatalogSource {
    fn refresh(&self) -> CatalogSnapshot {
        let _apartment = ComApartment::init();
        let probe = Win32Probe;

        match VirtualDesktopClassifier::new() {
            Ok(classifier) => CatalogBuilder::new(&probe, &classifier, &self.rules).refresh(),
            Err(e) => {
                warn!("[SWITCHER][DESKTOP] Virtual desktop manager unavailable: {}", e);
                CatalogBuilder::new(&probe, &SingleDesktopClassifier, &self.rules).refresh()
            }
        }
    }
}
