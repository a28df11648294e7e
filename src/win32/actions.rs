use windows::Win32::{
    Foundation::{LPARAM, WPARAM},
    UI::WindowsAndMessaging::{
        GetWindowPlacement, IsIconic, IsWindow, PostMessageW, SetForegroundWindow, ShowWindow,
        SW_RESTORE, SW_SHOW, SW_SHOWMAXIMIZED, WINDOWPLACEMENT, WM_CLOSE,
    },
};

use super::{hwnd, send_keys};
use crate::{controller::WindowActions, debug, hotkey::vk, model::WindowHandle};

pub struct Win32Actions;

impl WindowActions for Win32Actions {
    fn focus(&self, handle: WindowHandle) -> bool {
        let window = hwnd(handle);
        unsafe {
            if IsIconic(window).as_bool() {
                let _ = ShowWindow(window, SW_RESTORE);
            } else {
                let mut placement = WINDOWPLACEMENT {
                    length: std::mem::size_of::<WINDOWPLACEMENT>() as u32,
                    ..Default::default()
                };
                let maximized = GetWindowPlacement(window, &mut placement).is_ok()
                    && placement.showCmd == SW_SHOWMAXIMIZED.0 as u32;
                let _ = ShowWindow(window, if maximized { SW_SHOWMAXIMIZED } else { SW_SHOW });
            }

            if SetForegroundWindow(window).as_bool() {
                return true;
            }

            // the foreground lock only yields to the process that sent the last input
            debug!("[SWITCHER][ACTION] Foreground refused for {}, retrying after input", handle);
            send_keys(&[(vk::MASK, false), (vk::MASK, true)]);
            SetForegroundWindow(window).as_bool()
        }
    }

    fn close(&self, handle: WindowHandle) -> bool {
        unsafe { PostMessageW(Some(hwnd(handle)), WM_CLOSE, WPARAM(0), LPARAM(0)) }.is_ok()
    }

    fn is_open(&self, handle: WindowHandle) -> bool {
        unsafe { IsWindow(Some(hwnd(handle))) }.as_bool()
    }
}
