use std::path::Path;

use windows::{
    core::{BOOL, PWSTR},
    Win32::{
        Foundation::{CloseHandle, HANDLE, HWND, LPARAM},
        System::Threading::{
            OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
            PROCESS_QUERY_LIMITED_INFORMATION,
        },
        UI::WindowsAndMessaging::{
            EnumWindows, GetClassNameW, GetWindowTextLengthW, GetWindowTextW,
            GetWindowThreadProcessId, IsWindowVisible,
        },
    },
};

use super::{handle_of, icon::window_icon_png};
use crate::{
    catalog::{RawWindow, WindowProbe},
    debug,
    model::WindowHandle,
    utility::from_wide,
};

pub struct Win32Probe;

impl WindowProbe for Win32Probe {
    fn enumerate(&self) -> Vec<RawWindow> {
        visible_top_level_windows()
            .into_iter()
            .map(|hwnd| RawWindow {
                handle: handle_of(hwnd),
                title: window_title(hwnd),
                class_name: class_name(hwnd),
                process_name: process_path(hwnd)
                    .as_deref()
                    .and_then(|p| Path::new(p).file_stem())
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            })
            .collect()
    }

    fn icon_for(&self, handle: WindowHandle) -> Option<Vec<u8>> {
        let png = window_icon_png(super::hwnd(handle));
        if png.is_none() {
            debug!("[SWITCHER][ICON] No icon for {}", handle);
        }
        png
    }
}

/// Process handle closed on drop.
struct OwnedProcess(HANDLE);

impl Drop for OwnedProcess {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

pub fn visible_top_level_windows() -> Vec<HWND> {
    unsafe extern "system" fn enum_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let Some(out) = (lparam.0 as *mut Vec<HWND>).as_mut() else {
            return BOOL(0);
        };
        if IsWindowVisible(hwnd).as_bool() {
            out.push(hwnd);
        }
        BOOL(1)
    }

    let mut windows = Vec::<HWND>::new();
    unsafe {
        let _ = EnumWindows(
            Some(enum_proc),
            LPARAM((&mut windows as *mut Vec<HWND>) as isize),
        );
    }
    windows
}

pub fn window_title(hwnd: HWND) -> String {
    unsafe {
        let len = GetWindowTextLengthW(hwnd);
        if len <= 0 {
            return String::new();
        }
        let mut buf = vec![0u16; len as usize + 1];
        let copied = GetWindowTextW(hwnd, &mut buf);
        if copied <= 0 {
            return String::new();
        }
        String::from_utf16_lossy(&buf[..copied as usize])
    }
}

pub fn class_name(hwnd: HWND) -> String {
    let mut buf = [0u16; 256];
    let copied = unsafe { GetClassNameW(hwnd, &mut buf) };
    if copied <= 0 {
        return String::new();
    }
    from_wide(&buf[..copied as usize])
}

/// Full image path of the process owning `hwnd`. `None` for protected or
/// vanished processes.
pub fn process_path(hwnd: HWND) -> Option<String> {
    let mut pid = 0u32;
    unsafe {
        GetWindowThreadProcessId(hwnd, Some(&mut pid));
    }
    if pid == 0 {
        return None;
    }

    let process = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) }
        .map(OwnedProcess)
        .ok()?;

    let mut buf = [0u16; 1024];
    let mut len = buf.len() as u32;
    unsafe {
        QueryFullProcessImageNameW(
            process.0,
            PROCESS_NAME_WIN32,
            PWSTR(buf.as_mut_ptr()),
            &mut len,
        )
    }
    .ok()?;

    Some(String::from_utf16_lossy(&buf[..len as usize]))
}
