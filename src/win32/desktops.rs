use std::{collections::HashMap, ffi::c_void};

use uuid::Uuid;
use windows::{
    core::{GUID, PCWSTR},
    Win32::{
        Foundation::HWND,
        System::{
            Com::{CoCreateInstance, CoInitializeEx, CoUninitialize, CLSCTX_ALL, COINIT_APARTMENTTHREADED},
            Registry::{RegGetValueW, HKEY_CURRENT_USER, REG_ROUTINE_FLAGS, RRF_RT_REG_BINARY, RRF_RT_REG_SZ},
        },
        UI::{
            Shell::{IVirtualDesktopManager, VirtualDesktopManager},
            WindowsAndMessaging::GetForegroundWindow,
        },
    },
};

use super::{hwnd, probe::visible_top_level_windows};
use crate::{
    catalog::{label_desktops, parse_desktop_order, DesktopClassifier},
    debug,
    model::{DesktopId, WindowHandle},
    utility::{from_wide, to_wstring},
};

const VIRTUAL_DESKTOPS_KEY: &str = r"Software\Microsoft\Windows\CurrentVersion\Explorer\VirtualDesktops";

/// Stand-in id used when the OS offers no virtual desktop service.
const SINGLE_DESKTOP: DesktopId = DesktopId(Uuid::from_u128(0x5357_4954_4348_4552_0000_0000_0000_0001));

/// COM apartment for the current thread, released on drop if this guard opened it.
pub struct ComApartment {
    owned: bool,
}

impl ComApartment {
    pub fn init() -> Self {
        let hr = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };
        Self { owned: hr.is_ok() }
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        if self.owned {
            unsafe { CoUninitialize() };
        }
    }
}

fn to_desktop_id(guid: GUID) -> DesktopId {
    DesktopId(Uuid::from_fields(guid.data1, guid.data2, guid.data3, &guid.data4))
}

pub struct VirtualDesktopClassifier {
    manager: IVirtualDesktopManager,
}

impl VirtualDesktopClassifier {
    /// Needs an initialised COM apartment on the calling thread.
    pub fn new() -> Result<Self, String> {
        let manager: IVirtualDesktopManager =
            unsafe { CoCreateInstance(&VirtualDesktopManager, None, CLSCTX_ALL) }
                .map_err(|e| format!("CoCreateInstance(VirtualDesktopManager) failed: {e:?}"))?;
        Ok(Self { manager })
    }

    fn desktop_of_hwnd(&self, window: HWND) -> DesktopId {
        match unsafe { self.manager.GetWindowDesktopId(window) } {
            Ok(guid) => to_desktop_id(guid),
            Err(_) => DesktopId::EMPTY,
        }
    }

    fn is_on_current(&self, window: HWND) -> bool {
        unsafe { self.manager.IsWindowOnCurrentVirtualDesktop(window) }
            .map(|b| b.as_bool())
            .unwrap_or(false)
    }
}

impl DesktopClassifier for VirtualDesktopClassifier {
    fn desktop_of(&self, handle: WindowHandle) -> DesktopId {
        self.desktop_of_hwnd(hwnd(handle))
    }

    /// The foreground window's desktop, else the first visible window the OS
    /// reports as on the current desktop.
    fn current_desktop(&self) -> DesktopId {
        let foreground = unsafe { GetForegroundWindow() };
        if !foreground.is_invalid() {
            let id = self.desktop_of_hwnd(foreground);
            if !id.is_empty() {
                return id;
            }
        }

        visible_top_level_windows()
            .into_iter()
            .filter(|&w| self.is_on_current(w))
            .map(|w| self.desktop_of_hwnd(w))
            .find(|id| !id.is_empty())
            .unwrap_or(DesktopId::EMPTY)
    }

    fn desktop_labels(&self) -> HashMap<DesktopId, String> {
        let Some(blob) = read_registry(VIRTUAL_DESKTOPS_KEY, "VirtualDesktopIDs", RRF_RT_REG_BINARY)
        else {
            debug!("[SWITCHER][DESKTOP] No desktop order in registry");
            return HashMap::new();
        };

        let order = parse_desktop_order(&blob);
        let names = order
            .iter()
            .filter_map(|id| {
                let key = format!(r"{VIRTUAL_DESKTOPS_KEY}\Desktops\{}", id.0.braced());
                let raw = read_registry(&key, "Name", RRF_RT_REG_SZ)?;
                let wide: Vec<u16> = raw
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                Some((*id, from_wide(&wide)))
            })
            .collect();

        label_desktops(&order, &names)
    }
}

/// Used when the virtual desktop service cannot be reached: every window is
/// treated as living on one desktop.
pub struct SingleDesktopClassifier;

impl DesktopClassifier for SingleDesktopClassifier {
    fn desktop_of(&self, _handle: WindowHandle) -> DesktopId {
        SINGLE_DESKTOP
    }

    fn current_desktop(&self) -> DesktopId {
        SINGLE_DESKTOP
    }
}

/// Raw bytes of a `HKCU` value of the given type, or `None` if absent.
fn read_registry(subkey: &str, value: &str, kind: REG_ROUTINE_FLAGS) -> Option<Vec<u8>> {
    let subkey = to_wstring(subkey);
    let value = to_wstring(value);

    let mut size = 0u32;
    let probe = unsafe {
        RegGetValueW(
            HKEY_CURRENT_USER,
            PCWSTR(subkey.as_ptr()),
            PCWSTR(value.as_ptr()),
            kind,
            None,
            None,
            Some(&mut size as *mut u32),
        )
    };
    if probe.is_err() || size == 0 {
        return None;
    }

    let mut buf = vec![0u8; size as usize];
    let read = unsafe {
        RegGetValueW(
            HKEY_CURRENT_USER,
            PCWSTR(subkey.as_ptr()),
            PCWSTR(value.as_ptr()),
            kind,
            None,
            Some(buf.as_mut_ptr() as *mut c_void),
            Some(&mut size as *mut u32),
        )
    };
    if read.is_err() {
        return None;
    }

    buf.truncate(size as usize);
    Some(buf)
}
