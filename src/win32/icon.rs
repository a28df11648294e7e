use std::{ffi::c_void, mem};

use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{HWND, LPARAM, WPARAM},
        Graphics::Gdi::{
            DeleteObject, GetDC, GetDIBits, GetObjectW, ReleaseDC, BITMAP, BITMAPINFO,
            BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, HBITMAP, HDC,
        },
        UI::{
            Shell::ExtractIconExW,
            WindowsAndMessaging::{
                CopyIcon, DestroyIcon, GetIconInfo, SendMessageTimeoutW, GCLP_HICON,
                GCLP_HICONSM, HICON, ICONINFO, ICON_BIG, ICON_SMALL, ICON_SMALL2,
                SMTO_ABORTIFHUNG, SMTO_BLOCK, WM_GETICON,
            },
        },
    },
};

use super::probe::process_path;
use crate::{
    icon::{bgra_to_rgba, encode_rgba_png},
    utility::to_wstring,
};

const GETICON_TIMEOUT_MS: u32 = 100;

/* =========================
   SCOPED GDI RESOURCES
   ========================= */

struct OwnedIcon(HICON);

impl Drop for OwnedIcon {
    fn drop(&mut self) {
        unsafe {
            let _ = DestroyIcon(self.0);
        }
    }
}

struct OwnedBitmap(HBITMAP);

impl Drop for OwnedBitmap {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = DeleteObject(self.0.into());
            }
        }
    }
}

struct ScreenDc(HDC);

impl ScreenDc {
    fn get() -> Option<Self> {
        let dc = unsafe { GetDC(None) };
        (!dc.is_invalid()).then_some(Self(dc))
    }
}

impl Drop for ScreenDc {
    fn drop(&mut self) {
        unsafe {
            let _ = ReleaseDC(None, self.0);
        }
    }
}

/* =========================
   LOOKUP
   ========================= */

/// PNG bytes of the best icon the window, its class or its executable offers.
pub fn window_icon_png(hwnd: HWND) -> Option<Vec<u8>> {
    let icon = message_icon(hwnd)
        .or_else(|| class_icon(hwnd))
        .or_else(|| executable_icon(hwnd))?;
    rasterize(&icon)
}

fn copy_icon(raw: isize) -> Option<OwnedIcon> {
    if raw == 0 {
        return None;
    }
    unsafe { CopyIcon(HICON(raw as *mut c_void)) }
        .ok()
        .map(OwnedIcon)
}

fn message_icon(hwnd: HWND) -> Option<OwnedIcon> {
    [ICON_SMALL2, ICON_SMALL, ICON_BIG].into_iter().find_map(|kind| {
        let mut result = 0usize;
        let sent = unsafe {
            SendMessageTimeoutW(
                hwnd,
                WM_GETICON,
                WPARAM(kind as usize),
                LPARAM(0),
                SMTO_ABORTIFHUNG | SMTO_BLOCK,
                GETICON_TIMEOUT_MS,
                Some(&mut result),
            )
        };
        if sent.0 == 0 {
            return None;
        }
        copy_icon(result as isize)
    })
}

#[cfg(target_pointer_width = "64")]
fn class_icon(hwnd: HWND) -> Option<OwnedIcon> {
    use windows::Win32::UI::WindowsAndMessaging::GetClassLongPtrW;

    [GCLP_HICONSM, GCLP_HICON]
        .into_iter()
        .find_map(|index| copy_icon(unsafe { GetClassLongPtrW(hwnd, index) } as isize))
}

#[cfg(not(target_pointer_width = "64"))]
fn class_icon(hwnd: HWND) -> Option<OwnedIcon> {
    use windows::Win32::UI::WindowsAndMessaging::GetClassLongW;

    [GCLP_HICONSM, GCLP_HICON]
        .into_iter()
        .find_map(|index| copy_icon(unsafe { GetClassLongW(hwnd, index) } as isize))
}

fn executable_icon(hwnd: HWND) -> Option<OwnedIcon> {
    let path = to_wstring(&process_path(hwnd)?);
    let mut large = HICON::default();
    let mut small = HICON::default();
    let extracted = unsafe {
        ExtractIconExW(
            PCWSTR(path.as_ptr()),
            0,
            Some(&mut large as *mut HICON),
            Some(&mut small as *mut HICON),
            1,
        )
    };
    if extracted == 0 || extracted == u32::MAX {
        return None;
    }

    let large = (!large.is_invalid()).then(|| OwnedIcon(large));
    let small = (!small.is_invalid()).then(|| OwnedIcon(small));
    small.or(large)
}

/* =========================
   RASTERISATION
   ========================= */

fn rasterize(icon: &OwnedIcon) -> Option<Vec<u8>> {
    let mut info = ICONINFO::default();
    unsafe { GetIconInfo(icon.0, &mut info) }.ok()?;
    let color = OwnedBitmap(info.hbmColor);
    let mask = OwnedBitmap(info.hbmMask);

    // monochrome icons have no colour plane; let the caller fall back
    if color.0.is_invalid() {
        return None;
    }

    let mut bm = BITMAP::default();
    let got = unsafe {
        GetObjectW(
            color.0.into(),
            mem::size_of::<BITMAP>() as i32,
            Some(&mut bm as *mut BITMAP as *mut c_void),
        )
    };
    if got == 0 || bm.bmWidth <= 0 || bm.bmHeight <= 0 {
        return None;
    }
    let (width, height) = (bm.bmWidth, bm.bmHeight);

    let dc = ScreenDc::get()?;
    let pixels = read_bgra(&dc, &color, width, height)?;
    let mask_pixels = read_bgra(&dc, &mask, width, height);

    let rgba = bgra_to_rgba(&pixels, mask_pixels.as_deref());
    encode_rgba_png(width as u32, height as u32, rgba)
}

fn read_bgra(dc: &ScreenDc, bitmap: &OwnedBitmap, width: i32, height: i32) -> Option<Vec<u8>> {
    if bitmap.0.is_invalid() {
        return None;
    }

    let mut bmi = BITMAPINFO {
        bmiHeader: BITMAPINFOHEADER {
            biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: width,
            biHeight: -height,
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0,
            ..Default::default()
        },
        ..Default::default()
    };

    let mut pixels = vec![0u8; width as usize * height as usize * 4];
    let lines = unsafe {
        GetDIBits(
            dc.0,
            bitmap.0,
            0,
            height as u32,
            Some(pixels.as_mut_ptr() as *mut c_void),
            &mut bmi,
            DIB_RGB_COLORS,
        )
    };
    (lines == height).then_some(pixels)
}
