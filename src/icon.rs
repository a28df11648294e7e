use std::{
    fmt,
    io::Cursor,
    path::Path,
    sync::{Arc, OnceLock},
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::{debug, warn};

static FALLBACK: OnceLock<IconImage> = OnceLock::new();

const GLYPH_SIZE: u32 = 16;

/// Opaque, cheaply clonable window icon. Always holds valid PNG data.
#[derive(Clone, PartialEq, Eq)]
pub struct IconImage {
    png: Arc<[u8]>,
    width: u32,
    height: u32,
}

impl fmt::Debug for IconImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IconImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.png.len())
            .finish()
    }
}

impl IconImage {
    /// Validates raw PNG bytes. Anything that does not decode is rejected so the
    /// caller can substitute the fallback.
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png).ok()?;
        Some(Self {
            width: decoded.width(),
            height: decoded.height(),
            png: Arc::from(bytes),
        })
    }

    pub fn from_bytes_or_fallback(bytes: Option<Vec<u8>>) -> Self {
        bytes.and_then(Self::from_bytes).unwrap_or_else(Self::fallback)
    }

    pub fn fallback() -> Self {
        FALLBACK.get_or_init(builtin_glyph).clone()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&*self.png)
    }
}

/// Installs a user supplied PNG as the fallback icon. Must run before the first
/// refresh; later calls are ignored.
pub fn install_fallback(path: &Path) -> bool {
    let icon = match std::fs::read(path) {
        Ok(bytes) => IconImage::from_bytes(bytes),
        Err(e) => {
            warn!("[SWITCHER][ICON] Cannot read fallback icon {}: {}", path.display(), e);
            return false;
        }
    };

    let Some(icon) = icon else {
        warn!("[SWITCHER][ICON] Fallback icon {} is not a valid PNG", path.display());
        return false;
    };

    let installed = FALLBACK.set(icon).is_ok();
    if installed {
        debug!("[SWITCHER][ICON] Fallback icon loaded from {}", path.display());
    }
    installed
}

pub fn encode_rgba_png(width: u32, height: u32, rgba: Vec<u8>) -> Option<Vec<u8>> {
    let image = RgbaImage::from_raw(width, height, rgba)?;
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .ok()?;
    Some(out)
}

/// Converts a GDI top-down BGRA buffer to RGBA. Legacy icons carry no alpha in
/// their colour plane; their transparency lives in the AND mask, where a black
/// pixel is opaque.
pub fn bgra_to_rgba(bgra: &[u8], mask: Option<&[u8]>) -> Vec<u8> {
    let has_alpha = bgra.chunks_exact(4).any(|px| px[3] != 0);
    let mut out = Vec::with_capacity(bgra.len());

    for (i, px) in bgra.chunks_exact(4).enumerate() {
        let alpha = if has_alpha {
            px[3]
        } else {
            match mask.and_then(|m| m.get(i * 4..i * 4 + 3)) {
                Some(m) if m.iter().all(|&c| c == 0) => 0xFF,
                Some(_) => 0x00,
                None => 0xFF,
            }
        };
        out.extend_from_slice(&[px[2], px[1], px[0], alpha]);
    }

    out
}

fn builtin_glyph() -> IconImage {
    let size = GLYPH_SIZE as usize;
    let mut rgba = Vec::with_capacity(size * size * 4);
    for y in 0..size {
        for x in 0..size {
            let edge = x == 1 || y == 1 || x == size - 2 || y == size - 2;
            let title_bar = y > 1 && y < 5 && x > 1 && x < size - 2;
            let inside = x > 1 && y > 1 && x < size - 2 && y < size - 2;
            let px: [u8; 4] = if edge || title_bar {
                [0x5A, 0x6B, 0x7C, 0xFF]
            } else if inside {
                [0xE6, 0xE9, 0xEC, 0xFF]
            } else {
                [0, 0, 0, 0]
            };
            rgba.extend_from_slice(&px);
        }
    }

    let png = encode_rgba_png(GLYPH_SIZE, GLYPH_SIZE, rgba).unwrap_or_default();
    IconImage {
        png: Arc::from(png),
        width: GLYPH_SIZE,
        height: GLYPH_SIZE,
    }
}
