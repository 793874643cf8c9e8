//! QR labels for device codes. The payload is the bare device code, which is
//! what the claim scanner expects to read back.

use crate::models::rows::Device;
use log::info;
use qrcode::QrCode;
use qrcode::render::{svg, unicode};
use std::fs;
use std::path::{Path, PathBuf};

/// Minimum edge of an SVG label, in pixels.
pub const LABEL_SIZE_PX: u32 = 120;

fn encode(code: &str) -> Result<QrCode, String> {
    QrCode::new(code.as_bytes()).map_err(|e| format!("cannot encode {} as QR: {}", code, e))
}

/// Half-block rendering for a terminal with a dark background.
pub fn render_terminal(code: &str) -> Result<String, String> {
    Ok(encode(code)?
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}

/// Black-on-white printable label.
pub fn render_svg(code: &str) -> Result<String, String> {
    Ok(encode(code)?
        .render::<svg::Color>()
        .min_dimensions(LABEL_SIZE_PX, LABEL_SIZE_PX)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build())
}

/// Writes `<device_code>.svg` for every device into `dir`, creating it if needed.
pub fn write_labels(dir: &Path, devices: &[Device]) -> Result<Vec<PathBuf>, String> {
    fs::create_dir_all(dir).map_err(|e| format!("cannot create {}: {}", dir.display(), e))?;
    let mut written = Vec::with_capacity(devices.len());
    for d in devices {
        let path = dir.join(format!("{}.svg", d.device_code));
        fs::write(&path, render_svg(&d.device_code)?).map_err(|e| format!("cannot write {}: {}", path.display(), e))?;
        written.push(path);
    }
    info!("{} QR label(s) written to {}", written.len(), dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn svg_labels_are_deterministic_per_code() {
        let a = render_svg("ABCD1234EFGH5678").unwrap();
        assert!(a.contains("<svg"));
        assert!(a.contains("#000000"));
        assert_eq!(a, render_svg("ABCD1234EFGH5678").unwrap());
        assert_ne!(a, render_svg("ZZZZ1234EFGH5678").unwrap());
    }

    #[test]
    fn terminal_rendering_is_a_square_block() {
        let text = render_terminal("ABCD1234EFGH5678").unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines.len() > 10);
        let width = lines[0].chars().count();
        assert!(lines.iter().all(|l| l.chars().count() == width));
    }

    #[test]
    fn labels_are_named_after_codes() {
        let dir = std::env::temp_dir().join(format!("switchhub-labels-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let devices: Vec<Device> = serde_json::from_value(json!([
            {"id": 1, "device_code": "AAAA1111BBBB2222"},
            {"id": 2, "device_code": "CCCC3333DDDD4444"},
        ]))
        .unwrap();
        let written = write_labels(&dir, &devices).unwrap();
        assert_eq!(written, vec![dir.join("AAAA1111BBBB2222.svg"), dir.join("CCCC3333DDDD4444.svg")]);
        let body = fs::read_to_string(&written[1]).unwrap();
        assert_eq!(body, render_svg("CCCC3333DDDD4444").unwrap());
        fs::remove_dir_all(&dir).unwrap();
    }
}
