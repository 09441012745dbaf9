//! QR code rendering for the pairing challenge.

use herald_core::error::HeraldError;

/// Generate a compact QR code for terminal display using Unicode half-block characters.
///
/// Packs two rows of modules into one line of text using `▀`, `▄`, `█`, and space.
pub fn generate_qr_terminal(qr_data: &str) -> Result<String, HeraldError> {
    use qrcode::{Color, EcLevel, QrCode};

    let code = QrCode::with_error_correction_level(qr_data.as_bytes(), EcLevel::L)
        .map_err(|e| HeraldError::Channel(format!("QR generation failed: {e}")))?;

    let width = code.width();
    let colors: Vec<Color> = code.into_colors();
    let is_dark = |row: usize, col: usize| row < width && colors[row * width + col] == Color::Dark;

    let mut out = String::with_capacity((width + 1) * width.div_ceil(2));
    for row in (0..width).step_by(2) {
        for col in 0..width {
            out.push(match (is_dark(row, col), is_dark(row + 1, col)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            });
        }
        out.push('\n');
    }

    Ok(out)
}
