//! Scannable login-code rendering.
//!
//! The login URL handed out by the auth service is rendered as a QR code
//! built from Unicode half-block characters, two code rows per terminal
//! row, so it fits a normal terminal at a scannable size.

use qrcode::QrCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("login URL is empty")]
    EmptyUrl,

    #[error("login URL has an unrecognized scheme: {0}")]
    UnsupportedScheme(String),

    #[error("QR encode: {0}")]
    Encode(#[from] qrcode::types::QrError),
}

/// Render `url` as a scannable Unicode QR code.
///
/// The URL must carry an http(s) scheme - anything else means the auth
/// service handed back something broken, and rendering it would only
/// produce a code that dead-ends on the phone.
pub fn render_scannable_code(url: &str) -> Result<String, RenderError> {
    if url.trim().is_empty() {
        return Err(RenderError::EmptyUrl);
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        let scheme = url.split(':').next().unwrap_or(url);
        return Err(RenderError::UnsupportedScheme(scheme.to_string()));
    }

    let code = QrCode::new(url)?;
    let colors = code.to_colors();
    let width = code.width();

    let mut out = String::new();

    // Two module rows per text line:
    // █ = both dark, ▀ = top dark, ▄ = bottom dark, ' ' = both light
    for y in (0..width).step_by(2) {
        for x in 0..width {
            let top = colors[y * width + x];
            let bottom = if y + 1 < width {
                colors[(y + 1) * width + x]
            } else {
                qrcode::Color::Light
            };

            let ch = match (top, bottom) {
                (qrcode::Color::Dark, qrcode::Color::Dark) => '█',
                (qrcode::Color::Dark, qrcode::Color::Light) => '▀',
                (qrcode::Color::Light, qrcode::Color::Dark) => '▄',
                (qrcode::Color::Light, qrcode::Color::Light) => ' ',
            };
            out.push(ch);
        }
        out.push('\n');
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_valid_url() {
        let rendered = render_scannable_code("https://auth.inkdesk.io/scan?s=abc123").unwrap();
        assert!(!rendered.is_empty());
        assert!(rendered.contains('█') || rendered.contains('▀'));

        // All lines the same width
        let widths: Vec<usize> = rendered.lines().map(|l| l.chars().count()).collect();
        assert!(widths.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_render_rejects_empty_url() {
        assert!(matches!(
            render_scannable_code(""),
            Err(RenderError::EmptyUrl)
        ));
        assert!(matches!(
            render_scannable_code("   "),
            Err(RenderError::EmptyUrl)
        ));
    }

    #[test]
    fn test_render_rejects_unrecognized_scheme() {
        let err = render_scannable_code("ftp://auth.inkdesk.io/scan").unwrap_err();
        match err {
            RenderError::UnsupportedScheme(scheme) => assert_eq!(scheme, "ftp"),
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(matches!(
            render_scannable_code("not a url at all"),
            Err(RenderError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_render_accepts_plain_http() {
        assert!(render_scannable_code("http://10.0.0.5:8080/scan?s=dev").is_ok());
    }
}
