//! Captcha challenges: rendering, storage and verification.

use std::io::Cursor;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::Utc;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rand::prelude::RngExt;
use rand::rng;
use sqlx::SqlitePool;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    AppState,
    api::models::captcha::CaptchaChallengeResponse,
    config::CaptchaConfig,
    db::{
        errors::DbError,
        handlers::{CaptchaChallenges, Repository},
        models::captcha_challenges::{CaptchaChallenge, CaptchaChallengeCreateDBRequest},
    },
    errors::{Error, Result},
    types::time_delta,
};

/// Characters that stay distinguishable when distorted (no I/1, O/0).
const CAPTCHA_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// 5x7 bitmaps for [`CAPTCHA_ALPHABET`], one row per byte, bit 4 leftmost.
const GLYPHS: [[u8; 7]; 32] = [
    [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11], // A
    [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E], // B
    [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E], // C
    [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E], // D
    [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F], // E
    [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10], // F
    [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F], // G
    [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11], // H
    [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C], // J
    [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11], // K
    [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F], // L
    [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11], // M
    [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11], // N
    [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10], // P
    [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D], // Q
    [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11], // R
    [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E], // S
    [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04], // T
    [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E], // U
    [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04], // V
    [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A], // W
    [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11], // X
    [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04], // Y
    [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F], // Z
    [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F], // 2
    [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E], // 3
    [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02], // 4
    [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E], // 5
    [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E], // 6
    [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08], // 7
    [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E], // 8
    [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C], // 9
];

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

/// Outcome of checking a submitted solution.
#[derive(Debug, Clone)]
pub struct CaptchaVerification {
    pub valid: bool,
    /// The stored challenge that matched, to be consumed once registration succeeds.
    /// `None` for the configured bypass response and for unknown challenges.
    pub challenge: Option<CaptchaChallenge>,
}

pub struct CaptchaService {
    db: SqlitePool,
    config: CaptchaConfig,
}

impl CaptchaService {
    pub fn new(state: &AppState) -> Self {
        Self {
            db: state.db.clone(),
            config: state.config.auth.captcha.clone(),
        }
    }

    /// Generate, store and render a new challenge. Expired challenges are pruned on the way.
    #[instrument(skip(self), err)]
    pub async fn create_challenge(&self) -> Result<CaptchaChallengeResponse> {
        let text = generate_text(self.config.length);
        let (width, height) = (self.config.width, self.config.height);

        let rendered = text.clone();
        let png = tokio::task::spawn_blocking(move || render_png(&rendered, width, height))
            .await
            .map_err(|e| Error::Internal {
                operation: format!("spawn captcha rendering task: {e}"),
            })??;

        let mut conn = self.db.acquire().await.map_err(DbError::from)?;
        let mut repo = CaptchaChallenges::new(&mut conn);

        let pruned = repo.delete_created_before(Utc::now() - time_delta(self.config.lifetime)).await?;
        if pruned > 0 {
            debug!("Pruned {pruned} expired captcha challenges");
        }

        let challenge = repo
            .create(&CaptchaChallengeCreateDBRequest {
                challenge: Uuid::new_v4(),
                response: text,
            })
            .await?;

        Ok(CaptchaChallengeResponse {
            challenge: challenge.challenge.to_string(),
            image_base64: STANDARD.encode(png),
        })
    }

    /// Check a solution: the configured bypass response always passes, otherwise the
    /// challenge must exist, match exactly and be younger than the configured lifetime.
    #[instrument(skip(self, response), err)]
    pub async fn verify(&self, challenge: &str, response: &str) -> Result<CaptchaVerification> {
        if self.config.super_response.as_deref().is_some_and(|bypass| bypass == response) {
            return Ok(CaptchaVerification {
                valid: true,
                challenge: None,
            });
        }

        let Ok(challenge) = Uuid::parse_str(challenge) else {
            return Ok(CaptchaVerification {
                valid: false,
                challenge: None,
            });
        };

        let mut conn = self.db.acquire().await.map_err(DbError::from)?;
        let stored = CaptchaChallenges::new(&mut conn).get_by_challenge(challenge).await?;

        Ok(match stored {
            Some(stored) if stored.response == response => {
                let fresh = Utc::now() - stored.date_created <= time_delta(self.config.lifetime);
                CaptchaVerification {
                    valid: fresh,
                    challenge: Some(stored),
                }
            }
            _ => CaptchaVerification {
                valid: false,
                challenge: None,
            },
        })
    }
}

/// Random captcha text drawn from [`CAPTCHA_ALPHABET`].
pub fn generate_text(length: usize) -> String {
    let mut rng = rng();
    (0..length)
        .map(|_| CAPTCHA_ALPHABET[rng.random_range(0..CAPTCHA_ALPHABET.len())] as char)
        .collect()
}

fn glyph(c: char) -> Option<&'static [u8; 7]> {
    CAPTCHA_ALPHABET.iter().position(|&a| a as char == c).map(|i| &GLYPHS[i])
}

/// Draw `text` with per-glyph jitter over noise lines and dots.
pub fn render(text: &str, width: u32, height: u32) -> RgbImage {
    let mut rng = rng();
    let mut img = RgbImage::from_pixel(width, height, Rgb([245, 245, 240]));

    let count = text.chars().count().max(1) as u32;
    let slot = width / count;
    let scale = ((slot * 7 / 10) / GLYPH_WIDTH).min((height * 6 / 10) / GLYPH_HEIGHT).max(1);
    let glyph_w = GLYPH_WIDTH * scale;
    let glyph_h = GLYPH_HEIGHT * scale;
    let jitter_x = (slot.saturating_sub(glyph_w) / 2).max(1) as i64;
    let jitter_y = (height.saturating_sub(glyph_h) / 2).max(1) as i64;

    for _ in 0..(width * height / 60) {
        let (x, y) = (rng.random_range(0..width), rng.random_range(0..height));
        img.put_pixel(x, y, random_color(&mut rng, 120, 220));
    }

    for (i, c) in text.chars().enumerate() {
        let Some(rows) = glyph(c) else { continue };
        let color = random_color(&mut rng, 10, 110);
        let origin_x = (i as u32 * slot) as i64 + (slot.saturating_sub(glyph_w) / 2) as i64 + rng.random_range(-jitter_x / 2..=jitter_x / 2);
        let origin_y = (height.saturating_sub(glyph_h) / 2) as i64 + rng.random_range(-jitter_y / 2..=jitter_y / 2);
        // Italic-style shear per glyph
        let shear = rng.random_range(-2i64..=2);

        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (0x10 >> col) == 0 {
                    continue;
                }
                let offset = shear * (GLYPH_HEIGHT as i64 - row as i64) * scale as i64 / 4;
                let x0 = origin_x + (col * scale) as i64 + offset;
                let y0 = origin_y + (row as u32 * scale) as i64;
                fill_rect(&mut img, x0, y0, scale, color);
            }
        }
    }

    for _ in 0..6 {
        let from = (rng.random_range(0..width) as i64, rng.random_range(0..height) as i64);
        let to = (rng.random_range(0..width) as i64, rng.random_range(0..height) as i64);
        let color = random_color(&mut rng, 40, 160);
        draw_line(&mut img, from, to, color);
    }

    img
}

fn render_png(text: &str, width: u32, height: u32) -> Result<Vec<u8>> {
    let mut png = Vec::new();
    DynamicImage::ImageRgb8(render(text, width, height))
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| Error::Internal {
            operation: format!("encode captcha image: {e}"),
        })?;
    Ok(png)
}

fn random_color(rng: &mut impl RngExt, low: u8, high: u8) -> Rgb<u8> {
    Rgb([rng.random_range(low..=high), rng.random_range(low..=high), rng.random_range(low..=high)])
}

fn fill_rect(img: &mut RgbImage, x0: i64, y0: i64, size: u32, color: Rgb<u8>) {
    for dy in 0..size as i64 {
        for dx in 0..size as i64 {
            let (x, y) = (x0 + dx, y0 + dy);
            if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
                img.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

fn draw_line(img: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    let steps = (to.0 - from.0).abs().max((to.1 - from.1).abs()).max(1);
    for step in 0..=steps {
        let x = from.0 + (to.0 - from.0) * step / steps;
        let y = from.1 + (to.1 - from.1) * step / steps;
        fill_rect(img, x, y, 2, color);
    }
}
