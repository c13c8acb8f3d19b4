//! Avatar validation, resizing and storage.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{
    AnimationDecoder, DynamicImage, Frame, Frames, ImageDecoder, ImageFormat, ImageReader, Limits, RgbaImage,
    codecs::{
        gif::{GifDecoder, GifEncoder, Repeat},
        png::PngDecoder,
        webp::WebPDecoder,
    },
    imageops::{self, FilterType},
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::AvatarConfig,
    errors::{Error, Result},
};

/// Directory, relative to the media root, that holds avatars.
pub const AVATAR_DIR: &str = "users/avatars";

/// An encoded avatar ready to be written.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

/// The largest centered `(left, top, width, height)` box of an `img_w x img_h` source that
/// has the `width:height` aspect ratio.
///
/// Cropping to this box and scaling it to `width x height` gives the same picture as scaling
/// the source to cover the target and cropping the overflow, without ever holding an
/// image larger than the source.
pub fn crop_box(width: u32, height: u32, img_w: u32, img_h: u32) -> (u32, u32, u32, u32) {
    let (width, height) = (width as u64, height as u64);

    if img_w as u64 * height > width * img_h as u64 {
        // Source is wider than the target: keep full height, trim the sides
        let box_w = (img_h as u64 * width / height).clamp(1, img_w as u64) as u32;
        ((img_w - box_w) / 2, 0, box_w, img_h)
    } else {
        let box_h = (img_w as u64 * height / width).clamp(1, img_h as u64) as u32;
        (0, (img_h - box_h) / 2, img_w, box_h)
    }
}

/// Center-crop one frame to the target aspect ratio and scale it to `width x height`.
pub fn transform_frame(frame: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let (img_w, img_h) = frame.dimensions();
    if (img_w, img_h) == (width, height) {
        return frame.clone();
    }

    let (left, top, box_w, box_h) = crop_box(width, height, img_w, img_h);
    let cropped = imageops::crop_imm(frame, left, top, box_w, box_h).to_image();
    if (box_w, box_h) == (width, height) {
        return cropped;
    }

    imageops::resize(&cropped, width, height, FilterType::Lanczos3)
}

/// Decoder limits for one upload.
fn decode_limits(config: &AvatarConfig) -> Limits {
    let mut limits = Limits::default();
    limits.max_alloc = Some(config.max_decoded_size);
    limits
}

/// Reject images whose decoded RGBA frame would exceed the configured budget.
fn check_dimensions(config: &AvatarConfig, (width, height): (u32, u32)) -> Result<()> {
    if width as u64 * height as u64 * 4 > config.max_decoded_size {
        debug!("Rejecting {width}x{height} avatar over the decode budget");
        return Err(Error::InvalidImage);
    }
    Ok(())
}

/// Extended-format WebP with the animation flag set in its `VP8X` header.
fn is_animated_webp(data: &[u8]) -> bool {
    data.len() > 20 && &data[12..16] == b"VP8X" && data[20] & 0x02 != 0
}

/// Frame iterator for the multi-frame formats: GIF, APNG and animated WebP.
///
/// Returns `None` for formats and files that can only hold a single image.
fn frames<'a>(data: &'a [u8], format: ImageFormat, config: &AvatarConfig) -> Result<Option<Frames<'a>>> {
    let invalid = |_| Error::InvalidImage;

    let frames = match format {
        ImageFormat::Gif => {
            let mut decoder = GifDecoder::new(Cursor::new(data)).map_err(invalid)?;
            check_dimensions(config, decoder.dimensions())?;
            decoder.set_limits(decode_limits(config)).map_err(invalid)?;
            decoder.into_frames()
        }
        ImageFormat::Png => {
            let mut decoder = PngDecoder::new(Cursor::new(data)).map_err(invalid)?;
            if !decoder.is_apng().map_err(invalid)? {
                return Ok(None);
            }
            check_dimensions(config, decoder.dimensions())?;
            decoder.set_limits(decode_limits(config)).map_err(invalid)?;
            decoder.apng().map_err(invalid)?.into_frames()
        }
        ImageFormat::WebP if is_animated_webp(data) => {
            let mut decoder = WebPDecoder::new(Cursor::new(data)).map_err(invalid)?;
            check_dimensions(config, decoder.dimensions())?;
            decoder.set_limits(decode_limits(config)).map_err(invalid)?;
            decoder.into_frames()
        }
        _ => return Ok(None),
    };

    Ok(Some(frames))
}

/// Validate an upload and turn it into a `width x height` avatar.
///
/// Animations keep up to `max_frames` frames and are stored as GIF; anything else becomes a
/// still WebP.
pub fn process_avatar(data: &[u8], config: &AvatarConfig) -> Result<ProcessedImage> {
    if data.len() as u64 > config.max_size {
        return Err(Error::AvatarTooBig {
            max_mb: config.max_size / (1024 * 1024),
        });
    }

    let format = image::guess_format(data).map_err(|_| Error::InvalidImage)?;

    if let Some(decoded) = frames(data, format, config)? {
        let mut transformed = Vec::new();
        for frame in decoded {
            let frame = frame.map_err(|_| Error::InvalidImage)?;
            if transformed.len() == config.max_frames {
                debug!("Dropping animation frames past {}", config.max_frames);
                break;
            }
            let delay = frame.delay();
            let buffer = transform_frame(frame.buffer(), config.width, config.height);
            transformed.push(Frame::from_parts(buffer, 0, 0, delay));
        }

        if transformed.len() > 1 {
            debug!("Processing animated avatar with {} frames", transformed.len());
            return encode_animation(transformed);
        }

        let still = transformed.pop().ok_or(Error::InvalidImage)?;
        return encode_still(still.into_buffer());
    }

    let mut reader = ImageReader::with_format(Cursor::new(data), format);
    reader.limits(decode_limits(config));
    let image = reader.decode().map_err(|_| Error::InvalidImage)?;

    encode_still(transform_frame(&image.to_rgba8(), config.width, config.height))
}

fn encode_still(image: RgbaImage) -> Result<ProcessedImage> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::WebP)
        .map_err(|e| Error::Internal {
            operation: format!("encode avatar: {e}"),
        })?;

    Ok(ProcessedImage { bytes, extension: "webp" })
}

fn encode_animation(frames: Vec<Frame>) -> Result<ProcessedImage> {
    let mut bytes = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut bytes);
        let encode_err = |e: image::ImageError| Error::Internal {
            operation: format!("encode animated avatar: {e}"),
        };
        encoder.set_repeat(Repeat::Infinite).map_err(encode_err)?;
        encoder.encode_frames(frames).map_err(encode_err)?;
    }

    Ok(ProcessedImage { bytes, extension: "gif" })
}

/// Write a processed avatar under `<media_root>/users/avatars/` and return its relative path.
pub async fn store_avatar(media_root: &Path, image: &ProcessedImage) -> Result<String> {
    let dir = media_root.join(AVATAR_DIR);
    tokio::fs::create_dir_all(&dir).await.map_err(|e| Error::Internal {
        operation: format!("create avatar directory: {e}"),
    })?;

    let relative = format!("{AVATAR_DIR}/{}.{}", Uuid::new_v4(), image.extension);
    tokio::fs::write(media_root.join(&relative), &image.bytes)
        .await
        .map_err(|e| Error::Internal {
            operation: format!("write avatar: {e}"),
        })?;

    Ok(relative)
}

/// Remove a previously stored avatar. Only paths inside the avatar directory are touched.
pub async fn remove_avatar(media_root: &Path, relative: &str) {
    let path: PathBuf = media_root.join(relative);
    if !relative.starts_with(AVATAR_DIR) || relative.contains("..") {
        warn!("Refusing to delete avatar outside of {AVATAR_DIR}: {relative}");
        return;
    }

    if let Err(e) = tokio::fs::remove_file(&path).await {
        warn!("Failed to delete old avatar {}: {e}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Delay, Rgba};

    fn avatar_config() -> AvatarConfig {
        AvatarConfig {
            max_size: 1024 * 1024,
            ..Default::default()
        }
    }

    fn encode(img: RgbaImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img).write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    fn gif(frames: &[RgbaImage]) -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut bytes);
            encoder
                .encode_frames(
                    frames
                        .iter()
                        .map(|f| Frame::from_parts(f.clone(), 0, 0, Delay::from_numer_denom_ms(100, 1))),
                )
                .unwrap();
        }
        bytes
    }

    fn riff_chunk(fourcc: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = fourcc.to_vec();
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn u24(value: u32) -> [u8; 3] {
        let [a, b, c, _] = value.to_le_bytes();
        [a, b, c]
    }

    /// Animated WebP assembled from the lossless stills `image` can encode: a `VP8X` header
    /// with the animation flag, an `ANIM` chunk and one `ANMF` chunk per frame.
    fn animated_webp(frames: &[RgbaImage]) -> Vec<u8> {
        let (w, h) = frames[0].dimensions();

        let mut vp8x = vec![0x12, 0, 0, 0];
        vp8x.extend(u24(w - 1));
        vp8x.extend(u24(h - 1));

        let mut body = b"WEBP".to_vec();
        body.extend(riff_chunk(b"VP8X", &vp8x));
        body.extend(riff_chunk(b"ANIM", &[0, 0, 0, 0, 0, 0]));

        for frame in frames {
            let still = encode(frame.clone(), ImageFormat::WebP);
            assert_eq!(&still[12..16], b"VP8L");

            let mut anmf = Vec::new();
            anmf.extend(u24(0));
            anmf.extend(u24(0));
            anmf.extend(u24(w - 1));
            anmf.extend(u24(h - 1));
            anmf.extend(u24(100));
            anmf.push(0);
            anmf.extend_from_slice(&still[12..]);
            body.extend(riff_chunk(b"ANMF", &anmf));
        }

        let mut out = b"RIFF".to_vec();
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend(body);
        out
    }

    fn gif_frames(bytes: &[u8]) -> Vec<Frame> {
        GifDecoder::new(Cursor::new(bytes))
            .unwrap()
            .into_frames()
            .collect_frames()
            .unwrap()
    }

    #[test]
    fn test_crop_box_keeps_target_aspect() {
        assert_eq!(crop_box(140, 140, 1000, 500), (250, 0, 500, 500));
        assert_eq!(crop_box(140, 140, 500, 1000), (0, 250, 500, 500));
        assert_eq!(crop_box(140, 140, 100, 100), (0, 0, 100, 100));
        assert_eq!(crop_box(200, 100, 400, 400), (0, 100, 400, 200));
    }

    #[test]
    fn test_crop_box_extreme_aspect_stays_inside_source() {
        assert_eq!(crop_box(140, 140, 1, 65_535), (0, 32_767, 1, 1));
        assert_eq!(crop_box(140, 140, 65_535, 1), (32_767, 0, 1, 1));

        for (w, h) in [(141, 1), (1, 141), (139, 5000), (3000, 139), (140, 141)] {
            let (left, top, box_w, box_h) = crop_box(140, 140, w, h);
            assert!(left + box_w <= w && top + box_h <= h, "{w}x{h}");
            assert!(box_w >= 1 && box_h >= 1);
        }
    }

    #[test]
    fn test_transform_frame_crops_to_target() {
        let frame = RgbaImage::from_pixel(300, 200, Rgba([10, 20, 30, 255]));
        assert_eq!(transform_frame(&frame, 140, 140).dimensions(), (140, 140));
        assert_eq!(transform_frame(&frame, 150, 100).dimensions(), (150, 100));

        let same = RgbaImage::from_pixel(140, 140, Rgba([1, 2, 3, 255]));
        assert_eq!(transform_frame(&same, 140, 140), same);
    }

    #[test]
    fn test_transform_frame_keeps_center() {
        // Left and right thirds red, center blue: the square crop is all blue
        let frame = RgbaImage::from_fn(300, 100, |x, _| {
            if (100..200).contains(&x) {
                Rgba([0, 0, 255, 255])
            } else {
                Rgba([255, 0, 0, 255])
            }
        });

        let out = transform_frame(&frame, 50, 50);
        assert_eq!(*out.get_pixel(25, 25), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_process_still_png_to_webp() {
        let png = encode(RgbaImage::from_pixel(320, 240, Rgba([200, 0, 0, 255])), ImageFormat::Png);

        let processed = process_avatar(&png, &avatar_config()).unwrap();
        assert_eq!(processed.extension, "webp");

        let decoded = image::load_from_memory_with_format(&processed.bytes, ImageFormat::WebP).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (140, 140));
    }

    #[test]
    fn test_process_extreme_aspect_ratio() {
        let png = encode(RgbaImage::from_pixel(1, 20_000, Rgba([0, 128, 0, 255])), ImageFormat::Png);

        let processed = process_avatar(&png, &avatar_config()).unwrap();

        let decoded = image::load_from_memory_with_format(&processed.bytes, ImageFormat::WebP).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (140, 140));
    }

    #[test]
    fn test_process_rejects_over_decode_budget() {
        let config = AvatarConfig {
            max_decoded_size: 100 * 100 * 4 - 1,
            ..avatar_config()
        };

        let png = encode(RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255])), ImageFormat::Png);
        assert!(matches!(process_avatar(&png, &config).unwrap_err(), Error::InvalidImage));

        let animated = gif(&[
            RgbaImage::from_pixel(100, 100, Rgba([255, 0, 0, 255])),
            RgbaImage::from_pixel(100, 100, Rgba([0, 0, 255, 255])),
        ]);
        assert!(matches!(process_avatar(&animated, &config).unwrap_err(), Error::InvalidImage));
    }

    #[test]
    fn test_process_animated_gif_keeps_frames() {
        let upload = gif(&[
            RgbaImage::from_pixel(200, 100, Rgba([255, 0, 0, 255])),
            RgbaImage::from_pixel(200, 100, Rgba([0, 0, 255, 255])),
        ]);

        let processed = process_avatar(&upload, &avatar_config()).unwrap();
        assert_eq!(processed.extension, "gif");

        let frames = gif_frames(&processed.bytes);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].buffer().dimensions(), (140, 140));
    }

    #[test]
    fn test_process_single_frame_gif_is_still() {
        let upload = gif(&[RgbaImage::from_pixel(200, 100, Rgba([255, 0, 0, 255]))]);

        let processed = process_avatar(&upload, &avatar_config()).unwrap();
        assert_eq!(processed.extension, "webp");
    }

    #[test]
    fn test_process_animated_webp_keeps_frames() {
        let upload = animated_webp(&[
            RgbaImage::from_pixel(200, 100, Rgba([255, 0, 0, 255])),
            RgbaImage::from_pixel(200, 100, Rgba([0, 255, 0, 255])),
            RgbaImage::from_pixel(200, 100, Rgba([0, 0, 255, 255])),
        ]);
        assert!(is_animated_webp(&upload));

        let processed = process_avatar(&upload, &avatar_config()).unwrap();
        assert_eq!(processed.extension, "gif");

        let frames = gif_frames(&processed.bytes);
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.buffer().dimensions() == (140, 140)));
    }

    #[test]
    fn test_process_caps_frame_count() {
        let config = AvatarConfig {
            max_frames: 2,
            ..avatar_config()
        };
        let upload = gif(&[
            RgbaImage::from_pixel(20, 20, Rgba([255, 0, 0, 255])),
            RgbaImage::from_pixel(20, 20, Rgba([0, 255, 0, 255])),
            RgbaImage::from_pixel(20, 20, Rgba([0, 0, 255, 255])),
        ]);

        let processed = process_avatar(&upload, &config).unwrap();
        assert_eq!(gif_frames(&processed.bytes).len(), 2);
    }

    #[test]
    fn test_still_webp_is_not_animated() {
        let webp = encode(RgbaImage::from_pixel(300, 300, Rgba([9, 9, 9, 255])), ImageFormat::WebP);
        assert!(!is_animated_webp(&webp));

        let processed = process_avatar(&webp, &avatar_config()).unwrap();
        assert_eq!(processed.extension, "webp");
    }

    #[test]
    fn test_process_rejects_large_upload() {
        let config = AvatarConfig {
            max_size: 10,
            ..avatar_config()
        };
        let err = process_avatar(&[0u8; 11], &config).unwrap_err();
        assert!(matches!(err, Error::AvatarTooBig { .. }));
    }

    #[test]
    fn test_process_rejects_non_image() {
        let err = process_avatar(b"definitely not an image", &avatar_config()).unwrap_err();
        assert!(matches!(err, Error::InvalidImage));

        // Valid magic bytes but truncated body
        let mut png = encode(RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255])), ImageFormat::Png);
        png.truncate(30);
        assert!(matches!(process_avatar(&png, &avatar_config()).unwrap_err(), Error::InvalidImage));
    }

    #[tokio::test]
    async fn test_store_and_remove_avatar() {
        let dir = tempfile::tempdir().unwrap();
        let image = ProcessedImage {
            bytes: vec![1, 2, 3],
            extension: "webp",
        };

        let relative = store_avatar(dir.path(), &image).await.unwrap();
        assert!(relative.starts_with("users/avatars/"));
        assert!(relative.ends_with(".webp"));
        assert!(dir.path().join(&relative).exists());

        remove_avatar(dir.path(), &relative).await;
        assert!(!dir.path().join(&relative).exists());
    }
}
