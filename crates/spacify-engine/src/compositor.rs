use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader, RgbaImage};

use crate::storage::{write_unique_output, StoredOutput};

pub const OVERLAY_SCALE: f64 = 0.15;
pub const GRID_COLUMNS: u32 = 3;
pub const GRID_OFFSET_X: i64 = 50;
pub const GRID_OFFSET_Y: i64 = 100;
pub const JPEG_QUALITY: u8 = 85;
pub const COMPOSITE_PREFIX: &str = "fallback-composite";

/// A furniture image to draw; `index` is its position in the requested
/// selection, which fixes its grid cell even when earlier items are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlaySource {
    pub index: usize,
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub index: usize,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedOverlay {
    pub index: usize,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeOutput {
    pub output: StoredOutput,
    pub width: u32,
    pub height: u32,
    pub placements: Vec<Placement>,
    pub skipped: Vec<SkippedOverlay>,
}

/// Top-left corner of grid cell `index` on a `width`×`height` canvas.
pub fn grid_position(index: usize, width: u32, height: u32) -> (i64, i64) {
    let columns = GRID_COLUMNS as usize;
    let column = (index % columns) as i64;
    let row = (index / columns) as i64;
    let x = column * i64::from(width / GRID_COLUMNS) + GRID_OFFSET_X;
    let y = row * i64::from(height / GRID_COLUMNS) + GRID_OFFSET_Y;
    (x, y)
}

pub fn overlay_box(width: u32, height: u32) -> (u32, u32) {
    let scaled = |side: u32| ((f64::from(side) * OVERLAY_SCALE).floor() as u32).max(1);
    (scaled(width), scaled(height))
}

fn decode_image(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to sniff {}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode {}", path.display()))
}

/// Draws every readable overlay onto a copy of `room`. Unreadable overlays
/// are reported in the returned skip list instead of failing the render.
pub fn render_composite(
    room: &DynamicImage,
    overlays: &[OverlaySource],
) -> (RgbaImage, Vec<Placement>, Vec<SkippedOverlay>) {
    let mut canvas = room.to_rgba8();
    let (width, height) = canvas.dimensions();
    let (box_width, box_height) = overlay_box(width, height);
    let mut placements = Vec::new();
    let mut skipped = Vec::new();

    for overlay in overlays {
        let decoded = match decode_image(&overlay.path) {
            Ok(decoded) => decoded,
            Err(err) => {
                skipped.push(SkippedOverlay {
                    index: overlay.index,
                    name: overlay.name.clone(),
                    reason: format!("{err:#}"),
                });
                continue;
            }
        };
        let resized = decoded
            .resize(box_width, box_height, FilterType::Lanczos3)
            .to_rgba8();
        let (x, y) = grid_position(overlay.index, width, height);
        imageops::overlay(&mut canvas, &resized, x, y);
        placements.push(Placement {
            index: overlay.index,
            x,
            y,
            width: resized.width(),
            height: resized.height(),
        });
    }

    (canvas, placements, skipped)
}

pub fn encode_jpeg(canvas: RgbaImage) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
    encoder
        .encode_image(&DynamicImage::ImageRgb8(rgb))
        .context("JPEG encode failed")?;
    Ok(bytes)
}

/// Places the furniture thumbnails over the room photo on a fixed grid and
/// stores the result as `fallback-composite_<millis>.jpg` in `out_dir`.
pub fn create_fallback_composite(
    room_path: &Path,
    overlays: &[OverlaySource],
    out_dir: &Path,
) -> Result<CompositeOutput> {
    let room = decode_image(room_path).context("room image could not be decoded")?;
    let (canvas, placements, skipped) = render_composite(&room, overlays);
    let (width, height) = canvas.dimensions();
    let bytes = encode_jpeg(canvas)?;
    let output = write_unique_output(out_dir, COMPOSITE_PREFIX, "jpg", &bytes)?;
    Ok(CompositeOutput {
        output,
        width,
        height,
        placements,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    use super::{
        create_fallback_composite, encode_jpeg, grid_position, overlay_box, OverlaySource,
        Placement,
    };

    fn write_room(dir: &Path, width: u32, height: u32) -> anyhow::Result<PathBuf> {
        let path = dir.join("room.png");
        RgbImage::from_pixel(width, height, Rgb([240, 240, 240])).save(&path)?;
        Ok(path)
    }

    fn write_sofa(dir: &Path, name: &str) -> anyhow::Result<PathBuf> {
        let path = dir.join(name);
        RgbaImage::from_pixel(200, 100, Rgba([20, 40, 200, 255])).save(&path)?;
        Ok(path)
    }

    #[test]
    fn grid_cells_follow_selection_index() {
        assert_eq!(grid_position(0, 1920, 1080), (50, 100));
        assert_eq!(grid_position(1, 1920, 1080), (690, 100));
        assert_eq!(grid_position(2, 1920, 1080), (1330, 100));
        assert_eq!(grid_position(3, 1920, 1080), (50, 460));
        assert_eq!(grid_position(4, 1001, 1001), (383, 433));
        assert_eq!(overlay_box(1920, 1080), (288, 162));
        assert_eq!(overlay_box(3, 3), (1, 1));
    }

    #[test]
    fn composite_keeps_room_dimensions() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let room = write_room(temp.path(), 1920, 1080)?;
        let overlays = vec![
            OverlaySource {
                index: 0,
                name: "Sofa".to_string(),
                path: write_sofa(temp.path(), "sofa.png")?,
            },
            OverlaySource {
                index: 1,
                name: "Armchair".to_string(),
                path: write_sofa(temp.path(), "armchair.png")?,
            },
        ];
        let out_dir = temp.path().join("uploads");

        let composite = create_fallback_composite(&room, &overlays, &out_dir)?;
        assert_eq!((composite.width, composite.height), (1920, 1080));
        assert_eq!(
            composite.placements,
            vec![
                Placement { index: 0, x: 50, y: 100, width: 288, height: 144 },
                Placement { index: 1, x: 690, y: 100, width: 288, height: 144 },
            ]
        );
        assert!(composite.output.file_name.starts_with("fallback-composite_"));
        assert!(composite.output.file_name.ends_with(".jpg"));

        let decoded = image::open(&composite.output.path)?.to_rgb8();
        assert_eq!(decoded.dimensions(), (1920, 1080));
        let inside = decoded.get_pixel(50 + 144, 100 + 72);
        assert!(inside[2] > 150 && inside[0] < 80, "overlay pixel was {inside:?}");
        let outside = decoded.get_pixel(1900, 1060);
        assert!(outside[0] > 200, "background pixel was {outside:?}");
        Ok(())
    }

    #[test]
    fn unreadable_overlays_leave_room_untouched() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let room = write_room(temp.path(), 640, 480)?;
        let broken = temp.path().join("broken.png");
        std::fs::write(&broken, b"not an image")?;
        let overlays = vec![
            OverlaySource {
                index: 0,
                name: "Broken".to_string(),
                path: broken,
            },
            OverlaySource {
                index: 1,
                name: "Missing".to_string(),
                path: temp.path().join("missing.png"),
            },
        ];

        let composite = create_fallback_composite(&room, &overlays, temp.path())?;
        assert!(composite.placements.is_empty());
        assert_eq!(composite.skipped.len(), 2);
        assert_eq!(composite.skipped[1].name, "Missing");
        let decoded = image::open(&composite.output.path)?;
        assert_eq!((decoded.width(), decoded.height()), (640, 480));
        // Nothing drawn: the output is exactly the room re-encoded.
        let room_only = encode_jpeg(image::open(&room)?.to_rgba8())?;
        assert_eq!(std::fs::read(&composite.output.path)?, room_only);
        Ok(())
    }

    #[test]
    fn same_inputs_render_same_pixels() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let room = write_room(temp.path(), 300, 200)?;
        let overlays = vec![OverlaySource {
            index: 2,
            name: "Lamp".to_string(),
            path: write_sofa(temp.path(), "lamp.png")?,
        }];

        let first = create_fallback_composite(&room, &overlays, temp.path())?;
        let second = create_fallback_composite(&room, &overlays, temp.path())?;
        assert_ne!(first.output.path, second.output.path);
        assert_eq!(first.output.sha256, second.output.sha256);
        Ok(())
    }

    #[test]
    fn undecodable_room_is_an_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let room = temp.path().join("room.heic");
        std::fs::write(&room, b"ftypheic")?;
        let err = create_fallback_composite(&room, &[], temp.path())
            .expect_err("room decode should fail");
        assert!(format!("{err:#}").contains("room image could not be decoded"));
        Ok(())
    }
}
