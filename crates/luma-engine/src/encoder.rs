use std::borrow::Cow;
use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use luma_contracts::VisionError;

use crate::source::{data_uri_mime, extension_of, ImageReference};

const COMPRESSION_THRESHOLD_BYTES: usize = 2 * 1024 * 1024;
const MAX_SIDE_DEFAULT: u32 = 2048;
const MAX_SIDE_PREFER_TEXT: u32 = 3072;
const JPEG_QUALITY_DEFAULT: u8 = 85;
const JPEG_QUALITY_PREFER_TEXT: u8 = 90;
/// Tiles shorter than this along the split axis carry too little detail.
const MIN_TILE_SIDE: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMime {
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl ImageMime {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::Webp),
            "image/gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Unknown extensions are sent as jpeg.
    pub fn from_path(path: &Path) -> Self {
        match extension_of(path).as_deref() {
            Some("png") => Self::Png,
            Some("webp") => Self::Webp,
            Some("gif") => Self::Gif,
            _ => Self::Jpeg,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime: ImageMime,
    pub base64: String,
}

impl EncodedImage {
    pub fn from_bytes(mime: ImageMime, bytes: &[u8]) -> Self {
        Self {
            mime,
            base64: BASE64.encode(bytes),
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime.as_str(), self.base64)
    }

    #[cfg(test)]
    pub fn decode(&self) -> Result<Vec<u8>, VisionError> {
        BASE64
            .decode(&self.base64)
            .map_err(|err| VisionError::processing(format!("invalid base64 payload: {err}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageVariant {
    Inline(EncodedImage),
    /// Caller-supplied data URI, sent exactly as given.
    DataUri(String),
    /// Fetched by the backend; never downloaded locally.
    Remote(String),
}

impl ImageVariant {
    pub fn url(&self) -> Cow<'_, str> {
        match self {
            Self::Inline(image) => Cow::Owned(image.data_url()),
            Self::DataUri(uri) | Self::Remote(uri) => Cow::Borrowed(uri),
        }
    }
}

/// Element 0 is always the whole (possibly downscaled) image; tiles follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageVariantSet {
    variants: Vec<ImageVariant>,
}

impl ImageVariantSet {
    fn single(variant: ImageVariant) -> Self {
        Self {
            variants: vec![variant],
        }
    }

    pub fn whole(&self) -> &ImageVariant {
        &self.variants[0]
    }

    pub fn tiles(&self) -> &[ImageVariant] {
        &self.variants[1..]
    }

    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub prefer_text: bool,
    pub multi_crop: bool,
    /// Upper bound on the whole set, whole image included.
    pub max_tiles: usize,
    /// No re-encoded variant may exceed this.
    pub max_size_mb: u64,
}

impl EncodeOptions {
    fn max_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }

    fn ensure_within_limit(&self, size_bytes: usize) -> Result<(), VisionError> {
        let size_bytes = size_bytes as u64;
        if size_bytes > self.max_bytes() {
            return Err(VisionError::SourceTooLarge {
                size_bytes,
                max_mb: self.max_size_mb,
            });
        }
        Ok(())
    }

    fn max_side(&self) -> u32 {
        if self.prefer_text {
            MAX_SIDE_PREFER_TEXT
        } else {
            MAX_SIDE_DEFAULT
        }
    }

    fn tiling_enabled(&self) -> bool {
        self.prefer_text && self.multi_crop && self.max_tiles >= 3
    }
}

pub fn encode(reference: &ImageReference, options: &EncodeOptions) -> Result<ImageVariantSet, VisionError> {
    match reference {
        ImageReference::DataUri(uri) => {
            let mime = data_uri_mime(uri);
            if mime.as_deref().and_then(ImageMime::from_mime).is_none() {
                return Err(VisionError::unsupported_mime(mime.as_deref()));
            }
            Ok(ImageVariantSet::single(ImageVariant::DataUri(uri.clone())))
        }
        ImageReference::RemoteUrl(url) => {
            log::info!("using remote image URL {url}");
            Ok(ImageVariantSet::single(ImageVariant::Remote(url.clone())))
        }
        ImageReference::LocalPath(path) => encode_local(path, options),
    }
}

fn encode_local(path: &Path, options: &EncodeOptions) -> Result<ImageVariantSet, VisionError> {
    let bytes = fs::read(path)
        .map_err(|err| VisionError::processing(format!("failed reading {}: {err}", path.display())))?;
    if bytes.is_empty() {
        return Err(VisionError::processing(format!("{} is empty", path.display())));
    }
    let mime = ImageMime::from_path(path);

    // Animated GIFs would lose their frames on re-encode.
    if mime == ImageMime::Gif {
        return Ok(ImageVariantSet::single(ImageVariant::Inline(
            EncodedImage::from_bytes(mime, &bytes),
        )));
    }

    let mut decoded: Option<DynamicImage> = None;
    let whole = if bytes.len() > COMPRESSION_THRESHOLD_BYTES {
        log::info!(
            "compressing large image {} ({:.2}MB)",
            path.display(),
            bytes.len() as f64 / (1024.0 * 1024.0)
        );
        let original = decode_image(&bytes, path)?;
        let original_dims = (original.width(), original.height());
        let image = downscale(original, options.max_side());
        let resized = (image.width(), image.height()) != original_dims;
        let reencoded = encode_image(&image, mime, options.prefer_text)?;
        decoded = Some(image);

        if !resized && reencoded.len() >= bytes.len() {
            log::debug!(
                "re-encoding {} did not shrink it, keeping the original bytes",
                path.display()
            );
            options.ensure_within_limit(bytes.len())?;
            EncodedImage::from_bytes(mime, &bytes)
        } else {
            options.ensure_within_limit(reencoded.len())?;
            EncodedImage::from_bytes(mime, &reencoded)
        }
    } else {
        EncodedImage::from_bytes(mime, &bytes)
    };

    let mut variants = vec![ImageVariant::Inline(whole)];
    if options.tiling_enabled() {
        let image = match decoded {
            Some(image) => image,
            None => decode_image(&bytes, path)?,
        };
        for (x, y, width, height) in tile_regions(image.width(), image.height(), options.max_tiles - 1) {
            let tile = encode_image(&image.crop_imm(x, y, width, height), mime, options.prefer_text)?;
            options.ensure_within_limit(tile.len())?;
            variants.push(ImageVariant::Inline(EncodedImage::from_bytes(mime, &tile)));
        }
        if variants.len() > 1 {
            log::info!("split {} into {} tiles", path.display(), variants.len() - 1);
        }
    }

    Ok(ImageVariantSet { variants })
}

fn decode_image(bytes: &[u8], path: &Path) -> Result<DynamicImage, VisionError> {
    image::load_from_memory(bytes)
        .map_err(|err| VisionError::processing(format!("failed decoding {}: {err}", path.display())))
}

/// Fits the image inside `max_side` x `max_side`, preserving aspect ratio and
/// never upscaling.
fn downscale(image: DynamicImage, max_side: u32) -> DynamicImage {
    if image.width().max(image.height()) <= max_side {
        return image;
    }
    image.resize(max_side, max_side, FilterType::Triangle)
}

fn encode_image(image: &DynamicImage, mime: ImageMime, prefer_text: bool) -> Result<Vec<u8>, VisionError> {
    let mut bytes = Vec::new();
    let result = match mime {
        ImageMime::Png => {
            let compression = if prefer_text {
                CompressionType::Fast
            } else {
                CompressionType::Default
            };
            let encoder = PngEncoder::new_with_quality(&mut bytes, compression, PngFilterType::Adaptive);
            image.write_with_encoder(encoder)
        }
        ImageMime::Webp => {
            let encoder = WebPEncoder::new_lossless(&mut bytes);
            DynamicImage::ImageRgba8(image.to_rgba8()).write_with_encoder(encoder)
        }
        ImageMime::Gif => {
            return Err(VisionError::processing("gif images are never re-encoded"));
        }
        ImageMime::Jpeg => {
            let quality = if prefer_text {
                JPEG_QUALITY_PREFER_TEXT
            } else {
                JPEG_QUALITY_DEFAULT
            };
            let encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
            DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)
        }
    };
    result.map_err(|err| VisionError::processing(format!("failed encoding {}: {err}", mime.as_str())))?;
    if bytes.is_empty() {
        return Err(VisionError::processing(format!("{} encoder produced no bytes", mime.as_str())));
    }
    Ok(bytes)
}

/// Splits the image into equal strips along its longer axis. Returns
/// `(x, y, width, height)` rectangles in reading order, or nothing when fewer
/// than two strips of `MIN_TILE_SIDE` fit.
fn tile_regions(width: u32, height: u32, max_tiles: usize) -> Vec<(u32, u32, u32, u32)> {
    let longest = width.max(height);
    let count = (longest / MIN_TILE_SIDE).min(max_tiles as u32);
    if count < 2 {
        return Vec::new();
    }

    let step = longest / count;
    (0..count)
        .map(|idx| {
            let start = idx * step;
            let span = if idx + 1 == count { longest - start } else { step };
            if height >= width {
                (0, start, width, span)
            } else {
                (start, 0, span, height)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use base64::Engine as _;
    use image::codecs::jpeg::JpegEncoder;
    use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use luma_contracts::VisionError;

    use super::{encode, tile_regions, EncodeOptions, ImageMime, ImageVariant, BASE64};
    use crate::source::ImageReference;

    const PLAIN: EncodeOptions = EncodeOptions {
        prefer_text: false,
        multi_crop: true,
        max_tiles: 5,
        max_size_mb: 10,
    };
    const TEXT: EncodeOptions = EncodeOptions {
        prefer_text: true,
        multi_crop: true,
        max_tiles: 5,
        max_size_mb: 10,
    };

    // Pseudo-random pixels so PNG cannot compress the file below 2MB.
    fn noise_image(width: u32, height: u32) -> RgbImage {
        let mut state: u32 = 0x9e37_79b9;
        RgbImage::from_fn(width, height, |_, _| {
            let mut next = || {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state & 0xff) as u8
            };
            Rgb([next(), next(), next()])
        })
    }

    fn write_image(path: &Path, image: &RgbImage, format: ImageFormat) -> anyhow::Result<()> {
        DynamicImage::ImageRgb8(image.clone()).save_with_format(path, format)?;
        Ok(())
    }

    fn inline_bytes(variant: &ImageVariant) -> (ImageMime, Vec<u8>) {
        match variant {
            ImageVariant::Inline(image) => (image.mime, image.decode().unwrap()),
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn small_files_pass_through_byte_identical() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let image = RgbImage::from_pixel(64, 48, Rgb([200, 30, 30]));
        let cases = [
            ("a.png", ImageFormat::Png, ImageMime::Png),
            ("a.jpg", ImageFormat::Jpeg, ImageMime::Jpeg),
            ("a.JPEG", ImageFormat::Jpeg, ImageMime::Jpeg),
            ("a.webp", ImageFormat::WebP, ImageMime::Webp),
            ("a.gif", ImageFormat::Gif, ImageMime::Gif),
        ];
        for (name, format, mime) in cases {
            let path = temp.path().join(name);
            write_image(&path, &image, format)?;
            let source = fs::read(&path)?;

            let set = encode(&ImageReference::LocalPath(path), &PLAIN)?;
            assert_eq!(set.variant_count(), 1, "{name}");
            let (encoded_mime, bytes) = inline_bytes(set.whole());
            assert_eq!(encoded_mime, mime, "{name}");
            assert_eq!(bytes, source, "{name}");
        }
        Ok(())
    }

    #[test]
    fn large_png_is_downscaled_to_default_cap() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("wide.png");
        write_image(&path, &noise_image(2600, 1000), ImageFormat::Png)?;
        assert!(fs::metadata(&path)?.len() > 2 * 1024 * 1024);

        let set = encode(&ImageReference::LocalPath(path), &PLAIN)?;
        assert_eq!(set.variant_count(), 1);
        let (mime, bytes) = inline_bytes(set.whole());
        assert_eq!(mime, ImageMime::Png);
        let decoded = image::load_from_memory(&bytes)?;
        assert_eq!(decoded.width(), 2048);
        assert!((780..=790).contains(&decoded.height()));
        Ok(())
    }

    #[test]
    fn large_png_prefer_text_is_capped_at_text_side() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("banner.png");
        write_image(&path, &noise_image(3400, 800), ImageFormat::Png)?;

        let options = EncodeOptions {
            multi_crop: false,
            ..TEXT
        };
        let set = encode(&ImageReference::LocalPath(path), &options)?;
        let (mime, bytes) = inline_bytes(set.whole());
        assert_eq!(mime, ImageMime::Png);
        let decoded = image::load_from_memory(&bytes)?;
        assert_eq!(decoded.width(), 3072);
        assert!((718..=728).contains(&decoded.height()));
        Ok(())
    }

    #[test]
    fn large_png_prefer_text_is_not_upscaled_or_shrunk_below_text_cap() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("wide.png");
        write_image(&path, &noise_image(2600, 1000), ImageFormat::Png)?;

        let options = EncodeOptions {
            multi_crop: false,
            ..TEXT
        };
        let set = encode(&ImageReference::LocalPath(path), &options)?;
        let (mime, bytes) = inline_bytes(set.whole());
        assert_eq!(mime, ImageMime::Png);
        let decoded = image::load_from_memory(&bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (2600, 1000));
        Ok(())
    }

    #[test]
    fn large_jpeg_is_recompressed_as_jpeg() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("wide.jpg");
        let mut file = fs::File::create(&path)?;
        DynamicImage::ImageRgb8(noise_image(3000, 1000))
            .write_with_encoder(JpegEncoder::new_with_quality(&mut file, 100))?;
        drop(file);
        assert!(fs::metadata(&path)?.len() > 2 * 1024 * 1024);

        let set = encode(&ImageReference::LocalPath(path), &PLAIN)?;
        let (mime, bytes) = inline_bytes(set.whole());
        assert_eq!(mime, ImageMime::Jpeg);
        let decoded = image::load_from_memory(&bytes)?;
        assert_eq!(decoded.width(), 2048);
        Ok(())
    }

    #[test]
    fn large_webp_is_downscaled_and_stays_webp() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("wide.webp");
        write_image(&path, &noise_image(2600, 1000), ImageFormat::WebP)?;
        assert!(fs::metadata(&path)?.len() > 2 * 1024 * 1024);

        let set = encode(&ImageReference::LocalPath(path), &PLAIN)?;
        let (mime, bytes) = inline_bytes(set.whole());
        assert_eq!(mime, ImageMime::Webp);
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::WebP)?;
        assert_eq!(decoded.width(), 2048);
        Ok(())
    }

    #[test]
    fn unresized_reencode_never_grows_the_payload() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("dense.png");
        let mut file = fs::File::create(&path)?;
        DynamicImage::ImageRgb8(noise_image(1200, 1000)).write_with_encoder(
            PngEncoder::new_with_quality(&mut file, CompressionType::Best, PngFilterType::Adaptive),
        )?;
        drop(file);
        let source = fs::read(&path)?;
        assert!(source.len() > 2 * 1024 * 1024);

        let options = EncodeOptions {
            multi_crop: false,
            ..TEXT
        };
        let set = encode(&ImageReference::LocalPath(path), &options)?;
        let (mime, bytes) = inline_bytes(set.whole());
        assert_eq!(mime, ImageMime::Png);
        assert!(bytes.len() <= source.len());
        let decoded = image::load_from_memory(&bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (1200, 1000));
        Ok(())
    }

    #[test]
    fn reencoded_image_over_the_limit_is_rejected() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("wide.png");
        write_image(&path, &noise_image(2600, 1000), ImageFormat::Png)?;

        let options = EncodeOptions {
            max_size_mb: 1,
            ..PLAIN
        };
        let err = encode(&ImageReference::LocalPath(path), &options).unwrap_err();
        match err {
            VisionError::SourceTooLarge { size_bytes, max_mb } => {
                assert_eq!(max_mb, 1);
                assert!(size_bytes > 1024 * 1024);
            }
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[test]
    fn large_gif_passes_through_unresized() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("anim.gif");
        let payload = vec![7u8; 3 * 1024 * 1024];
        fs::write(&path, &payload)?;

        let set = encode(&ImageReference::LocalPath(path), &TEXT)?;
        assert_eq!(set.variant_count(), 1);
        let (mime, bytes) = inline_bytes(set.whole());
        assert_eq!(mime, ImageMime::Gif);
        assert_eq!(bytes, payload);
        Ok(())
    }

    #[test]
    fn undecodable_large_file_is_processing_failure() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("broken.png");
        fs::write(&path, vec![1u8; 2 * 1024 * 1024 + 1])?;

        let err = encode(&ImageReference::LocalPath(path), &PLAIN).unwrap_err();
        assert!(matches!(err, VisionError::ProcessingFailed { .. }), "{err}");
        Ok(())
    }

    #[test]
    fn tiling_appends_strips_after_whole_image() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("tall.png");
        let image = RgbImage::from_fn(300, 900, |_, y| Rgb([(y / 300 * 80) as u8, 0, 0]));
        write_image(&path, &image, ImageFormat::Png)?;
        let source = fs::read(&path)?;

        let options = EncodeOptions { max_tiles: 4, ..TEXT };
        let set = encode(&ImageReference::LocalPath(path), &options)?;
        assert_eq!(set.variant_count(), 4);
        assert_eq!(inline_bytes(set.whole()).1, source);
        for (idx, tile) in set.tiles().iter().enumerate() {
            let (mime, bytes) = inline_bytes(tile);
            assert_eq!(mime, ImageMime::Png);
            let decoded = image::load_from_memory(&bytes)?.to_rgb8();
            assert_eq!(decoded.dimensions(), (300, 300));
            assert_eq!(decoded.get_pixel(10, 10)[0], (idx * 80) as u8);
        }
        Ok(())
    }

    #[test]
    fn tiling_needs_prefer_text_and_multi_crop() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("tall.png");
        write_image(&path, &RgbImage::new(300, 900), ImageFormat::Png)?;
        let reference = ImageReference::LocalPath(path);

        assert_eq!(encode(&reference, &PLAIN)?.variant_count(), 1);
        let no_crop = EncodeOptions {
            multi_crop: false,
            ..TEXT
        };
        assert_eq!(encode(&reference, &no_crop)?.variant_count(), 1);
        let one_tile = EncodeOptions { max_tiles: 2, ..TEXT };
        assert_eq!(encode(&reference, &one_tile)?.variant_count(), 1);
        assert!(encode(&reference, &TEXT)?.variant_count() <= TEXT.max_tiles);
        Ok(())
    }

    #[test]
    fn data_uri_and_remote_url_pass_through() -> anyhow::Result<()> {
        let payload = BASE64.encode(b"not really a png");
        for uri in [
            format!("data:image/png;base64,{payload}"),
            format!("data:IMAGE/PNG;base64,{payload}"),
        ] {
            let set = encode(&ImageReference::DataUri(uri.clone()), &TEXT)?;
            assert_eq!(set.variant_count(), 1);
            assert_eq!(set.whole(), &ImageVariant::DataUri(uri.clone()));
            assert_eq!(set.whole().url(), uri);
        }

        let url = "https://example.com/pic.jpg".to_string();
        let set = encode(&ImageReference::RemoteUrl(url.clone()), &TEXT)?;
        assert_eq!(set.whole(), &ImageVariant::Remote(url));
        Ok(())
    }

    #[test]
    fn tile_regions_cover_the_long_axis_in_order() {
        let regions = tile_regions(1200, 400, 4);
        assert_eq!(
            regions,
            vec![(0, 0, 300, 400), (300, 0, 300, 400), (600, 0, 300, 400), (900, 0, 300, 400)]
        );
        let uneven = tile_regions(300, 1000, 3);
        assert_eq!(uneven, vec![(0, 0, 300, 333), (0, 333, 300, 333), (0, 666, 300, 334)]);
        assert!(tile_regions(400, 400, 4).is_empty());
        assert!(tile_regions(1000, 400, 1).is_empty());
    }
}
