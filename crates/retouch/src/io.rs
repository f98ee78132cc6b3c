use std::{
    cmp::Ordering,
    collections::HashSet,
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use image::{
    ImageError, ImageFormat, ImageResult, RgbaImage,
    error::{DecodingError, ImageFormatHint},
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType, PngEncoder},
    },
};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{
    algorithms::flatten,
    config::{DecoderOptions, OutputConfig, OutputFormat},
    error::{Result, RetouchError},
};

/// Extensions picked up when scanning an input directory
pub const SUPPORTED_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "bmp", "gif", "tiff", "tif", "webp"];

const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// File name without its extension
pub fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Supported images directly inside `dir`, in natural file-name order
pub fn scan_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_supported_image(&path) {
            images.push(path);
        }
    }
    images.sort_by(|a, b| natural_path_cmp(a, b));
    debug!(dir = %dir.display(), count = images.len(), "Scanned input directory");
    Ok(images)
}

pub fn natural_path_cmp(a: &Path, b: &Path) -> Ordering {
    let name = |p: &Path| p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    natural_cmp(&name(a), &name(b))
}

/// Case-insensitive ordering where digit runs compare by numeric value,
/// so `img2` sorts before `img10`
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    alphanumeric_sort::compare_str(a.to_lowercase(), b.to_lowercase()).then_with(|| a.cmp(b))
}

/// Whether a JPEG stream ends with its end-of-image marker, ignoring zero
/// padding some writers leave behind
fn has_jpeg_eoi(bytes: &[u8]) -> bool {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    bytes[..end].ends_with(&JPEG_EOI)
}

/// Decode a file into RGBA. A JPEG without its end-of-image marker is
/// rejected unless `options.allow_truncated` is set, in which case the
/// marker is appended and whatever scanlines arrived are kept.
pub fn decode_image(path: &Path, options: &DecoderOptions) -> Result<RgbaImage> {
    let decode_err = |source: ImageError| RetouchError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let mut bytes = fs::read(path).map_err(|err| decode_err(ImageError::IoError(err)))?;
    let format = match image::guess_format(&bytes) {
        Ok(format) => format,
        Err(guess_err) => ImageFormat::from_path(path).map_err(|_| decode_err(guess_err))?,
    };

    if format == ImageFormat::Jpeg && !has_jpeg_eoi(&bytes) {
        if !options.allow_truncated {
            return Err(decode_err(ImageError::Decoding(DecodingError::new(
                ImageFormatHint::Exact(ImageFormat::Jpeg),
                "truncated JPEG: missing end-of-image marker",
            ))));
        }
        debug!(path = %path.display(), "Truncated JPEG, appending end-of-image marker");
        bytes.extend_from_slice(&JPEG_EOI);
    }

    image::load_from_memory_with_format(&bytes, format)
        .map(|image| image.to_rgba8())
        .map_err(decode_err)
}

fn write_encoded<W: Write>(image: &RgbaImage, writer: W, output: &OutputConfig) -> ImageResult<()> {
    let mut writer = BufWriter::new(writer);
    match output.format {
        OutputFormat::Jpg => {
            let rgb = flatten(image, output.background);
            let encoder = JpegEncoder::new_with_quality(&mut writer, output.quality);
            rgb.write_with_encoder(encoder)?;
        }
        OutputFormat::Png => {
            let encoder = PngEncoder::new_with_quality(&mut writer, CompressionType::Default, FilterType::Adaptive);
            image.write_with_encoder(encoder)?;
        }
    }
    writer.flush().map_err(ImageError::IoError)
}

fn staging_file(dir: &Path) -> std::io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(".retouch-").suffix(".part");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o644));
    }
    builder.tempfile_in(dir)
}

/// Encode in the configured format into a staging file next to `path`,
/// then move it into place. On failure `path` is left untouched.
pub fn save_image(image: &RgbaImage, path: &Path, output: &OutputConfig) -> Result<()> {
    let save_err = |source: ImageError| RetouchError::Save {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent)?;
            parent
        }
        None => Path::new("."),
    };

    let mut staged = staging_file(dir).map_err(|err| save_err(ImageError::IoError(err)))?;
    write_encoded(image, staged.as_file_mut(), output).map_err(save_err)?;
    staged.persist(path).map_err(|err| {
        debug!(path = %path.display(), error = %err.error, "Could not move staged output into place");
        save_err(ImageError::IoError(err.error))
    })?;
    Ok(())
}

/// `dir/stem.ext`, or `dir/stem (n).ext` with the smallest `n` not in `taken`
pub fn unique_output_path(dir: &Path, stem: &str, ext: &str, taken: &HashSet<PathBuf>) -> PathBuf {
    let candidate = dir.join(format!("{stem}.{ext}"));
    if !taken.contains(&candidate) {
        return candidate;
    }
    (1..)
        .map(|n| dir.join(format!("{stem} ({n}).{ext}")))
        .find(|path| !taken.contains(path))
        .unwrap_or(candidate)
}

/// Copy every file into `backup_dir`, returning how many copies succeeded.
/// Failures are logged and do not stop the batch.
pub fn backup_files(files: &[PathBuf], backup_dir: &Path) -> usize {
    if let Err(err) = fs::create_dir_all(backup_dir) {
        warn!(dir = %backup_dir.display(), error = %err, "Could not create backup directory");
        return 0;
    }
    files
        .iter()
        .filter(|source| {
            let Some(name) = source.file_name() else {
                return false;
            };
            match fs::copy(source, backup_dir.join(name)) {
                Ok(_) => true,
                Err(err) => {
                    warn!(file = %source.display(), error = %err, "Backup copy failed");
                    false
                }
            }
        })
        .count()
}

/// Case-insensitive path equality after canonicalisation where possible
pub fn same_path(a: &Path, b: &Path) -> bool {
    let normalise = |p: &Path| {
        let absolute = fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
        absolute.to_string_lossy().to_lowercase()
    };
    normalise(a) == normalise(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn create_test_image() -> RgbaImage {
        let mut img = RgbaImage::from_pixel(32, 24, Rgba([0, 0, 0, 0]));
        for y in 12..20 {
            for x in 16..28 {
                img.put_pixel(x, y, Rgba([200, 30, 30, 255]));
            }
        }
        img
    }

    #[test]
    fn test_natural_order() {
        let mut names = vec!["img10.jpg", "IMG2.jpg", "img1.jpg", "a.png", "B.png"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["a.png", "B.png", "img1.jpg", "IMG2.jpg", "img10.jpg"]);
        assert_eq!(natural_cmp("photo_a", "photo_b"), Ordering::Less);
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        for name in ["b10.png", "b2.JPG", "notes.txt", "c.webp"] {
            fs::write(dir.path().join(name), b"x").expect("Should write file");
        }
        fs::create_dir(dir.path().join("nested.png")).expect("Should create dir");

        let names: Vec<String> = scan_images(dir.path())
            .expect("Should scan")
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["b2.JPG", "b10.png", "c.webp"]);
    }

    #[test]
    fn test_png_save_and_decode_keep_alpha() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("out.png");
        let output = OutputConfig {
            format: OutputFormat::Png,
            ..Default::default()
        };
        save_image(&create_test_image(), &path, &output).expect("Should save");

        let decoded = decode_image(&path, &DecoderOptions::default()).expect("Should decode");
        assert_eq!(decoded, create_test_image());
    }

    #[test]
    fn test_jpeg_is_flattened_onto_background() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("out.jpg");
        save_image(&create_test_image(), &path, &OutputConfig::default()).expect("Should save");

        let decoded = decode_image(&path, &DecoderOptions::default()).expect("Should decode");
        assert_eq!(decoded.dimensions(), (32, 24));
        let corner = decoded.get_pixel(0, 0);
        assert!(corner[0] > 240 && corner[1] > 240 && corner[2] > 240, "Background is white");
        assert_eq!(corner[3], 255);
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("broken.png");
        fs::write(&path, b"definitely not an image").expect("Should write file");

        let err = decode_image(&path, &DecoderOptions::default()).unwrap_err();
        assert!(matches!(err, RetouchError::Decode { .. }));
        assert!(err.is_fatal_for_file());
    }

    fn noisy_image(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let v = ((x * 31 + y * 17) % 251) as u8;
            Rgba([v, v.wrapping_mul(3), v.wrapping_add(90), 255])
        })
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_failed_encode_keeps_existing_file() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("wide.jpg");
        fs::write(&path, b"previous contents").expect("Should write file");

        // JPEG cannot hold more than 65535 columns
        let err = save_image(&RgbaImage::new(70_000, 1), &path, &OutputConfig::default()).unwrap_err();
        assert!(matches!(err, RetouchError::Save { .. }));
        assert_eq!(fs::read(&path).unwrap(), b"previous contents");
        assert_eq!(entries(dir.path()), vec!["wide.jpg"]);
    }

    #[test]
    fn test_failed_move_leaves_no_partial_file() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("taken.png");
        fs::create_dir(&path).expect("Should create dir");
        let output = OutputConfig {
            format: OutputFormat::Png,
            ..Default::default()
        };

        let err = save_image(&create_test_image(), &path, &output).unwrap_err();
        assert!(matches!(err, RetouchError::Save { .. }));
        assert!(path.is_dir());
        assert_eq!(entries(dir.path()), vec!["taken.png"]);
    }

    #[test]
    fn test_truncated_jpeg_follows_decoder_options() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let full = dir.path().join("full.jpg");
        save_image(&noisy_image(200, 200), &full, &OutputConfig::default()).expect("Should save");
        let bytes = fs::read(&full).unwrap();
        let cut = dir.path().join("cut.jpg");
        fs::write(&cut, &bytes[..bytes.len() * 6 / 10]).expect("Should write file");

        let strict = DecoderOptions { allow_truncated: false };
        let err = decode_image(&cut, &strict).unwrap_err();
        assert!(matches!(err, RetouchError::Decode { .. }));
        assert!(decode_image(&full, &strict).is_ok());

        let lenient = DecoderOptions { allow_truncated: true };
        let decoded = decode_image(&cut, &lenient).expect("Should decode truncated JPEG");
        assert_eq!(decoded.dimensions(), (200, 200));
    }

    #[test]
    fn test_unique_output_path() {
        let dir = Path::new("/out");
        let mut taken = HashSet::new();
        assert_eq!(unique_output_path(dir, "a", "jpg", &taken), dir.join("a.jpg"));
        taken.insert(dir.join("a.jpg"));
        taken.insert(dir.join("a (1).jpg"));
        assert_eq!(unique_output_path(dir, "a", "jpg", &taken), dir.join("a (2).jpg"));
    }

    #[test]
    fn test_backup_copies_files() {
        let src = tempfile::tempdir().expect("Should create temp dir");
        let backup = tempfile::tempdir().expect("Should create temp dir");
        let file = src.path().join("one.jpg");
        fs::write(&file, b"payload").expect("Should write file");

        let copied = backup_files(&[file, src.path().join("missing.jpg")], &backup.path().join("bk"));
        assert_eq!(copied, 1);
        assert_eq!(fs::read(backup.path().join("bk/one.jpg")).expect("Should read"), b"payload");
    }
}
