use std::{fs, path::Path};

use image::{Rgba, RgbaImage};
use retouch::{
    BatchRunner, ProcessingConfig,
    config::{CollageConfig, OutputConfig, OutputFormat},
};

/// Solid `background` canvas with a centred `fg` block
fn block_image(width: u32, height: u32, block: (u32, u32), background: [u8; 4], fg: [u8; 4]) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(width, height, Rgba(background));
    let (x0, y0) = ((width - block.0) / 2, (height - block.1) / 2);
    for y in y0..y0 + block.1 {
        for x in x0..x0 + block.0 {
            img.put_pixel(x, y, Rgba(fg));
        }
    }
    img
}

const WHITE: [u8; 4] = [255, 255, 255, 255];

fn write_collage_inputs(dir: &Path) {
    block_image(100, 100, (40, 40), WHITE, [0, 0, 0, 255])
        .save(dir.join("1.png"))
        .expect("Should write input");
    block_image(80, 120, (30, 50), WHITE, [200, 0, 0, 255])
        .save(dir.join("2.png"))
        .expect("Should write input");
    RgbaImage::from_pixel(100, 100, Rgba([0, 0, 255, 255]))
        .save(dir.join("3.png"))
        .expect("Should write input");
}

fn collage_config(format: OutputFormat) -> ProcessingConfig {
    ProcessingConfig {
        background_tolerance: Some(10),
        perimeter_margin: None,
        padding_percent: Some(5.0),
        collage: CollageConfig {
            columns: None,
            ..Default::default()
        },
        output: OutputConfig {
            format,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn three_images_make_a_two_by_two_collage() {
    let input = tempfile::tempdir().expect("Should create temp dir");
    let output = tempfile::tempdir().expect("Should create temp dir");
    write_collage_inputs(input.path());

    let runner = BatchRunner::new(collage_config(OutputFormat::Jpg)).expect("Valid config");
    let summary = runner
        .run_merge(input.path(), &output.path().join("collage.png"))
        .expect("Should build collage");

    assert_eq!(summary.succeeded, 3);
    let saved = output.path().join("collage.jpg");
    assert!(saved.exists(), "Extension follows the output format");
    assert_eq!(image::guess_format(&fs::read(&saved).unwrap()).unwrap(), image::ImageFormat::Jpeg);

    // 46x46, 38x58 and an untouched 100x100 in 100x100 cells with 2px gaps
    let collage = image::open(&saved).expect("Should decode collage");
    assert_eq!((collage.width(), collage.height()), (206, 206));
}

#[test]
fn png_collage_keeps_transparency() {
    let input = tempfile::tempdir().expect("Should create temp dir");
    write_collage_inputs(input.path());

    let runner = BatchRunner::new(collage_config(OutputFormat::Png)).expect("Valid config");
    let target = input.path().join("collage.png");
    runner.run_merge(input.path(), &target).expect("Should build collage");

    let collage = image::open(&target).expect("Should decode collage").to_rgba8();
    assert_eq!(collage.dimensions(), (206, 206));
    assert_eq!(collage.get_pixel(0, 0)[3], 0, "Gaps are transparent");
    // first cell centre holds the black square
    assert_eq!(collage.get_pixel(52, 52), &Rgba([0, 0, 0, 255]));

    // the previous collage sits in the input folder and must not be merged again
    let summary = runner.run_merge(input.path(), &target).expect("Should rebuild collage");
    assert_eq!(summary.succeeded, 3);
    let again = image::open(&target).expect("Should decode collage");
    assert_eq!((again.width(), again.height()), (206, 206));
}

#[test]
fn processed_photos_are_renamed_to_the_article() {
    let input = tempfile::tempdir().expect("Should create temp dir");
    let output = tempfile::tempdir().expect("Should create temp dir");
    let grey = Rgba([128, 128, 128, 255]);
    for (name, size) in [("photo_c.jpg", (40, 60)), ("photo_a.jpg", (60, 40)), ("photo_b.jpg", (50, 50))] {
        image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(size.0, size.1, grey))
            .to_rgb8()
            .save(input.path().join(name))
            .expect("Should write input");
    }

    let config = ProcessingConfig {
        article: Some("SKU1".into()),
        ..Default::default()
    };
    let summary = BatchRunner::new(config)
        .expect("Valid config")
        .run_single(input.path(), output.path())
        .expect("Should run");
    assert_eq!(summary.succeeded, 3);
    assert!(summary.leftover_temp.is_empty());

    let mut names: Vec<String> = fs::read_dir(output.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["SKU1.jpg", "SKU1_1.jpg", "SKU1_2.jpg"]);

    let dims = |name: &str| {
        let img = image::open(output.path().join(name)).expect("Should decode output");
        (img.width(), img.height())
    };
    assert_eq!(dims("SKU1.jpg"), (60, 40));
    assert_eq!(dims("SKU1_1.jpg"), (50, 50));
    assert_eq!(dims("SKU1_2.jpg"), (40, 60));
}

#[test]
fn standalone_rename_leaves_pixels_alone() {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    for name in ["b.png", "a.png", "SKU9.png"] {
        fs::write(dir.path().join(name), name.as_bytes()).expect("Should write file");
    }

    let config = ProcessingConfig {
        article: Some("sku9".into()),
        ..Default::default()
    };
    let report = BatchRunner::new(config)
        .expect("Valid config")
        .run_rename(dir.path())
        .expect("Should rename");

    assert_eq!(report.renamed.len(), 3);
    assert_eq!(fs::read(dir.path().join("sku9.png")).unwrap(), b"SKU9.png");
    assert_eq!(fs::read(dir.path().join("sku9_1.png")).unwrap(), b"a.png");
    assert_eq!(fs::read(dir.path().join("sku9_2.png")).unwrap(), b"b.png");
}
