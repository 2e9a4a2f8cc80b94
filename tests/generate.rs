#![cfg(feature = "bundled-font")]

use araea_captcha::{
    CaptchaOptions, Color, Distortion, Error, FontSet, ImageCaptcha, LayoutConfig,
    MissingGlyphPolicy, OverflowPolicy, generate, generate_with_bounding_boxes,
    glyph::render_glyph,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn undistorted(width: u32, height: u32, size: f32) -> CaptchaOptions {
    CaptchaOptions::new()
        .size(width, height)
        .font_sizes([size])
        .distortion(Distortion::none())
        .layout(LayoutConfig::fixed(0))
        .background(Color::WHITE)
        .foreground(Color::BLACK)
}

#[test]
fn default_options_produce_canvas_sized_image() {
    let captcha = ImageCaptcha::new(CaptchaOptions::default()).unwrap();
    let image = captcha.generate("1234", &mut captcha.rng()).unwrap();
    assert_eq!(image.dimensions(), (160, 60));
}

#[test]
fn one_box_per_character_in_order() {
    let captcha = ImageCaptcha::new(CaptchaOptions::new().size(200, 80)).unwrap();
    for (seed, text) in ["ABCD", "HELLO", "A1B2C3", "XyZ789", "CAPTCHA", "aabbaa", "X"]
        .into_iter()
        .enumerate()
    {
        let mut rng = ChaCha8Rng::seed_from_u64(seed as u64);
        let (image, boxes) = captcha.generate_with_bounding_boxes(text, &mut rng).unwrap();

        assert_eq!(image.dimensions(), (200, 80));
        assert_eq!(boxes.len(), text.chars().count());
        for (b, ch) in boxes.iter().zip(text.chars()) {
            assert_eq!(b.character, ch);
        }
    }
}

#[test]
fn boxes_stay_inside_canvas() {
    let captcha = ImageCaptcha::new(CaptchaOptions::default()).unwrap();
    for seed in 0..20 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let (_, boxes) = captcha.generate_with_bounding_boxes("ABCD", &mut rng).unwrap();
        for b in &boxes {
            assert!(b.bbox.right() <= 160, "seed {seed}: {b:?}");
            assert!(b.bbox.bottom() <= 60, "seed {seed}: {b:?}");
            // 默认压缩整行，每个字符都可见
            assert!(b.bbox.width > 0 && b.bbox.height > 0, "seed {seed}: {b:?}");
        }
    }
}

#[test]
fn default_options_keep_long_text_visible() {
    let captcha = ImageCaptcha::new(CaptchaOptions::default()).unwrap();
    for text in ["WMWM", "CAPTCHA"] {
        for seed in 0..20 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let (_, boxes) = captcha.generate_with_bounding_boxes(text, &mut rng).unwrap();
            assert!(
                boxes.iter().all(|b| !b.bbox.is_empty() && b.bbox.right() <= 160),
                "{text} seed {seed}: {boxes:?}"
            );
        }
    }
}

#[test]
fn same_seed_is_bit_identical() {
    let options = CaptchaOptions::new().size(220, 80).seed(1234);
    let (a, boxes_a) = generate_with_bounding_boxes("W7kQ", &options).unwrap();
    let (b, boxes_b) = generate_with_bounding_boxes("W7kQ", &options).unwrap();
    assert_eq!(a.as_raw(), b.as_raw());
    assert_eq!(boxes_a, boxes_b);

    let (c, _) = generate_with_bounding_boxes("W7kQ", &options.clone().seed(4321)).unwrap();
    assert_ne!(a.as_raw(), c.as_raw());

    let plain = generate("W7kQ", &options).unwrap();
    assert_eq!(plain.as_raw(), a.as_raw());
}

#[test]
fn undistorted_glyph_box_matches_natural_size() {
    let fonts = FontSet::load(&[]).unwrap();
    let natural = render_glyph(&fonts, 'A', 0, 40.0, MissingGlyphPolicy::Fail).unwrap();

    let options = undistorted(200, 80, 40.0);
    let captcha = ImageCaptcha::new(options).unwrap();
    let (_, boxes) = captcha
        .generate_with_bounding_boxes("A", &mut ChaCha8Rng::seed_from_u64(0))
        .unwrap();

    let b = boxes[0].bbox;
    assert!(b.width.abs_diff(natural.width) <= 2, "{b:?} vs {natural:?}");
    assert!(b.height.abs_diff(natural.height) <= 2, "{b:?}");
    assert!(b.right() <= 200 && b.bottom() <= 80);
    // 竖直居中
    assert_eq!(b.y, (80 - natural.height) / 2);
}

#[test]
fn narrow_canvas_clamps_boxes() {
    for overflow in [OverflowPolicy::Clip, OverflowPolicy::Squeeze] {
        let options = CaptchaOptions::new().size(50, 80).overflow(overflow);
        let captcha = ImageCaptcha::new(options).unwrap();
        for seed in 0..5 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let (image, boxes) = captcha
                .generate_with_bounding_boxes("ABCDEFGH", &mut rng)
                .unwrap();
            assert_eq!(image.dimensions(), (50, 80));
            assert_eq!(boxes.len(), 8);
            for b in &boxes {
                assert!(b.bbox.x + b.bbox.width <= 50, "{overflow:?}: {b:?}");
            }
        }
    }
}

#[test]
fn clip_reports_overflow_as_zero_width() {
    let options = undistorted(50, 80, 40.0).overflow(OverflowPolicy::Clip);
    let captcha = ImageCaptcha::new(options).unwrap();
    let (_, boxes) = captcha
        .generate_with_bounding_boxes("ABCDEFGH", &mut ChaCha8Rng::seed_from_u64(0))
        .unwrap();
    let last = boxes[7].bbox;
    assert_eq!((last.x, last.width), (50, 0));
}

#[test]
fn empty_text_gives_blank_canvas_and_no_boxes() {
    let captcha = ImageCaptcha::new(CaptchaOptions::default()).unwrap();
    let (image, boxes) = captcha
        .generate_with_bounding_boxes("", &mut ChaCha8Rng::seed_from_u64(0))
        .unwrap();
    assert_eq!(image.dimensions(), (160, 60));
    assert!(boxes.is_empty());
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    for options in [
        CaptchaOptions::new().size(0, 80),
        CaptchaOptions::new().font_sizes([]),
        CaptchaOptions::new().font_size_range(50.0, 20.0),
        CaptchaOptions::new().rotation(10.0, -10.0),
    ] {
        assert!(matches!(
            ImageCaptcha::new(options),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}

#[test]
fn missing_glyph_policy_is_explicit() {
    let text = "A\u{10FFFD}B";

    let strict = CaptchaOptions::new().missing_glyph(MissingGlyphPolicy::Fail);
    let captcha = ImageCaptcha::new(strict).unwrap();
    let err = captcha
        .generate(text, &mut ChaCha8Rng::seed_from_u64(0))
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedCharacter('\u{10FFFD}')));

    let lenient = undistorted(200, 80, 40.0).missing_glyph(MissingGlyphPolicy::Placeholder);
    let captcha = ImageCaptcha::new(lenient).unwrap();
    let (_, boxes) = captcha
        .generate_with_bounding_boxes(text, &mut ChaCha8Rng::seed_from_u64(0))
        .unwrap();
    assert_eq!(boxes.len(), 3);
    assert_eq!(boxes[1].character, '\u{10FFFD}');
    assert!(!boxes[1].bbox.is_empty());
}

#[test]
fn boxes_serialize_for_dataset_tools() {
    let options = undistorted(200, 80, 40.0);
    let (_, boxes) = generate_with_bounding_boxes("AB", &options).unwrap();
    let value = serde_json::to_value(&boxes).unwrap();

    let first = &value[0];
    assert_eq!(first["character"], "A");
    let bbox = first["bbox"].as_array().unwrap();
    assert_eq!(bbox.len(), 4);
    assert_eq!(bbox[0], boxes[0].bbox.x);
    assert_eq!(bbox[3], boxes[0].bbox.height);
}

#[test]
fn annotated_copy_keeps_dimensions() {
    let options = CaptchaOptions::new().seed(8);
    let (image, boxes) = generate_with_bounding_boxes("ABC123", &options).unwrap();
    let annotated = araea_captcha::annotate(&image, &boxes).unwrap();
    assert_eq!(annotated.dimensions(), image.dimensions());
    assert_ne!(annotated.as_raw(), image.as_raw());
}

#[test]
fn png_bytes_decode_to_generated_image() {
    let options = CaptchaOptions::new().seed(3);
    let captcha = ImageCaptcha::new(options.clone()).unwrap();
    let bytes = captcha.to_png("1234", &mut captcha.rng()).unwrap();

    let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
    assert_eq!(decoded, generate("1234", &options).unwrap());
}

#[test]
fn writes_png() {
    let path = std::env::temp_dir().join(format!("araea-captcha-{}.png", std::process::id()));
    let captcha = ImageCaptcha::new(CaptchaOptions::new().seed(3)).unwrap();
    captcha.write("1234", &path, &mut captcha.rng()).unwrap();

    let image = image::open(&path).unwrap();
    assert_eq!((image.width(), image.height()), (160, 60));
    std::fs::remove_file(&path).unwrap();
}
