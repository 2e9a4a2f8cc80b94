use araea_captcha::{CaptchaOptions, Color, ImageCaptcha, annotate};
use std::fs;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all("output")?;

    let captcha = ImageCaptcha::new(
        CaptchaOptions::new().size(200, 80).seed(42),
    )?;
    let text = "ABC123";
    let (image, boxes) = captcha.generate_with_bounding_boxes(text, &mut captcha.rng())?;

    println!("Detected {} character bounding boxes:", boxes.len());
    for (i, item) in boxes.iter().enumerate() {
        let b = item.bbox;
        let center_x = b.x + b.width / 2;
        println!(
            "  {} '{}': pos ({}, {}), size {}x{}, horizontal {:.1}%",
            i + 1,
            item.character,
            b.x,
            b.y,
            b.width,
            b.height,
            center_x as f32 / image.width() as f32 * 100.0
        );
    }

    image.save("output/captcha_original.png")?;
    annotate(&image, &boxes)?.save("output/captcha_with_boxes.png")?;
    fs::write(
        "output/captcha_boxes.json",
        serde_json::to_string_pretty(&boxes)?,
    )?;

    // 固定配色
    let colored = ImageCaptcha::new(
        CaptchaOptions::new()
            .size(250, 100)
            .background(Color::BLACK)
            .foreground(Color::rgb(255, 255, 0))
            .seed(7),
    )?;
    let (image, boxes) = colored.generate_with_bounding_boxes("COLOR", &mut colored.rng())?;
    annotate(&image, &boxes)?.save("output/color_with_boxes.png")?;

    println!("Saved captcha_original.png, captcha_with_boxes.png and color_with_boxes.png to output/");
    Ok(())
}
