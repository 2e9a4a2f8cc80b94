use araea_captcha::{CaptchaOptions, generate};
use std::fs;
use std::time::Instant;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    fs::create_dir_all("output")?;

    for (i, text) in ["1234", "HELLO", "A1B2C3", "XyZ789"].iter().enumerate() {
        let options = CaptchaOptions::new().size(200, 80).seed(i as u64);
        let image = generate(text, &options)?;
        let path = format!("output/basic_{}.png", text.to_lowercase());
        image.save(&path)?;
        println!("{text} -> {path}");
    }

    println!("Time elapsed: {:?}", start.elapsed());
    Ok(())
}
