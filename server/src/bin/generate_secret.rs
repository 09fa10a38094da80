use base64::{engine::general_purpose::STANDARD, Engine as _};
use color_eyre::eyre::Result;
use rand::RngCore as _;

fn main() -> Result<()> {
    color_eyre::install()?;

    let mut secret = [0u8; 64];
    rand::rngs::OsRng.fill_bytes(&mut secret);
    let secret = STANDARD.encode(secret);

    println!("Generated token signing secret:");
    println!("{secret}");
    println!();
    println!("Use it as the JWT_SEC environment variable, for example in .env:");
    println!("JWT_SEC=\"{secret}\"");

    Ok(())
}
