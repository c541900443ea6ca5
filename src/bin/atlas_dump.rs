use anyhow::{anyhow, bail, Context, Result};
use skyline::atlas::{AtlasPalette, WindowAtlas};
use skyline::config::AppConfig;
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    if let Err(err) = run() {
        tracing::error!("[atlas_dump] error: {err:?}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("Usage: atlas_dump [--theme night|dusk|day] [--config config/app.json] [--out atlas.png]");
}

fn run() -> Result<()> {
    let mut theme = None;
    let mut config_path = PathBuf::from("config/app.json");
    let mut out = None;
    let mut args = env::args().skip(1);
    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            "--theme" => theme = Some(args.next().ok_or_else(|| anyhow!("Expected a value after --theme"))?),
            "--config" => {
                config_path = PathBuf::from(args.next().ok_or_else(|| anyhow!("Expected a value after --config"))?)
            }
            "--out" => out = Some(PathBuf::from(args.next().ok_or_else(|| anyhow!("Expected a value after --out"))?)),
            other => bail!("Unknown argument '{other}'"),
        }
    }

    let config = AppConfig::load_or_default(&config_path);
    let palette = match &theme {
        Some(name) => AtlasPalette::named(name).ok_or_else(|| anyhow!("Unknown theme '{name}'"))?,
        None => config.atlas.palette(),
    };
    let name = theme.unwrap_or_else(|| config.atlas.theme.clone());
    let out = out.unwrap_or_else(|| PathBuf::from(format!("atlas_{name}.png")));

    let atlas = WindowAtlas::generate(config.atlas.layout(), &palette).context("Failed to generate atlas")?;
    let size = atlas.layout().size;
    let image = image::RgbaImage::from_raw(size, size, atlas.rgba().to_vec())
        .ok_or_else(|| anyhow!("Atlas buffer does not match {size}x{size}"))?;
    image.save(&out).with_context(|| format!("Failed to write {}", out.display()))?;
    for band in 0..atlas.layout().bands {
        println!("band {band}: {:.1}% lit", atlas.band_lit_fraction(band) * 100.0);
    }
    println!("Wrote {} ({size}x{size})", out.display());
    Ok(())
}
