use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use terrain_core::{Layer, LayerMesh, Terrain, TerrainConfig, utils::to_terrain_image};

/// Regenerate a layered procedural terrain from the command line.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON terrain description; the built-in demo terrain is used when omitted
    config: Option<PathBuf>,

    /// Override the seed from the config
    #[arg(long)]
    seed: Option<i64>,

    /// Override the grid size as WIDTHxLENGTH, e.g. 128x128
    #[arg(long, value_parser = parse_size)]
    size: Option<(u32, u32)>,

    /// Write a colored top-down PNG of the first evaluated layer
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Print the height matrix of this layer to stdout
    #[arg(long, value_name = "LAYER")]
    print_matrix: Option<usize>,
}

fn parse_size(s: &str) -> std::result::Result<(u32, u32), String> {
    let (w, l) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxLENGTH, got '{}'", s))?;
    let parse = |v: &str| v.trim().parse::<u32>().map_err(|e| format!("'{}': {}", v, e));
    Ok((parse(w)?, parse(l)?))
}

// Three pyramids and four perlin octaves, N picks the octave frequency
fn demo_config() -> TerrainConfig {
    TerrainConfig {
        name: "demo".into(),
        seed: 2025,
        width: 100,
        length: 100,
        layers: vec![Layer::new([
            "pyramid(x, y, 0, 0, 0, 0, 0.5, -0.3, 1)",
            "pyramid(x, y, 0, 0, 0, 0, -0.5, 0.3, 1)",
            "pyramid(x, y, 0, 0, 0, 0.3, -0.3, 0, -1)",
            "perlin(x, y, 2^(N/2)) * 0.5",
            "perlin(x, y, 2^(N/2)) * 0.05",
            "perlin(x, y, 2^(N/2)) * 0.01",
            "perlin(x, y, 2^(N/2)) * 0.005",
        ])],
    }
}

fn load_config(args: &Args) -> Result<TerrainConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing terrain config {}", path.display()))?
        }
        None => {
            info!("no config given, using the demo terrain");
            demo_config()
        }
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some((width, length)) = args.size {
        config.width = width;
        config.length = length;
    }
    Ok(config)
}

fn log_summary(meshes: &[LayerMesh]) {
    for m in meshes {
        match m.mesh.bounding_box() {
            Some((min, max)) => info!(
                "layer {}: {} vertices, bounds {:?} .. {:?}, color {:?}",
                m.layer,
                m.mesh.len(),
                min,
                max,
                m.appearance.normalized_color()
            ),
            None => warn!("layer {}: empty mesh", m.layer),
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = load_config(&args)?;
    let mut terrain = Terrain::from_config(config).context("invalid terrain description")?;

    let start = Instant::now();
    let meshes = terrain.regenerate().context("terrain regeneration failed")?;
    log_summary(&meshes);
    info!("total time: {:.2?}", start.elapsed());

    if let Some(path) = &args.preview {
        let heights = (0..terrain.layers().len())
            .find_map(|i| terrain.height_matrix(i))
            .context("no evaluated layer to preview")?;
        to_terrain_image(heights)
            .save(path)
            .with_context(|| format!("writing preview {}", path.display()))?;
        info!("saved {}", path.display());
    }

    if let Some(layer) = args.print_matrix {
        match terrain.height_matrix(layer) {
            Some(m) => print!("{}", m),
            None => bail!("layer {} has no height matrix", layer),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_flag_parses() {
        assert_eq!(parse_size("128x64"), Ok((128, 64)));
        assert_eq!(parse_size("3X3"), Ok((3, 3)));
        assert!(parse_size("128").is_err());
        assert!(parse_size("ax2").is_err());
    }

    #[test]
    fn demo_terrain_is_valid() {
        let mut config = demo_config();
        config.width = 8;
        config.length = 8;
        let mut terrain = Terrain::from_config(config).unwrap();
        let meshes = terrain.regenerate().unwrap();
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].mesh.len(), 6 * 7 * 7);
    }
}
