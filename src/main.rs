//! `gme-render`: render a game music file to WAV.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use gme::export::{render, write_wav};
use gme::{identify, ChiptunePlayerBase, PlayerConfig};

#[derive(Parser, Debug)]
#[command(name = "gme-render")]
#[command(about = "Render NSF, AY, KSS, SAP and SGC files to WAV", version)]
struct Args {
    /// Input music file
    file: PathBuf,

    /// Track number, starting at 1 (default: the file's default track)
    #[arg(short, long)]
    track: Option<usize>,

    /// Seconds to render (default: the track length)
    #[arg(short, long)]
    seconds: Option<f32>,

    /// Output WAV path (default: input name with .wav)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Playback speed multiplier
    #[arg(long)]
    tempo: Option<f64>,

    /// Muted voice bitmask, decimal or 0x-prefixed hex
    #[arg(long, value_parser = parse_mask)]
    mute: Option<u32>,

    /// Output sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// JSON player configuration; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print metadata and voice names, then exit
    #[arg(long)]
    info: bool,
}

fn parse_mask(value: &str) -> Result<u32, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid mask {value:?}: {e}"))
}

fn load_config(args: &Args) -> Result<PlayerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            PlayerConfig::from_json_str(&json)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => PlayerConfig::default(),
    };
    if let Some(rate) = args.sample_rate {
        config.sample_rate = rate;
    }
    if let Some(tempo) = args.tempo {
        config.tempo = tempo;
    }
    if let Some(mask) = args.mute {
        config.mute_mask = mask;
    }
    Ok(config)
}

fn print_info(player: &dyn ChiptunePlayerBase) {
    let meta = player.basic_metadata();
    let or_dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };
    println!("Format:    {}", meta.format);
    println!("System:    {}", meta.system);
    println!("Title:     {}", or_dash(&meta.title));
    println!("Author:    {}", or_dash(&meta.author));
    println!("Copyright: {}", or_dash(&meta.copyright));
    if !meta.comments.is_empty() {
        println!("Comments:  {}", meta.comments);
    }
    println!(
        "Track:     {} of {}",
        player.current_subsong(),
        player.subsong_count()
    );
    println!("Length:    {:.1}s", player.duration_seconds());
    println!("Voices:    {}", player.voice_names().join(", "));
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let data = fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let config = load_config(&args)?;
    log::info!(
        "{} detected as {}",
        args.file.display(),
        identify(&data).name()
    );
    let mut player =
        gme::open(&data, &config).with_context(|| format!("opening {}", args.file.display()))?;

    if let Some(track) = args.track {
        if !player.set_subsong(track) {
            bail!(
                "track {track} out of range (file has {})",
                player.subsong_count()
            );
        }
    }

    if args.info {
        print_info(player.as_ref());
        return Ok(());
    }

    let seconds = args.seconds.unwrap_or_else(|| player.duration_seconds());
    let out = args
        .out
        .clone()
        .unwrap_or_else(|| args.file.with_extension("wav"));
    let samples = render(player.as_mut(), seconds);
    write_wav(&out, &samples, config.sample_rate)
        .with_context(|| format!("writing {}", out.display()))?;
    println!(
        "Wrote {:.1}s to {}",
        samples.len() as f32 / config.sample_rate as f32,
        out.display()
    );
    Ok(())
}
