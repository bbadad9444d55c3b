use std::ops::Range;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mlv_dng_rs::logger;
use mlv_dng_rs::mlv_pipeline::{ConversionConfig, FrameOptions, MlvFile, MlvToDngPipeline};

use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "mlv_dng_rs",
    version,
    about = "Convert Magic Lantern MLV raw video into DNG frames"
)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the attributes of a recording as JSON
    Info { input: PathBuf },

    /// Write frames of a recording as DNG files
    Convert {
        input: PathBuf,
        output_dir: PathBuf,

        /// Frame positions to convert, e.g. `10..20` (end exclusive). Default: all.
        #[arg(long, value_parser = parse_range)]
        frames: Option<Range<usize>>,

        /// Interpolate autofocus pixels (needs --focus-pixel-dir)
        #[arg(long, default_value_t = false, requires = "focus_pixel_dir")]
        fix_focus: bool,

        /// Interpolate hot and cold pixels found in the first frame
        #[arg(long, default_value_t = false)]
        fix_dead: bool,

        /// Remove vertical banding measured on the first frame
        #[arg(long, default_value_t = false)]
        fix_banding: bool,

        /// Store frames at 14 bits per sample
        #[arg(long = "to-14bit", default_value_t = false)]
        to_14bit: bool,

        /// Write a highlight-map TIFF beside each DNG
        #[arg(long, default_value_t = false)]
        highlights: bool,

        /// Embed an RGB preview in each DNG
        #[arg(long, default_value_t = false)]
        preview: bool,

        /// Write the clipping point measured on each frame as its white level
        #[arg(long, default_value_t = false)]
        estimate_white_level: bool,

        /// Directory of `<model_hex>_<width>x<height>.fpm` focus pixel tables
        #[arg(long)]
        focus_pixel_dir: Option<PathBuf>,
    },
}

fn parse_range(s: &str) -> std::result::Result<Range<usize>, String> {
    let (start, end) = s
        .split_once("..")
        .ok_or_else(|| format!("expected START..END, got {s:?}"))?;
    let start = start.trim().parse::<usize>().map_err(|e| e.to_string())?;
    let end = end.trim().parse::<usize>().map_err(|e| e.to_string())?;
    if end <= start {
        return Err(format!("empty frame range {start}..{end}"));
    }
    Ok(start..end)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init_with_default(if cli.verbose { "debug" } else { "info" });

    match cli.cmd {
        Commands::Info { input } => {
            let file = MlvFile::open(&input)
                .with_context(|| format!("open {}", input.display()))?;
            let attributes = file.attributes();
            println!("{}", serde_json::to_string_pretty(&attributes)?);
            if !attributes.valid {
                warn!("Recording is {:?}", attributes.state);
            }
        }
        Commands::Convert {
            input,
            output_dir,
            frames,
            fix_focus,
            fix_dead,
            fix_banding,
            to_14bit,
            highlights,
            preview,
            estimate_white_level,
            focus_pixel_dir,
        } => {
            let mut options = FrameOptions::NONE;
            for (enabled, flag) in [
                (fix_focus, FrameOptions::FIX_FOCUS_PIXELS),
                (fix_dead, FrameOptions::FIX_DEAD_PIXELS),
                (fix_banding, FrameOptions::FIX_VERTICAL_BANDING),
                (to_14bit, FrameOptions::CONVERT_TO_14_BIT),
                (highlights, FrameOptions::PRODUCE_HIGHLIGHT_MAP),
            ] {
                if enabled {
                    options = options | flag;
                }
            }

            let config = ConversionConfig::builder()
                .options(options)
                .preview(preview)
                .estimate_white_level(estimate_white_level)
                .focus_pixel_dir(focus_pixel_dir)
                .build();
            let pipeline = MlvToDngPipeline::new(config).context("load focus pixel tables")?;
            info!("Frame options: {}", options);

            let file = MlvFile::open(&input)
                .with_context(|| format!("open {}", input.display()))?;
            let total = file.video_chunks().len();
            if total == 0 {
                bail!("{} contains no video frames", input.display());
            }
            let range = frames.unwrap_or(0..total);
            if range.start >= total {
                bail!("frame range starts at {} but the recording has {} frames", range.start, total);
            }

            let written = pipeline
                .convert_frames(&file, range.clone(), &output_dir)
                .with_context(|| format!("write frames to {}", output_dir.display()))?;
            let expected = range.end.min(total) - range.start;
            info!("Wrote {} of {} frames to {}", written.len(), expected, output_dir.display());
            if written.len() < expected {
                bail!("{} frames failed to convert", expected - written.len());
            }
        }
    }

    Ok(())
}
