//! CLI command implementations

use anyhow::{Context, Result};
use avidemux_core::{ChunkDemuxer, DemuxConfig, HeaderParser, RemuxPlan, Sink};
use clap::{Args, Subcommand};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print the tracks found in an AVI header as JSON
    Probe {
        /// AVI file to inspect
        input: PathBuf,
    },
    /// Split movie data into a video file and an audio file
    Split {
        input: PathBuf,
        /// Destination of the video elementary stream
        #[arg(long)]
        video: PathBuf,
        /// Destination of the audio elementary stream
        #[arg(long)]
        audio: PathBuf,
        #[command(flatten)]
        options: ConfigArgs,
    },
    /// Print the remuxer meta description for a pair of pipes
    Meta {
        #[arg(long)]
        video: String,
        #[arg(long)]
        audio: String,
        #[command(flatten)]
        options: ConfigArgs,
    },
}

/// Demuxer settings; flags override the JSON file
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Frame audio as LPCM (WAVE header up front)
    #[arg(long)]
    lossless: bool,
    /// Declare audio as AC3
    #[arg(long)]
    lossy: bool,
    /// Pass video through instead of re-encoding
    #[arg(long)]
    no_video_encode: bool,
    #[arg(long)]
    force_type: Option<String>,
    #[arg(long)]
    force_fps: Option<String>,
}

impl ConfigArgs {
    fn resolve(self) -> Result<DemuxConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                DemuxConfig::from_json(&json).with_context(|| format!("parsing config {}", path.display()))?
            }
            None => DemuxConfig::default(),
        };
        config.lossless_audio |= self.lossless;
        config.lossy_audio |= self.lossy;
        config.no_video_encode |= self.no_video_encode;
        if self.force_type.is_some() {
            config.force_type = self.force_type;
        }
        if self.force_fps.is_some() {
            config.force_fps = self.force_fps;
        }
        Ok(config)
    }
}

/// Handle the CLI command, writing results to `out`
pub fn handle_command(command: Commands, out: &mut impl Write) -> Result<()> {
    match command {
        Commands::Probe { input } => probe(&input, out),
        Commands::Split {
            input,
            video,
            audio,
            options,
        } => split(&input, &video, &audio, options.resolve()?, out),
        Commands::Meta {
            video,
            audio,
            options,
        } => {
            let plan = RemuxPlan::new(&options.resolve()?, &video, &audio);
            out.write_all(plan.meta_script().as_bytes())?;
            Ok(())
        }
    }
}

fn open(input: &Path) -> Result<BufReader<File>> {
    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    Ok(BufReader::new(file))
}

fn create(path: &Path) -> Result<Sink> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(Box::new(BufWriter::new(file)))
}

fn probe(input: &Path, out: &mut impl Write) -> Result<()> {
    let config = DemuxConfig::default();
    let mut source = open(input)?;
    let mut discard: Sink = Box::new(io::sink());
    let tracks = HeaderParser::new(&config)
        .parse(&mut source, &mut discard)
        .with_context(|| format!("parsing header of {}", input.display()))?;

    serde_json::to_writer_pretty(&mut *out, &tracks)?;
    writeln!(out)?;
    Ok(())
}

fn split(input: &Path, video: &Path, audio: &Path, config: DemuxConfig, out: &mut impl Write) -> Result<()> {
    let mut source = open(input)?;
    let video_sink = create(video)?;
    let mut audio_sink = create(audio)?;

    let tracks = HeaderParser::new(&config)
        .parse(&mut source, &mut audio_sink)
        .with_context(|| format!("parsing header of {}", input.display()))?;
    let summary = ChunkDemuxer::new(source, &tracks, video_sink, audio_sink)
        .run()
        .with_context(|| format!("demuxing {}", input.display()))?;

    info!(video = %video.display(), audio = %audio.display(), "Split complete");
    serde_json::to_writer_pretty(&mut *out, &summary)?;
    writeln!(out)?;
    Ok(())
}
