use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pcmscope_core as core;
use std::fs;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Parser, Debug)]
#[command(name = "pcmscope")]
#[command(about = "Decode, inspect, play and export raw PCM audio", long_about = None)]
struct Cli {
    /// Log transport and decode events
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the header of a wave file
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Play raw PCM through the default output device
    Play {
        #[command(flatten)]
        decode: DecodeArgs,

        /// Playback speed multiplier
        #[arg(long, default_value_t = 1.0)]
        speed: f64,

        /// Start position as a fraction of the length (0 to 1)
        #[arg(long, default_value_t = 0.0)]
        seek: f64,
    },
    /// Re-encode raw PCM as a 16-bit wave file
    Convert {
        #[command(flatten)]
        decode: DecodeArgs,

        /// Output path
        #[arg(short, long, default_value = core::EXPORT_FILE_NAME)]
        output: PathBuf,

        /// Export container
        #[arg(short, long, default_value = "wav")]
        format: String,
    },
    /// Draw the waveform and time ruler as text
    Waveform {
        #[command(flatten)]
        decode: DecodeArgs,

        /// Columns to draw
        #[arg(long, default_value_t = 80)]
        width: usize,

        /// Rows to draw
        #[arg(long, default_value_t = 16)]
        height: usize,

        /// Reduction: rms or minmax
        #[arg(long, default_value = "rms")]
        mode: core::ReductionMode,

        /// Zoom factor for minmax reduction
        #[arg(long, default_value_t = 1.0)]
        zoom: f64,

        /// Position of the zoomed window (0 to 1)
        #[arg(long, default_value_t = 0.0)]
        pan: f64,
    },
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Raw PCM input
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Sample rate in Hz
    #[arg(short, long, default_value_t = 44100)]
    rate: u32,

    /// Bits per sample (8 or 16)
    #[arg(short, long, default_value_t = 16)]
    bits: u16,

    /// Interleaved channel count
    #[arg(short, long, default_value_t = 1)]
    channels: u16,

    /// Samples are unsigned
    #[arg(long)]
    unsigned: bool,

    /// Samples are big-endian
    #[arg(long)]
    big_endian: bool,
}

impl DecodeArgs {
    fn params(&self) -> Result<core::DecodeParams> {
        let endianness = if self.big_endian {
            core::Endianness::Big
        } else {
            core::Endianness::Little
        };

        Ok(core::DecodeParams {
            sample_rate: self.rate,
            channels: self.channels,
            format: core::PcmFormat {
                bit_depth: self.bits.try_into()?,
                signed: !self.unsigned,
                endianness,
            },
        })
    }

    fn load<S: core::AudioSink, C: core::Clock>(
        &self,
        session: &mut core::PlayerSession<S, C>,
    ) -> Result<()> {
        let params = self.params()?;

        session
            .load_file(self.file.as_deref(), &params)
            .with_context(|| match &self.file {
                Some(path) => format!("Failed to load \"{}\"", path.display()),
                None => String::from("No input"),
            })
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run_command(cli.command) {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

fn run_command(command: Command) -> Result<()> {
    match command {
        Command::Info { file } => print_info(&file),
        Command::Play {
            decode,
            speed,
            seek,
        } => play(&decode, speed, seek),
        Command::Convert {
            decode,
            output,
            format,
        } => convert(&decode, &output, &format),
        Command::Waveform {
            decode,
            width,
            height,
            mode,
            zoom,
            pan,
        } => {
            let mut session =
                core::offline_session(core::SessionConfig { reduction: mode });
            decode.load(&mut session)?;
            session.set_zoom(zoom);
            session.set_pan(pan);

            for row in draw_envelope(session.envelope(width)?, height) {
                println!("{}", row);
            }

            let (marks, labels) = draw_ruler(&session.ruler(width)?, width);
            println!("{}", marks);
            println!("{}", labels);

            Ok(())
        }
    }
}

fn print_info(path: &Path) -> Result<()> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open \"{}\"", path.display()))?;
    let info = core::read_info(BufReader::new(file))?;

    println!("Information");
    println!("\tChannels = {}", info.channels);
    println!("\tSample rate = {}", info.sample_rate);
    println!("\tSample bits = {}", info.bits_per_sample);
    println!(
        "\tDuration = {} frames ({:.3}s)",
        info.frame_count, info.duration,
    );

    Ok(())
}

fn convert(decode: &DecodeArgs, output: &Path, format: &str) -> Result<()> {
    let format: core::ExportFormat = format.parse()?;
    let mut session = core::offline_session(core::SessionConfig::default());
    decode.load(&mut session)?;

    let bytes = session.export(format)?;
    fs::write(output, &bytes)
        .with_context(|| format!("Failed to write \"{}\"", output.display()))?;

    println!(
        "Wrote {} bytes ({}) to {}",
        bytes.len(),
        format.mime_type(),
        output.display()
    );

    Ok(())
}

fn play(decode: &DecodeArgs, speed: f64, seek: f64) -> Result<()> {
    let mut session = core::setup_session(core::SessionConfig::default());
    session.set_playback_rate(speed)?;
    decode.load(&mut session)?;
    session.seek(seek)?;
    session.play()?;

    println!("Playing. . .");

    let mut stdout = io::stdout();

    while session.transport() == core::TransportState::Playing {
        sleep(POLL_INTERVAL);

        if let Some(progress) = session.tick() {
            print!("\r{}", progress);
            stdout.flush()?;
        }
    }

    println!();
    println!("Done.");

    Ok(())
}

fn draw_envelope(envelope: &core::Envelope, height: usize) -> Vec<String> {
    if height == 0 {
        return Vec::new();
    }

    let mut rows = vec![vec![' '; envelope.len()]; height];

    for (col, column) in envelope.columns().iter().enumerate() {
        let (top, bottom) = column.extent(height as f64);
        let first = (top.floor().max(0.0) as usize).min(height - 1);
        let last = (bottom.ceil().max(0.0) as usize).clamp(first + 1, height);

        for row in &mut rows[first..last] {
            row[col] = '#';
        }
    }

    rows.into_iter().map(String::from_iter).collect()
}

fn draw_ruler(ticks: &[core::Tick], width: usize) -> (String, String) {
    let mut marks = vec!['-'; width];
    let mut labels = vec![' '; width];
    let mut free_from = 0usize;

    for tick in ticks {
        let col = (tick.x as usize).min(width.saturating_sub(1));

        if let Some(mark) = marks.get_mut(col) {
            *mark = '|';
        }

        let label = tick.label();

        if col >= free_from && col + label.len() <= width {
            for (offset, ch) in label.chars().enumerate() {
                labels[col + offset] = ch;
            }

            free_from = col + label.len() + 1;
        }
    }

    (String::from_iter(marks), String::from_iter(labels))
}
