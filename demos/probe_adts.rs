use std::{fs::File, io::BufReader, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use es_demux::{AdtsSampleReader, ReadOutcome, SampleReader, StreamInfo};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Walk the access units of a raw ADTS AAC stream")]
struct Args {
    #[arg(long)]
    input: PathBuf,
    #[arg(long, default_value_t = 0)]
    stream_id: u32,
    /// Seek target in microseconds before reading.
    #[arg(long)]
    seek_us: Option<u64>,
    /// Land on the frame containing the seek target instead of the next one.
    #[arg(long, default_value_t = false)]
    preceding: bool,
    /// Only print the totals.
    #[arg(long, default_value_t = false)]
    summary: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let file = File::open(&args.input)
        .with_context(|| format!("failed to open input stream: {}", args.input.display()))?;
    let mut reader = AdtsSampleReader::new(BufReader::new(file), args.stream_id);

    if !reader.start().context("failed to start ADTS reader")? {
        println!("input={} frames=0", args.input.display());
        return Ok(());
    }

    let mut frames = 0usize;
    let mut bytes = 0usize;
    let mut have_sample = false;
    if let Some(target) = args.seek_us {
        have_sample = reader
            .time_seek(target, args.preceding)
            .context("seek failed")?;
        if !have_sample {
            anyhow::bail!("seek target {target} us is past the end of the stream");
        }
    }

    loop {
        if !have_sample && reader.read_sample().context("read failed")? == ReadOutcome::EndOfStream
        {
            break;
        }
        have_sample = false;
        let Some(sample) = reader.sample() else {
            break;
        };
        frames += 1;
        bytes += sample.data.len();
        if !args.summary {
            println!(
                "pts={} dts={} duration={} size={}",
                sample.pts,
                sample.dts,
                reader.duration(),
                sample.data.len()
            );
        }
    }

    let mut info = StreamInfo::default();
    reader.get_information(&mut info);
    println!(
        "input={}, frames={}, bytes={}, {}",
        args.input.display(),
        frames,
        bytes,
        info
    );

    Ok(())
}
