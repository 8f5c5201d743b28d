//! Extract optical flow from raw NV21 camera streams.

use clap::*;
use log::*;
use lumaflow::prelude::v1::{Result, *};
use lumaflow::utils::open_file;
use std::fs::File;
use std::io::BufWriter;

mod output;
mod source;

use output::{CsvWriter, FlowWriter, MvecWriter};
use source::RawFrameSource;

fn load_config(path: Option<&str>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            let file = File::open(path)?;
            serde_json::from_reader(file).map_err(Into::into)
        }
        None => Ok(Default::default()),
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("flow-extract")
        .version(crate_version!())
        .author(crate_authors!())
        .arg(
            Arg::new("width")
                .long("width")
                .short('w')
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::new("height")
                .long("height")
                .short('H')
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::new("input")
                .long("input")
                .short('i')
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::new("fps")
                .long("fps")
                .short('f')
                .takes_value(true)
                .default_value("30"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .takes_value(true),
        )
        .arg(
            Arg::new("prop")
                .long("prop")
                .short('p')
                .takes_value(true)
                .multiple_occurrences(true),
        )
        .arg(Arg::new("dense").long("dense").short('d'))
        .arg(Arg::new("realtime").long("realtime").short('r'))
        .arg(Arg::new("output").takes_value(true).required(true))
        .get_matches();

    let input = matches
        .value_of("input")
        .ok_or_else(|| anyhow!("No input supplied"))?;
    let output = matches
        .value_of("output")
        .ok_or_else(|| anyhow!("No output supplied"))?;
    let width: usize = matches.value_of_t("width")?;
    let height: usize = matches.value_of_t("height")?;
    let fps: f64 = matches.value_of_t("fps")?;
    let dense = matches.is_present("dense");
    // Network streams are live unless stated otherwise.
    let realtime = matches.is_present("realtime") || input.starts_with("tcp://");

    let mut config = load_config(matches.value_of("config"))?;

    for prop in matches.values_of("prop").into_iter().flatten() {
        let (name, value) = prop
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected NAME=VALUE, got {}", prop))?;
        config.set_property(name, value)?;
    }

    info!("{:?}", config);

    let mut pipeline = Pipeline::new(config)?;
    let mut source = RawFrameSource::new(open_file(input)?, width, height, fps, realtime)?;

    let out = BufWriter::new(File::create(output)?);
    let mut writer: Box<dyn FlowWriter> = if dense {
        Box::new(MvecWriter::new(out))
    } else {
        Box::new(CsvWriter::new(out))
    };

    let mut frame = 0;

    pipeline.run(&mut source, |pipeline, samples| {
        let time = pipeline.timestamp().unwrap_or_default();
        writer.write_frame(frame, time, pipeline.flow(), samples)?;
        frame += 1;
        Ok(())
    })?;

    let stats = pipeline.stats();
    if stats.skipped + stats.dropped > 0 {
        info!(
            "{} frames written, {} failed, {} dropped",
            frame, stats.skipped, stats.dropped
        );
    }

    writer.finish()?;

    info!(
        "gradients {:?}/frame, solve {:?}/frame",
        stats.gradients.mean(),
        stats.solve.mean()
    );

    Ok(())
}
