//! lumo - offline renderer command line.

use anyhow::{anyhow, Context};
use clap::Parser;
use log::{error, info};
use std::time::Instant;

mod cli;
mod output;
mod scenes;

use cli::{Algo, Args};
use lumo_render::{DebugRenderer, Image, PathTracer, PhotonMapper, Renderer};

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // Help and version requests are not failures
            let is_help = matches!(
                err.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            );
            let _ = err.print();
            std::process::exit(if is_help { 0 } else { 1 });
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(args.log_level.clone().into())
        .init();

    if let Err(err) = run(&args) {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    info!("lumo {}", env!("CARGO_PKG_VERSION"));

    let aspect = args.width as f32 / args.height as f32;
    let scene = scenes::build(&args.scene, aspect)
        .ok_or_else(|| anyhow!("no scene named '{}'", args.scene))?
        .with_context(|| format!("failed to build scene '{}'", args.scene))?;

    let mut renderer: Box<dyn Renderer + '_> = match args.algo {
        Algo::Debug => Box::new(DebugRenderer::new(&scene)),
        Algo::Pt => Box::new(PathTracer::new(&scene)),
        Algo::Ppm => Box::new(PhotonMapper::new(&scene)),
    };

    let max_samples = if args.samples == 0 && args.time == 0.0 {
        info!("Defaulting to 4 samples per pixel (use --samples or --time for more).");
        4
    } else {
        args.samples
    };

    let mut img = Image::new(args.width, args.height);
    renderer.reset();

    info!(
        "Rendering {}x{} with '{}'...",
        args.width,
        args.height,
        renderer.name()
    );

    let start = Instant::now();
    let mut accum: usize = 0;
    let mut frames: u32 = 0;
    let mut frame_time_ms: u128 = 0;
    loop {
        let frame_start = Instant::now();
        renderer.render(&mut img);
        accum += 1;
        frames += 1;
        frame_time_ms += frame_start.elapsed().as_millis();

        if frames > 20 || frame_time_ms > 5000 {
            info!("Average frame time: {} ms.", frame_time_ms / frames as u128);
            frames = 0;
            frame_time_ms = 0;
        }

        if max_samples != 0 && accum >= max_samples {
            break;
        }
        if args.time != 0.0 && start.elapsed().as_secs_f64() >= args.time {
            break;
        }
    }

    let total_time = start.elapsed().as_secs_f64();
    output::save(&args.output, &img)
        .with_context(|| format!("failed to save image to '{}'", args.output))?;
    info!("Done: {} samples per pixel in {:.2} s.", accum, total_time);
    Ok(())
}
