mod project;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use montage_core::{FrameSink, MontageConfig};
use montage_encode::{save_png, FfmpegSink, PngSequenceSink};
use montage_render::{
    spawn_export, ExportDriver, ExportProgress, ExportSettings, ExportStage, InstructionSet,
    PreviewEngine,
};

use crate::project::{load_config, load_project, DEFAULT_CONFIG_FILE};

#[derive(Parser)]
#[command(
    name = "montage",
    version,
    about = "Montage: timeline compositing engine",
    long_about = "Montage composites layered clip timelines with keyframed transforms, \
filters and text overlays,\nand exports them to video files or still frames."
)]
struct Cli {
    /// Config file (default: ./montage.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a project to a video file, or to a PNG sequence when the output is a directory
    Render {
        /// Path to the project JSON file
        #[arg()]
        file: PathBuf,

        /// Output file path (default: output/<name>.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Frames per second (overrides the config)
        #[arg(long)]
        fps: Option<f64>,

        /// Font file for overlays that name none
        #[arg(long)]
        font: Option<PathBuf>,

        /// Print the export report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Render a single frame to PNG
    Frame {
        /// Path to the project JSON file
        #[arg()]
        file: PathBuf,

        /// Composition time in seconds
        #[arg(short, long, default_value_t = 0.0)]
        time: f64,

        /// Output PNG path
        #[arg(short, long, default_value = "frame.png")]
        output: PathBuf,

        /// Font file for overlays that name none
        #[arg(long)]
        font: Option<PathBuf>,
    },
    /// Print the segment instructions of a project
    Segments {
        /// Path to the project JSON file
        #[arg()]
        file: PathBuf,
    },
    /// Validate a project and probe its media without rendering
    Check {
        /// Path to the project JSON file
        #[arg()]
        file: PathBuf,
    },
    /// Write the active configuration to a TOML file
    InitConfig {
        /// Destination (default: ./montage.toml)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Render {
            file,
            output,
            fps,
            font,
            json,
        } => cmd_render(&config, file, output, fps, font, json),
        Commands::Frame {
            file,
            time,
            output,
            font,
        } => cmd_frame(&config, file, time, output, font),
        Commands::Segments { file } => cmd_segments(&config, file),
        Commands::Check { file } => cmd_check(&config, file),
        Commands::InitConfig { output, force } => cmd_init_config(&config, output, force),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")
}

fn default_output(file: &Path) -> PathBuf {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    PathBuf::from("output").join(format!("{}.mp4", stem))
}

/// Directories, and paths without an extension, get a PNG sequence.
fn is_sequence_output(output: &Path) -> bool {
    output.is_dir() || output.extension().is_none()
}

fn cmd_render(
    config: &MontageConfig,
    file: PathBuf,
    output: Option<PathBuf>,
    fps: Option<f64>,
    font: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let start = Instant::now();
    let project = load_project(&file, config, font)?;
    let snapshot = project.state.snapshot();

    let mut settings = ExportSettings::from_config(&config.render);
    if let Some(fps) = fps {
        settings.fps = fps;
    }
    let output = output.unwrap_or_else(|| default_output(&file));
    let sequence = is_sequence_output(&output);
    let sink: Box<dyn FrameSink> = if sequence {
        Box::new(PngSequenceSink::new(&output))
    } else {
        let sink = FfmpegSink::new(&output, settings.fps, config.export.clone());
        if !sink.is_available() {
            anyhow::bail!(
                "ffmpeg not found at '{}'; install it or set export.ffmpeg_path",
                config.export.ffmpeg_path
            );
        }
        Box::new(sink)
    };

    if !json {
        println!("🎬 Montage v{}", env!("CARGO_PKG_VERSION"));
        println!("   Project: {}", file.display());
        println!(
            "   ✓ Loaded {} clips, {} overlays ({:.2}s)",
            snapshot.clips.len(),
            snapshot.overlays.len(),
            snapshot.duration()
        );
        if sequence {
            println!("   Output:  {}/ (PNG sequence)", output.display());
        } else {
            println!("   Output:  {}", output.display());
        }
    }

    let runtime = runtime()?;
    let report = runtime.block_on(async move {
        let mut driver = ExportDriver::new(project.compositor, settings);
        let mut printer = None;
        if !json {
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ExportProgress>();
            driver = driver.with_progress(tx);
            printer = Some(tokio::spawn(async move {
                let mut last_percent = None;
                while let Some(progress) = rx.recv().await {
                    print_progress(&progress, &mut last_percent);
                }
            }));
        }

        let result = spawn_export(driver, snapshot, sink)
            .await
            .context("export task panicked")?;
        // The sender went away with the driver when the task ended.
        if let Some(printer) = printer {
            let _ = printer.await;
        }
        result.context("export failed")
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!();
    println!(
        "   ✓ {} frames at {}x{} @ {}fps",
        report.frames_written, report.width, report.height, report.fps
    );
    if report.audio_segments > 0 {
        println!("   ✓ {} audio segments passed through", report.audio_segments);
    }
    if report.layers_skipped > 0 {
        println!("   ⚠️ {} layer draws skipped (see warnings)", report.layers_skipped);
    }
    println!("   Hash: {}", report.content_hash);
    println!("   ⚡ Exported in {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn print_progress(progress: &ExportProgress, last_percent: &mut Option<u32>) {
    match progress.stage {
        ExportStage::Rendering => {
            let percent = (progress.fraction * 100.0).floor() as u32;
            if *last_percent != Some(percent) {
                *last_percent = Some(percent);
                print!(
                    "\r   Rendering {:>3}% ({}/{})",
                    percent, progress.frames_rendered, progress.total_frames
                );
                use std::io::Write;
                let _ = std::io::stdout().flush();
            }
        }
        ExportStage::Audio => println!("\n   Muxing audio"),
        ExportStage::Finalizing => println!("\n   Finalizing"),
        ExportStage::Failed => println!("\n   ❌ Failed at {:.0}%", progress.fraction * 100.0),
        ExportStage::Preparing | ExportStage::Complete => {}
    }
}

fn cmd_frame(
    config: &MontageConfig,
    file: PathBuf,
    time: f64,
    output: PathBuf,
    font: Option<PathBuf>,
) -> Result<()> {
    let project = load_project(&file, config, font)?;
    let snapshot = project.state.snapshot();
    let engine = PreviewEngine::new(
        project.compositor,
        config.render.default_canvas(),
        config.preview.max_concurrent_renders,
    );

    let runtime = runtime()?;
    let frame = runtime.block_on(async {
        engine.rebuild(snapshot).await?;
        engine.seek(time);
        engine.render_at(time).await
    })
    .with_context(|| format!("failed to render {} at {}s", file.display(), time))?;

    save_png(&frame.image, &output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!(
        "✓ Frame at {:.3}s ({}x{}, {} layers, {} overlays) -> {}",
        frame.time,
        frame.image.width,
        frame.image.height,
        frame.layers_drawn,
        frame.overlays_drawn,
        output.display()
    );
    if frame.layers_skipped > 0 {
        println!("   ⚠️ {} layers skipped", frame.layers_skipped);
    }
    Ok(())
}

fn cmd_segments(config: &MontageConfig, file: PathBuf) -> Result<()> {
    let project = load_project(&file, config, None)?;
    let snapshot = project.state.snapshot();
    let set = InstructionSet::for_snapshot(
        snapshot,
        project.compositor.source().as_ref(),
        config.render.default_canvas(),
    );

    println!(
        "{} segments, {:.3}s, canvas {} (revision {})",
        set.len(),
        set.duration,
        set.canvas,
        set.revision()
    );
    for (i, instruction) in set.instructions.iter().enumerate() {
        let layers: Vec<String> = instruction
            .layers
            .iter()
            .filter_map(|id| set.snapshot.clip(*id))
            .map(|clip| format!("{}@{}", clip.source, clip.track))
            .collect();
        let overlays: Vec<&str> = instruction
            .overlays
            .iter()
            .filter_map(|&idx| set.snapshot.overlays.get(idx))
            .map(|o| o.text.as_str())
            .collect();
        println!(
            "  {:>3}  {:>9.3} .. {:<9.3}  layers [{}]  overlays [{}]",
            i,
            instruction.range.start,
            instruction.range.end,
            layers.join(", "),
            overlays.join(", ")
        );
    }
    Ok(())
}

fn cmd_check(config: &MontageConfig, file: PathBuf) -> Result<()> {
    println!("🔍 Checking {}", file.display());
    let project = load_project(&file, config, None)?;
    println!("   ✓ Project valid");
    println!("   ✓ Media probed");

    let snapshot = project.state.snapshot();
    if snapshot.is_empty() {
        println!("   ⚠️ No clips: nothing to export");
    }
    let audio = snapshot.clips.iter().filter(|c| c.has_audio).count();
    println!(
        "   Clips: {} ({} with audio), overlays: {}, duration: {:.3}s",
        snapshot.clips.len(),
        audio,
        snapshot.overlays.len(),
        snapshot.duration()
    );

    let fontless = snapshot
        .overlays
        .iter()
        .filter(|o| o.font.path.is_none())
        .count();
    if fontless > 0 {
        println!(
            "   ⚠️ {} overlays name no font file; pass --font when rendering",
            fontless
        );
    }

    let set = InstructionSet::for_snapshot(
        snapshot,
        project.compositor.source().as_ref(),
        config.render.default_canvas(),
    );
    println!("   Canvas: {}, {} segments", set.canvas, set.len());
    println!("\n✓ All checks passed");
    Ok(())
}

fn cmd_init_config(config: &MontageConfig, output: Option<PathBuf>, force: bool) -> Result<()> {
    let output = output.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    if output.exists() && !force {
        anyhow::bail!("{} already exists; pass --force to replace it", output.display());
    }
    config
        .save_to_file(&output)
        .with_context(|| format!("failed to write config: {}", output.display()))?;
    println!("✓ Wrote {}", output.display());
    Ok(())
}
