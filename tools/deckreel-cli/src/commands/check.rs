//! Check external tools and configuration.

use deckreel_common::config::AppConfig;
use deckreel_render_engine::compose::{CompositionBackend, FfmpegComposer};
use deckreel_render_engine::process::command_exists;
use deckreel_render_engine::rasterizer::{RasterEngine, WorkerRasterEngine};

pub fn run(config: AppConfig) -> anyhow::Result<()> {
    println!("Deckreel System Check");
    println!("{}", "=".repeat(50));

    let mut all_ok = true;
    let mut report = |ok: bool, what: &str, detail: String| {
        let tag = if ok { "[OK]  " } else { "[FAIL]" };
        println!("{tag} {what}: {detail}");
        all_ok &= ok;
    };

    match config.validate() {
        Ok(()) => report(true, "Config", "valid".to_string()),
        Err(e) => report(false, "Config", e.to_string()),
    }

    let composer = FfmpegComposer::from_config(&config);
    report(
        composer.is_available(),
        "Encoder",
        config.tools.ffmpeg.display().to_string(),
    );
    report(
        command_exists(&config.tools.ffprobe),
        "Probe",
        config.tools.ffprobe.display().to_string(),
    );

    let raster = WorkerRasterEngine::new(config.tools.raster_worker.clone());
    report(
        raster.is_available(),
        "Raster worker",
        config.tools.raster_worker.join(" "),
    );

    println!();
    println!("Data dir:   {}", config.data_dir.display());
    println!("Work dir:   {}", config.work_dir.display());
    println!("Output dir: {}", config.output_dir.display());
    println!("Media root: {}", config.media_root.display());
    println!(
        "Concurrency: {} job(s)",
        config.render.max_concurrent_jobs
    );

    println!();
    if all_ok {
        println!("All tools are available. Deckreel is ready.");
    } else {
        println!("Some tools are missing. Probe failures fall back to defaults, but rendering needs the encoder and raster worker.");
    }

    Ok(())
}
