//! Show deck information.

use deckreel_common::clock;
use deckreel_common::config::AppConfig;
use deckreel_deck_model::job::RenderKind;
use deckreel_deck_model::quality::QualitySettings;

use super::DeckSource;

pub async fn run(config: AppConfig, deck: String) -> anyhow::Result<()> {
    let source = DeckSource::resolve(&config, &deck).await?;
    let bundle = source.load().await?;
    let d = &bundle.deck;

    println!("Deck: {}", d.title);
    println!("  ID: {}", d.id);
    println!("  Aspect ratio: {}", d.aspect_ratio.as_str());
    if let Some(ref bg) = d.theme_background {
        println!("  Theme background: {bg}");
    }
    println!("  Media root: {}", source.media_root.display());
    println!();

    println!("Slides ({}):", bundle.slides.len());
    for slide in &bundle.slides {
        let title = slide.content.title.as_deref().unwrap_or("(untitled)");
        print!(
            "  {:>3}. {:<14} {title} ({}s)",
            slide.position,
            slide.layout.as_str(),
            clock::format_secs(slide.duration_ms)
        );
        if let Some(ref video) = slide.video {
            print!(" video: {}", video.asset.path);
        }
        if let Some(narration) = slide.narration() {
            print!(" narration: {narration}");
        }
        println!();
    }
    println!();

    if !bundle.timeline.is_empty() {
        println!("Timeline ({}):", bundle.timeline.len());
        for item in &bundle.timeline {
            match item.window_ms() {
                Some((start, end)) => println!(
                    "  {:?} @{} {} [{}s..{}s]",
                    item.kind,
                    item.position,
                    item.asset_path,
                    clock::format_secs(start),
                    clock::format_secs(end)
                ),
                None => println!(
                    "  {:?} @{} {} (empty window, skipped)",
                    item.kind, item.position, item.asset_path
                ),
            }
        }
        println!();
    }

    println!("Authored duration: {}s", clock::format_secs(bundle.authored_duration_ms()));
    println!();

    println!("Output quality:");
    for kind in [RenderKind::Preview, RenderKind::Final] {
        let q = QualitySettings::resolve(kind, d.aspect_ratio);
        println!(
            "  {:<8} {}x{} @ {}fps, video {} kbps, audio {} kbps, preset {}",
            kind.as_str(),
            q.width,
            q.height,
            q.fps,
            q.video_bitrate_kbps,
            q.audio_bitrate_kbps,
            q.encoder_preset.as_str()
        );
    }

    match bundle.validate() {
        Ok(()) => println!("\nDeck is renderable."),
        Err(e) => println!("\nDeck cannot be rendered: {e}"),
    }

    Ok(())
}
