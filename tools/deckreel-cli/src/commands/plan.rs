//! Print the segment plan for a deck.

use deckreel_common::clock;
use deckreel_common::config::AppConfig;
use deckreel_deck_model::segment::{total_planned_ms, SegmentAudio, SegmentOrigin};
use deckreel_render_engine::media::MediaResolver;
use deckreel_render_engine::planner::SegmentPlanner;

use super::DeckSource;

pub async fn run(config: AppConfig, deck: String, json: bool) -> anyhow::Result<()> {
    let source = DeckSource::resolve(&config, &deck).await?;
    let mut bundle = source.load().await?;
    bundle
        .validate()
        .map_err(|e| anyhow::anyhow!("Deck cannot be rendered: {e}"))?;

    let resolver = MediaResolver::new(
        &source.media_root,
        &config.tools.ffprobe,
        config.render.default_probe_duration_ms,
    );
    let resolved = resolver.resolve_bundle(&mut bundle).await;
    let planner = SegmentPlanner::new(config.work_dir.join("plan"));
    let segments = planner.plan(&bundle.slides, &bundle.timeline, &resolved.media)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&segments)?);
        return Ok(());
    }

    println!("Plan for deck: {}", bundle.deck.title);
    for (i, segment) in segments.iter().enumerate() {
        let origin = match segment.origin {
            SegmentOrigin::Intro => "intro".to_string(),
            SegmentOrigin::Slide(index) => format!("slide {}", index + 1),
            SegmentOrigin::Interstitial(position) => format!("interstitial @{position}"),
            SegmentOrigin::Outro => "outro".to_string(),
        };
        let audio = match &segment.audio {
            SegmentAudio::Narration(path) => format!("narration {}", path.display()),
            SegmentAudio::Intrinsic => "clip audio".to_string(),
            SegmentAudio::Silence => "silence".to_string(),
        };
        print!(
            "  {:>3}. {origin:<18} {:?} {}s",
            i + 1,
            segment.kind,
            clock::format_secs(segment.duration_ms)
        );
        if segment.trim_start_ms.is_some() || segment.trim_end_ms.is_some() {
            print!(
                " [{}s..{}s]",
                clock::format_secs(segment.window_start_ms()),
                clock::format_secs(segment.window_end_ms())
            );
        }
        println!(" ({audio})");
    }
    println!();
    println!(
        "Total: {} segments, {}s",
        segments.len(),
        clock::format_secs(total_planned_ms(&segments))
    );
    if !resolved.updated_assets.is_empty() {
        println!("Probed {} video asset(s).", resolved.updated_assets.len());
    }

    Ok(())
}
