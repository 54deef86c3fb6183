//! Slide markup generation.
//!
//! Each layout maps its content fields to a fixed HTML structure. The raster
//! worker only sees the finished document. All slide text is escaped here.

use std::path::Path;

use deckreel_deck_model::deck::{ImagePlacement, Slide, SlideContent, SlideLayout};

use crate::media::resolve_media_path;

/// Rendering context shared by every slide of a job.
#[derive(Debug, Clone, Copy)]
pub struct MarkupContext<'a> {
    pub width: u32,
    pub height: u32,
    pub theme_background: Option<&'a str>,
    pub media_root: &'a Path,
}

const DEFAULT_BACKGROUND: &str = "#ffffff";

/// Render a full HTML document for `slide`.
pub fn render_slide_html(slide: &Slide, ctx: &MarkupContext<'_>) -> String {
    let content = &slide.content;
    let background = content
        .background_color
        .as_deref()
        .and_then(css_color)
        .or_else(|| ctx.theme_background.and_then(css_color))
        .unwrap_or_else(|| DEFAULT_BACKGROUND.to_string());

    let body = match slide.layout {
        SlideLayout::TitleOnly => title_only(content),
        SlideLayout::TitleBody => title_body(content),
        SlideLayout::TitleBullets => title_bullets(content),
        SlideLayout::TwoColumn => two_column(content),
        SlideLayout::Centered => centered(content),
        SlideLayout::Quote => quote(content),
        SlideLayout::StatsGrid => stats_grid(content),
        SlideLayout::Comparison => comparison(content),
        SlideLayout::ImageText => image_text(content, ctx),
    };

    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><style>{style}</style></head>\
         <body><main class=\"slide layout-{layout}\" style=\"background-color: {background};\">{body}</main></body></html>\n",
        style = base_style(ctx.width, ctx.height),
        layout = slide.layout.as_str(),
    )
}

/// Escape text for HTML element and attribute context.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Accept only characters a CSS color value can contain.
fn css_color(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let ok = !trimmed.is_empty()
        && trimmed.len() <= 64
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "#(),.% ".contains(c));
    ok.then(|| trimmed.to_string())
}

fn base_style(width: u32, height: u32) -> String {
    format!(
        "html,body{{margin:0;padding:0;width:{width}px;height:{height}px;overflow:hidden;}}\
         .slide{{position:relative;box-sizing:border-box;width:{width}px;height:{height}px;padding:6%;\
         font-family:sans-serif;color:#1a1a1a;display:flex;flex-direction:column;\
         background-size:cover;background-position:center;}}\
         h1{{font-size:3.2em;margin:0 0 .4em;}}h2{{font-size:1.8em;margin:0 0 .6em;font-weight:400;}}\
         .body{{font-size:1.6em;line-height:1.4;}}\
         ul{{font-size:1.6em;line-height:1.5;}}\
         .columns{{display:flex;gap:4%;flex:1;}}.columns>div{{flex:1;font-size:1.5em;}}\
         .centered{{align-items:center;justify-content:center;text-align:center;}}\
         blockquote{{font-size:2.4em;font-style:italic;margin:auto 0;}}cite{{display:block;font-size:.6em;margin-top:1em;}}\
         .stats{{display:grid;grid-template-columns:repeat(auto-fit,minmax(200px,1fr));gap:4%;flex:1;align-content:center;}}\
         .stat .value{{font-size:3.6em;font-weight:700;}}.stat .label{{font-size:1.3em;}}\
         .image-side{{display:flex;gap:4%;flex:1;align-items:center;}}.image-side img{{max-width:48%;max-height:100%;object-fit:contain;}}\
         .overlay{{background:rgba(255,255,255,.75);padding:2em;}}"
    )
}

fn heading(content: &SlideContent) -> String {
    let mut out = String::new();
    if let Some(title) = non_blank(&content.title) {
        out.push_str(&format!("<h1>{}</h1>", escape_html(title)));
    }
    if let Some(subtitle) = non_blank(&content.subtitle) {
        out.push_str(&format!("<h2>{}</h2>", escape_html(subtitle)));
    }
    out
}

fn paragraph(text: &Option<String>) -> String {
    non_blank(text)
        .map(|body| format!("<div class=\"body\">{}</div>", escape_html(body)))
        .unwrap_or_default()
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return String::new();
    }
    let lis: String = items
        .iter()
        .map(|item| format!("<li>{}</li>", escape_html(item)))
        .collect();
    format!("<ul>{lis}</ul>")
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn title_only(content: &SlideContent) -> String {
    format!("<div class=\"centered\">{}</div>", heading(content))
}

fn title_body(content: &SlideContent) -> String {
    format!("{}{}", heading(content), paragraph(&content.body))
}

fn title_bullets(content: &SlideContent) -> String {
    format!("{}{}", heading(content), bullet_list(&content.bullets))
}

fn two_column(content: &SlideContent) -> String {
    let column = |text: &Option<String>| {
        format!(
            "<div>{}</div>",
            non_blank(text).map(escape_html).unwrap_or_default()
        )
    };
    format!(
        "{}<div class=\"columns\">{}{}</div>",
        heading(content),
        column(&content.left_column),
        column(&content.right_column)
    )
}

fn centered(content: &SlideContent) -> String {
    format!(
        "<div class=\"centered\" style=\"flex:1;display:flex;flex-direction:column;\">{}{}</div>",
        heading(content),
        paragraph(&content.body)
    )
}

fn quote(content: &SlideContent) -> String {
    let text = non_blank(&content.quote)
        .or(non_blank(&content.body))
        .map(escape_html)
        .unwrap_or_default();
    let cite = non_blank(&content.attribution)
        .map(|a| format!("<cite>{}</cite>", escape_html(a)))
        .unwrap_or_default();
    format!("<blockquote>{text}{cite}</blockquote>")
}

fn stats_grid(content: &SlideContent) -> String {
    let cells: String = content
        .stats
        .iter()
        .map(|stat| {
            format!(
                "<div class=\"stat\"><div class=\"value\">{}</div><div class=\"label\">{}</div></div>",
                escape_html(&stat.value),
                escape_html(&stat.label)
            )
        })
        .collect();
    format!("{}<div class=\"stats\">{cells}</div>", heading(content))
}

fn comparison(content: &SlideContent) -> String {
    let sides = match &content.comparison {
        Some(cmp) => [&cmp.left, &cmp.right]
            .iter()
            .map(|side| {
                format!(
                    "<div class=\"side\"><h2>{}</h2>{}</div>",
                    escape_html(&side.heading),
                    bullet_list(&side.items)
                )
            })
            .collect::<String>(),
        None => String::new(),
    };
    format!("{}<div class=\"columns comparison\">{sides}</div>", heading(content))
}

fn image_text(content: &SlideContent, ctx: &MarkupContext<'_>) -> String {
    let text = format!(
        "{}{}{}",
        heading(content),
        paragraph(&content.body),
        bullet_list(&content.bullets)
    );
    let Some(image) = content.image.as_ref().filter(|i| !i.src.trim().is_empty()) else {
        return text;
    };
    let src = escape_html(&image_url(&image.src, ctx.media_root));

    match image.placement {
        ImagePlacement::Background => format!(
            "<div class=\"background\" style=\"position:absolute;inset:0;background-image:url(&quot;{src}&quot;);\
             background-size:cover;background-position:center;\"></div>\
             <div class=\"overlay\" style=\"position:relative;\">{text}</div>"
        ),
        ImagePlacement::Left => {
            format!("<div class=\"image-side\"><img src=\"{src}\" alt=\"\"><div>{text}</div></div>")
        }
        ImagePlacement::Right => {
            format!("<div class=\"image-side\"><div>{text}</div><img src=\"{src}\" alt=\"\"></div>")
        }
    }
}

/// URLs pass through; file paths become `file://` URLs under the media root.
fn image_url(src: &str, media_root: &Path) -> String {
    let src = src.trim();
    if src.contains("://") || src.starts_with("data:") {
        src.to_string()
    } else {
        format!("file://{}", resolve_media_path(media_root, src).display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckreel_deck_model::deck::{Comparison, ComparisonSide, SlideImage, Stat};

    fn ctx() -> MarkupContext<'static> {
        MarkupContext {
            width: 1280,
            height: 720,
            theme_background: Some("#101820"),
            media_root: Path::new("/media"),
        }
    }

    fn slide(layout: SlideLayout, content: SlideContent) -> Slide {
        Slide {
            id: "s1".into(),
            position: 0,
            layout,
            content,
            duration_ms: 5000,
            narration_audio_path: None,
            video: None,
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_title_bullets_escapes_text() {
        let html = render_slide_html(
            &slide(
                SlideLayout::TitleBullets,
                SlideContent {
                    title: Some("Q3 <Plan>".into()),
                    bullets: vec!["Ship & measure".into(), "<script>".into()],
                    ..Default::default()
                },
            ),
            &ctx(),
        );
        assert!(html.contains("<h1>Q3 &lt;Plan&gt;</h1>"));
        assert!(html.contains("<li>Ship &amp; measure</li>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("layout-title-bullets"));
    }

    #[test]
    fn test_background_color_precedence() {
        let themed = render_slide_html(&slide(SlideLayout::TitleOnly, SlideContent::default()), &ctx());
        assert!(themed.contains("background-color: #101820;"));

        let own = render_slide_html(
            &slide(
                SlideLayout::TitleOnly,
                SlideContent {
                    background_color: Some("rgb(10, 20, 30)".into()),
                    ..Default::default()
                },
            ),
            &ctx(),
        );
        assert!(own.contains("background-color: rgb(10, 20, 30);"));

        let hostile = render_slide_html(
            &slide(
                SlideLayout::TitleOnly,
                SlideContent {
                    background_color: Some("red;\"><script>".into()),
                    ..Default::default()
                },
            ),
            &ctx(),
        );
        assert!(hostile.contains("background-color: #101820;"));
    }

    #[test]
    fn test_stats_and_comparison() {
        let stats = render_slide_html(
            &slide(
                SlideLayout::StatsGrid,
                SlideContent {
                    stats: vec![Stat {
                        value: "98%".into(),
                        label: "Uptime".into(),
                    }],
                    ..Default::default()
                },
            ),
            &ctx(),
        );
        assert!(stats.contains("<div class=\"value\">98%</div>"));

        let cmp = render_slide_html(
            &slide(
                SlideLayout::Comparison,
                SlideContent {
                    comparison: Some(Comparison {
                        left: ComparisonSide {
                            heading: "Before".into(),
                            items: vec!["Manual".into()],
                        },
                        right: ComparisonSide {
                            heading: "After".into(),
                            items: vec!["Automated".into()],
                        },
                    }),
                    ..Default::default()
                },
            ),
            &ctx(),
        );
        let before = cmp.find("Before").unwrap();
        let after = cmp.find("After").unwrap();
        assert!(before < after);
    }

    #[test]
    fn test_image_placement() {
        let with_image = |placement| {
            render_slide_html(
                &slide(
                    SlideLayout::ImageText,
                    SlideContent {
                        title: Some("Team".into()),
                        image: Some(SlideImage {
                            src: "img/team.png".into(),
                            placement,
                        }),
                        ..Default::default()
                    },
                ),
                &ctx(),
            )
        };

        let left = with_image(ImagePlacement::Left);
        assert!(left.find("<img").unwrap() < left.find("<h1>").unwrap());
        assert!(left.contains("file:///media/img/team.png"));

        let right = with_image(ImagePlacement::Right);
        assert!(right.find("<img").unwrap() > right.find("<h1>").unwrap());

        let background = with_image(ImagePlacement::Background);
        assert!(background.contains("background-image:url("));
        assert!(!background.contains("<img"));
    }

    #[test]
    fn test_quote_with_attribution() {
        let html = render_slide_html(
            &slide(
                SlideLayout::Quote,
                SlideContent {
                    quote: Some("Simplicity is prerequisite".into()),
                    attribution: Some("Dijkstra".into()),
                    ..Default::default()
                },
            ),
            &ctx(),
        );
        assert!(html.contains("<blockquote>Simplicity is prerequisite<cite>Dijkstra</cite></blockquote>"));
    }
}
