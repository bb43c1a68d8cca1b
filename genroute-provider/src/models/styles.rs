//! Prompt fragments for the general `[style]` tags.

use once_cell::sync::Lazy;
use regex::Regex;

static FIRST_TAG: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\[.+?\]").ok());

const GENERAL_STYLES: &[(&str, &str)] = &[
    (
        "[pop-anime-style]",
        "Generate in modern pop hand-drawn 2D anime style, as if from a modern Japanese anime. \
         Use flat coloring, and flat cel-shading. Do not include text or any watermark.",
    ),
    (
        "[retro-anime-style]",
        "Generate in late 1980s / early 1990s hand-drawn 2D vintage anime style, as if from a \
         vintage Japanese anime. Use flat coloring, flat cel-shading, bold outlines, slightly \
         muted and slightly warm colors, and slightly grainy texture. Do not include text or any \
         watermark.",
    ),
    (
        "[semi-realistic-portrait-style]",
        "Generate in a pretty Korean manhwa-inspired semi-realistic soft glossy digital \
         illustration style, with lips also being glossy.",
    ),
    (
        "[soft-pastel-style]",
        "Generate using the soft pastel art style, use soft pastel colors, gentle shading, \
         slightly muted palette.",
    ),
    (
        "[watercolor-illustration-style]",
        "Generate using the painterly watercolor style, where colors are layered with soft \
         gradients, the art has visible brushstroke-like textures, softened delicate linework, \
         shadows are painted in cool hues (bluish or purplish), while highlights are soft and \
         luminous.",
    ),
    (
        "[iridescent-style]",
        "Generate using the shimmering art style, with prominent iridescent light reflections on \
         places like hair, soft glow, glossy shading, delicate linework, luminous highlights, \
         shimmering light reflections.",
    ),
    (
        "[flat-illustration-style]",
        "Generate in flat-color anime-style vector art with no linework, no gradient, only flat \
         color blocks. Remove all outlines from input image if any.",
    ),
    (
        "[doodle-style]",
        "Draw in minimalist chibi anime doodle style with thick lines, use extremely minimal \
         simple doodle drawing and flat coloring.",
    ),
    (
        "[chibi-sticker-style]",
        "Draw in flat chibi style, with chibi super deformed character in 2-head proportion, \
         thick lines, flat coloring with only flat color blocks, and very minimalist simple \
         drawing.",
    ),
    (
        "[glossy-chibi-style]",
        "Draw in glossy chibi anime style with thick lines and glossy coloring, use minimal \
         simple drawing and very chibi proportions.",
    ),
    (
        "[muscular-manhwa-style]",
        "Illustrate in the style of a Korean manhwa with male character being very handsome, \
         with broad shoulders, sharp facial features, and expressive eyes. Use semi-realistic \
         rendering with clean linework, polished shading, and manhwa aesthetic.",
    ),
    (
        "[manhwa-style]",
        "Illustrate in the style of beautiful manhwa webtoon with semi-realistic drawing, soft \
         shading, cinematic panel feel, and polished professional finish, use very classic \
         manhwa style.",
    ),
    (
        "[action-manga-style]",
        "Illustrate in the style of shonen manga, with bold energetic linework, expressive \
         dramatic poses and expressions, high contrast coloring, cinematic lighting.",
    ),
    (
        "[grayscale-manga-style]",
        "Illustrate in the style of black and white Japanese manga.",
    ),
    (
        "[3d-anime-style]",
        "Render as 3D model asset in 3D game engine, with smooth 3D polygonal modeling, glossy \
         textures, 3D game engine model rendering, soft studio lighting, and 3D engine glow, \
         bloom, reflections effects.",
    ),
    (
        "[minimalist-style]",
        "Illustrate in minimalist art style, with flat coloring, only flat color blocks, thick \
         lines, and very minimal simple drawing.",
    ),
    (
        "[soft-pixel-art-style]",
        "Illustrate in pixel art style with soft color palette.",
    ),
    (
        "[digital-painterly-style]",
        "Illustrate in digital painterly style, with soft graphite lineart combined, muted pastel \
         palette, semi-realistic digital art.",
    ),
    (
        "[gothic-oil-painting-style]",
        "Illustrate in gothic oil painting style with thick oil painterly texture, with slightly \
         muted pastel colors and soft lighting, anime-inspired gothic oil painting.",
    ),
    (
        "[pop-sketch-style]",
        "Illustrate in rough anime sketch style, loose hand-drawn lineart, flat muted \
         multi-shaded gray or blue colors, minimal shading, casual anime-style doodle.",
    ),
    (
        "[ukiyo-e-style]",
        "Illustrate in Ukiyo-e art style, with flat color scene, bold outlines, muted earth tones \
         and intricate patterns.",
    ),
    (
        "[retro-comic-dots-style]",
        "Illustrate in retro comic art style with Ben-Day dots and exaggerated features.",
    ),
    (
        "[cyberpunk-style]",
        "Illustrate in futuristic cyberpunk style with high-contrast lighting, glitch effects, \
         and neon lights.",
    ),
];

/// Fragment for the first `[tag]` in `prompt`, if that tag is a general style
pub fn general_style_prompt(prompt: &str) -> Option<&'static str> {
    let tag = FIRST_TAG.as_ref()?.find(prompt)?.as_str();
    GENERAL_STYLES
        .iter()
        .find(|(known, _)| *known == tag)
        .map(|(_, fragment)| *fragment)
}
