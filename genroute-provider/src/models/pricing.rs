//! Pricing tables, in zaps.

/// Standard 20% discount, rounded up
pub const fn discount(count: u64) -> u64 {
    (count * 4 + 4) / 5
}

pub fn dollars_to_zaps(dollars: f64) -> u64 {
    (dollars * 2000.0).round() as u64
}

pub const IMAGE_TO_VIDEO_MINIMAX: u64 = discount(540);
pub const IMAGE_TO_VIDEO_RAY: u64 = discount(1000);
pub const IMAGE_TO_VIDEO_WAN_720P: u64 = discount(200);
pub const IMAGE_TO_VIDEO_WAN_1080P: u64 = discount(300);

pub const VIDEO_UPSCALE: u64 = discount(600);
/// Per second beyond the first four
pub const VIDEO_UPSCALE_UNIT: u64 = discount(130);
pub const IN_BETWEEN: u64 = discount(124);

pub const IMAGE_SEEDREAM: u64 = 55;
pub const IMAGE_SEEDREAM_V4: u64 = 50;
pub const IMAGE_KUSAXL: u64 = 20;

/// Per-second rates for video-to-video models
pub const RAY_FLASH_PER_SECOND: f64 = 150.0;
pub const ACT_TWO_PER_SECOND: f64 = 80.0;

/// Seedance is billed per token: $2.4 per million
const SEEDANCE_MILLION_TOKENS: f64 = 2.4;
const SEEDANCE_FPS: f64 = 24.0;

pub fn wan(duration: Option<f64>, resolution: Option<&str>) -> u64 {
    let seconds = duration.filter(|d| *d > 0.0).unwrap_or(5.0);
    let unit = match resolution {
        Some("1080p") => IMAGE_TO_VIDEO_WAN_1080P,
        _ => IMAGE_TO_VIDEO_WAN_720P,
    };
    (unit as f64 * seconds) as u64
}

pub fn video_upscale(duration: Option<f64>) -> u64 {
    let seconds = duration.filter(|d| *d > 0.0).unwrap_or(1.0);
    let remain = (seconds - 4.0).max(0.0);
    (remain * VIDEO_UPSCALE_UNIT as f64).ceil() as u64 + VIDEO_UPSCALE
}

/// One unit per gap between consecutive keyframes
pub fn in_between(images: usize) -> u64 {
    let count = images.max(2) as u64;
    IN_BETWEEN * (count - 1)
}

/// `duration` defaults to three seconds
pub fn video_to_video(per_second: f64, duration: Option<f64>) -> u64 {
    let seconds = duration.filter(|d| *d > 0.0).unwrap_or(3.0);
    (seconds * per_second).floor() as u64
}

/// Flat price by clip length
pub fn vidu_text_to_video(duration: Option<f64>) -> u64 {
    match duration.unwrap_or(5.0) {
        d if d == 5.0 => 200,
        _ => 400,
    }
}

pub fn seedance(duration: Option<f64>, resolution: Option<&str>, aspect_ratio: Option<&str>) -> u64 {
    let seconds = duration.filter(|d| *d > 0.0).unwrap_or(5.0);
    let (width, height) = video_size(aspect_ratio.unwrap_or("16:9"), resolution.unwrap_or("480p"));
    let unit = dollars_to_zaps(SEEDANCE_MILLION_TOKENS) as f64 / 1_000_000.0;
    (unit * width as f64 * height as f64 * seconds * SEEDANCE_FPS / 1024.0).round() as u64
}

/// Frame size used for token billing
pub fn video_size(aspect_ratio: &str, resolution: &str) -> (u32, u32) {
    match (resolution, aspect_ratio) {
        ("480p", "16:9") => (864, 480),
        ("480p", "4:3") => (736, 544),
        ("480p", "1:1") => (640, 640),
        ("480p", "3:4") => (544, 736),
        ("480p", "9:16") => (480, 864),
        ("480p", "21:9") => (960, 416),
        ("720p", "16:9") => (1248, 704),
        ("720p", "4:3") => (1120, 832),
        ("720p", "1:1") => (960, 960),
        ("720p", "3:4") => (832, 1120),
        ("720p", "9:16") => (704, 1248),
        ("720p", "21:9") => (1504, 640),
        ("1080p", "16:9") => (1920, 1088),
        ("1080p", "4:3") => (1664, 1248),
        ("1080p", "1:1") => (1440, 1440),
        ("1080p", "3:4") => (1248, 1664),
        ("1080p", "9:16") => (1088, 1920),
        ("1080p", "21:9") => (2176, 928),
        _ => {
            let height: u32 = resolution.trim_end_matches('p').parse().unwrap_or(480);
            let (w, h) = aspect_ratio
                .split_once(':')
                .and_then(|(w, h)| Some((w.parse::<f64>().ok()?, h.parse::<f64>().ok()?)))
                .filter(|(_, h)| *h > 0.0)
                .unwrap_or((16.0, 9.0));
            ((height as f64 * w / h).round() as u32, height)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_rounds_up() {
        assert_eq!(discount(540), 432);
        assert_eq!(discount(124), 100);
        assert_eq!(discount(130), 104);
        assert_eq!(discount(1), 1);
    }

    #[test]
    fn test_wan_scales_with_duration() {
        assert_eq!(wan(None, None), 800);
        assert_eq!(wan(Some(10.0), Some("1080p")), 2400);
    }

    #[test]
    fn test_upscale_charges_beyond_four_seconds() {
        assert_eq!(video_upscale(None), 480);
        assert_eq!(video_upscale(Some(4.0)), 480);
        assert_eq!(video_upscale(Some(6.5)), 480 + 260);
    }

    #[test]
    fn test_in_between_counts_gaps() {
        assert_eq!(in_between(0), 100);
        assert_eq!(in_between(4), 300);
    }

    #[test]
    fn test_video_to_video_floors() {
        assert_eq!(video_to_video(RAY_FLASH_PER_SECOND, None), 450);
        assert_eq!(video_to_video(ACT_TWO_PER_SECOND, Some(4.5)), 360);
    }

    #[test]
    fn test_seedance_token_billing() {
        assert_eq!(seedance(None, None, None), 233);
        assert!(seedance(Some(5.0), Some("720p"), None) > seedance(Some(5.0), Some("480p"), None));
    }

    #[test]
    fn test_unlisted_video_size_is_derived() {
        assert_eq!(video_size("16:9", "360p"), (640, 360));
    }
}
