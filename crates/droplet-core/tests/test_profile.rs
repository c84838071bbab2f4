use droplet_core::config::{BackgroundMethod, DetectionConfig, MorphOperation, ThresholdMethod};
use droplet_core::error::DetectorError;
use droplet_core::profile::{load_profile, save_profile, ProfileLayout};

#[test]
fn test_toml_profile_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = DetectionConfig {
        background_method: BackgroundMethod::Highpass,
        channel_band: Some((12, 48)),
        accept_entering: true,
        ..DetectionConfig::preset("small_droplets").unwrap()
    };

    for (name, layout) in [
        ("flat.toml", ProfileLayout::Flat),
        ("nested.toml", ProfileLayout::Nested),
        ("flat.json", ProfileLayout::Flat),
    ] {
        let path = dir.path().join(name);
        save_profile(&config, &path, layout).unwrap();
        assert_eq!(load_profile(&path).unwrap(), config, "{name}");
    }

    let nested = std::fs::read_to_string(dir.path().join("nested.toml")).unwrap();
    assert!(nested.contains("[droplet_detection]"));
    assert!(nested.contains("droplet_analysis = true"));
}

#[test]
fn test_legacy_json_profile() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.json");
    std::fs::write(
        &path,
        r#"{
            "modules": { "droplet_analysis": true, "flow_control": false },
            "droplet_detection": {
                "min_area": 15,
                "max_area": 900,
                "pixel_ratio": 0.8,
                "histogram_window_size": 500,
                "legacy_option": "ignored"
            }
        }"#,
    )
    .unwrap();

    let config = load_profile(&path).unwrap();
    assert_eq!(config.min_area, 15.0);
    assert_eq!(config.max_area, 900.0);
    assert_eq!(config.um_per_px, 0.8);
    assert_eq!(config.histogram_window_size, 500);
    assert_eq!(config.histogram_bins, DetectionConfig::default().histogram_bins);
}

#[test]
fn test_invalid_profile_not_saved_or_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");

    let bad = DetectionConfig {
        min_area: 50.0,
        max_area: 10.0,
        ..DetectionConfig::default()
    };
    assert!(save_profile(&bad, &path, ProfileLayout::Flat).is_err());
    assert!(!path.exists());

    std::fs::write(&path, r#"{ "blur_kernel_size": 8, "histogram_bins": 0 }"#).unwrap();
    match load_profile(&path).unwrap_err() {
        DetectorError::InvalidConfig(errors) => assert_eq!(errors.len(), 2),
        other => panic!("unexpected error {other}"),
    }

    assert!(load_profile(&dir.path().join("missing.json")).is_err());
}

#[test]
fn test_presets_are_valid() {
    for name in DetectionConfig::PRESETS {
        let preset = DetectionConfig::preset(name).unwrap();
        preset.validate().unwrap();
    }
    assert!(DetectionConfig::preset("giant_droplets").is_none());
}

/// Every key in the layout older profiles were written with, including
/// square kernel pairs and the `adaptive_C` spelling.
const LEGACY_PROFILE_KEYS: &str = r#"
    "background_method": "highpass",
    "background_frames": 25,
    "gaussian_blur_kernel": [15, 15],
    "threshold_method": "adaptive",
    "adaptive_block_size": 13,
    "adaptive_C": 5,
    "morph_kernel_size": [5, 5],
    "morph_operation": "both",
    "min_area": 30,
    "max_area": 4000,
    "min_aspect_ratio": 1.2,
    "max_aspect_ratio": 8.0,
    "channel_band_margin": 12,
    "min_motion": 1.0,
    "max_perp_drift": 4.0,
    "use_frame_diff": true,
    "frame_diff_threshold": 40,
    "min_contour_points": 6,
    "histogram_window_size": 1500,
    "histogram_bins": 30,
    "pixel_ratio": 0.65
"#;

fn assert_legacy_values(config: &DetectionConfig) {
    assert_eq!(config.background_method, BackgroundMethod::Highpass);
    assert_eq!(config.background_frames, 25);
    assert_eq!(config.blur_kernel_size, 15);
    assert_eq!(config.threshold_method, ThresholdMethod::Adaptive);
    assert_eq!(config.adaptive_block_size, 13);
    assert_eq!(config.adaptive_c, 5.0);
    assert_eq!(config.morph_kernel_size, 5);
    assert_eq!(config.morph_operation, MorphOperation::Both);
    assert_eq!(config.min_area, 30.0);
    assert_eq!(config.channel_band_margin, 12);
    assert!(config.use_frame_diff);
    assert_eq!(config.frame_diff_threshold, 40.0);
    assert_eq!(config.min_contour_points, 6);
    assert_eq!(config.histogram_window_size, 1500);
    assert_eq!(config.histogram_bins, 30);
    assert_eq!(config.um_per_px, 0.65);
}

#[test]
fn test_legacy_profile_with_kernel_pairs() {
    let dir = tempfile::tempdir().unwrap();

    let flat = dir.path().join("flat.json");
    std::fs::write(&flat, format!("{{{LEGACY_PROFILE_KEYS}}}")).unwrap();
    let nested = dir.path().join("nested.json");
    std::fs::write(
        &nested,
        format!(
            r#"{{ "modules": {{ "droplet_analysis": true }},
                 "droplet_detection": {{{LEGACY_PROFILE_KEYS}}} }}"#
        ),
    )
    .unwrap();

    let from_flat = load_profile(&flat).unwrap();
    assert_legacy_values(&from_flat);
    assert_eq!(load_profile(&nested).unwrap(), from_flat);

    // Saved again in the current layout, it reads back identically.
    let resaved = dir.path().join("resaved.json");
    save_profile(&from_flat, &resaved, ProfileLayout::Flat).unwrap();
    assert_eq!(load_profile(&resaved).unwrap(), from_flat);
}
