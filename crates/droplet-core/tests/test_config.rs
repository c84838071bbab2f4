use droplet_core::config::{BackgroundMethod, ConfigPatch, DetectionConfig};
use droplet_core::error::DetectorError;

#[test]
fn test_default_is_valid() {
    DetectionConfig::default().validate().unwrap();
    for name in DetectionConfig::PRESETS {
        DetectionConfig::preset(name).unwrap().validate().unwrap();
    }
}

#[test]
fn test_validate_collects_all_errors() {
    let cfg = DetectionConfig {
        min_area: 100.0,
        max_area: 50.0,
        histogram_bins: 0,
        morph_kernel_size: 4,
        ..DetectionConfig::default()
    };
    match cfg.validate() {
        Err(DetectorError::InvalidConfig(errors)) => assert_eq!(errors.len(), 3),
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

#[test]
fn test_nan_is_rejected() {
    let cfg = DetectionConfig {
        min_motion: f64::NAN,
        ..DetectionConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_patch_applies_only_present_fields() {
    let base = DetectionConfig::default();
    let patch = ConfigPatch {
        min_area: Some(40.0),
        ..ConfigPatch::default()
    };
    let next = patch.apply(&base).unwrap();
    assert_eq!(next.min_area, 40.0);
    assert_eq!(next.max_area, base.max_area);
}

#[test]
fn test_patch_rejects_out_of_range() {
    let base = DetectionConfig::default();
    let patch = ConfigPatch {
        histogram_window_size: Some(0),
        ..ConfigPatch::default()
    };
    assert!(patch.apply(&base).is_err());
}

#[test]
fn test_patch_from_json_rejects_unknown_keys() {
    let value = serde_json::json!({ "min_area": 10, "bogus": 1 });
    assert!(ConfigPatch::from_json(&value).is_err());
}

#[test]
fn test_patch_accepts_pixel_ratio_alias() {
    let value = serde_json::json!({ "pixel_ratio": 2.5 });
    let patch = ConfigPatch::from_json(&value).unwrap();
    assert_eq!(patch.um_per_px, Some(2.5));
}

#[test]
fn test_kernel_sizes_accept_square_pairs() {
    let value = serde_json::json!({ "gaussian_blur_kernel": [15, 15], "morph_kernel_size": [5, 5] });
    let config: DetectionConfig = serde_json::from_value(value).unwrap();
    assert_eq!(config.blur_kernel_size, 15);
    assert_eq!(config.morph_kernel_size, 5);

    let patch = ConfigPatch::from_json(&serde_json::json!({ "morph_kernel_size": [7, 7] })).unwrap();
    assert_eq!(patch.morph_kernel_size, Some(7));

    let skewed = serde_json::json!({ "morph_kernel_size": [3, 5] });
    assert!(serde_json::from_value::<DetectionConfig>(skewed).is_err());
}

#[test]
fn test_frame_diff_threshold_range() {
    let patch = ConfigPatch {
        use_frame_diff: Some(true),
        frame_diff_threshold: Some(300.0),
        ..ConfigPatch::default()
    };
    assert!(patch.apply(&DetectionConfig::default()).is_err());

    let patch = ConfigPatch::from_json(&serde_json::json!({
        "use_frame_diff": true,
        "frame_diff_threshold": 12
    }))
    .unwrap();
    let next = patch.apply(&DetectionConfig::default()).unwrap();
    assert!(next.use_frame_diff);
    assert_eq!(next.frame_diff_threshold, 12.0);
}

#[test]
fn test_channel_band_set_and_clear() {
    let base = DetectionConfig::default();
    let set = ConfigPatch {
        channel_band: Some((10, 40)),
        ..ConfigPatch::default()
    };
    let with_band = set.apply(&base).unwrap();
    assert_eq!(with_band.channel_band, Some((10, 40)));
    let clear = ConfigPatch {
        clear_channel_band: Some(true),
        ..ConfigPatch::default()
    };
    assert_eq!(clear.apply(&with_band).unwrap().channel_band, None);
}

#[test]
fn test_change_detection() {
    let a = DetectionConfig::default();
    let b = DetectionConfig {
        histogram_bins: 20,
        ..a.clone()
    };
    assert!(a.histogram_shape_changed(&b));
    assert!(!a.background_changed(&b));
    let c = DetectionConfig {
        background_method: BackgroundMethod::Highpass,
        ..a.clone()
    };
    assert!(a.background_changed(&c));
}
