use droplet_core::consts::DEFAULT_RAW_LOG_CAPACITY;
use droplet_core::controller::{ExportFormat, RawMeasurementLog, RawRecord, RAW_COLUMNS};

fn record(frame_id: u64) -> RawRecord {
    RawRecord {
        timestamp_ms: 1_000 + frame_id,
        frame_id,
        radius_px: 5.0,
        radius_um: 10.0,
        area_px: 78.54,
        area_um2: 314.16,
        x_center_px: 12.345,
        y_center_px: 7.0,
        major_axis_px: 11.0,
        major_axis_um: 22.0,
        equivalent_diameter_px: 10.0,
        equivalent_diameter_um: 20.0,
    }
}

#[test]
fn test_format_parsing() {
    assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
    assert_eq!("txt".parse::<ExportFormat>().unwrap(), ExportFormat::Txt);
    let err = "xml".parse::<ExportFormat>().unwrap_err().to_string();
    assert!(err.contains("csv") && err.contains("txt"));
}

#[test]
fn test_empty_log_exports_nothing() {
    let log = RawMeasurementLog::new(4);
    assert!(log.export(ExportFormat::Csv).is_none());
}

#[test]
fn test_export_layout() {
    let mut log = RawMeasurementLog::new(4);
    log.push(record(3));
    let csv = log.export(ExportFormat::Csv).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], RAW_COLUMNS.join(","));
    assert!(lines[1].starts_with("1003,3,5.00,10.00,78.54"));
    assert_eq!(lines[1].split(',').count(), RAW_COLUMNS.len());

    let txt = log.export(ExportFormat::Txt).unwrap();
    assert_eq!(txt.lines().nth(1).unwrap().split('\t').count(), RAW_COLUMNS.len());
}

#[test]
fn test_cap_evicts_oldest() {
    let mut log = RawMeasurementLog::new(3);
    for id in 0..5 {
        log.push(record(id));
    }
    assert_eq!(log.len(), 3);
    assert_eq!(log.oldest().unwrap().frame_id, 2);
    assert_eq!(log.newest().unwrap().frame_id, 4);

    log.set_capacity(2);
    let ids: Vec<u64> = log.records().iter().map(|r| r.frame_id).collect();
    assert_eq!(ids, vec![3, 4]);
}

#[test]
fn test_default_capacity_keeps_newest_ten_thousand() {
    let mut log = RawMeasurementLog::new(DEFAULT_RAW_LOG_CAPACITY);
    for id in 0..10_050 {
        log.push(record(id));
    }
    assert_eq!(log.len(), 10_000);
    assert_eq!(log.oldest().unwrap().frame_id, 50);
    assert_eq!(log.newest().unwrap().frame_id, 10_049);

    let csv = log.export(ExportFormat::Csv).unwrap();
    assert_eq!(csv.lines().count(), 10_001);
    assert!(csv.lines().nth(1).unwrap().starts_with("1050,50,"));
}
