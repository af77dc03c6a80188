mod common;

use std::path::PathBuf;
use std::sync::Mutex;

use common::*;
use permute::batch::{output_name, run_batch};
use permute::error::ErrorSource;
use permute::verification::lvs::{LvsClient, MemoryLvs};
use permute::{FlowType, PermutationEngine, PermutationOptions, PermuteConfig};
use tempdir::TempDir;

fn memory_lvs(_cell: &str) -> permute::Result<Box<dyn LvsClient>> {
    Ok(Box::new(MemoryLvs::new()))
}

/// Writes the two-track cell under each name and returns the paths.
fn write_cells(dir: &TempDir, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.path().join(format!("{name}.json"));
            two_track_cell().write_to(&path).unwrap();
            path
        })
        .collect()
}

fn config(dir: &TempDir) -> PermuteConfig {
    PermuteConfig::builder()
        .layer_map_dir(dir.path().join("maps"))
        .output_dir(dir.path().join("out"))
        .build()
        .unwrap()
}

#[test]
fn engine_loads_gds_and_layer_map_from_disk() {
    let dir = TempDir::new("permute").unwrap();
    std::fs::create_dir_all(dir.path().join("maps")).unwrap();
    std::fs::write(dir.path().join("maps/layermap.json"), M0_LAYER_MAP).unwrap();
    let paths = write_cells(&dir, &["INVx1_3"]);

    let mut engine = PermutationEngine::from_files(
        &paths[0],
        dir.path().join("maps"),
        PermutationOptions::default(),
    )
    .unwrap();
    let mut lvs = MemoryLvs::new();
    let report = engine.run(&mut lvs).unwrap();
    assert_eq!(report.drc_clean, 2);
    for (_, gds) in lvs.candidates() {
        assert_eq!(gds.base_layout_name.as_deref(), Some("INVx1"));
    }
}

#[test]
fn bad_layer_map_does_not_stop_the_batch() {
    let dir = TempDir::new("permute").unwrap();
    std::fs::create_dir_all(dir.path().join("maps")).unwrap();
    std::fs::write(dir.path().join("maps/INVx1.json"), M0_LAYER_MAP).unwrap();
    std::fs::write(dir.path().join("maps/NAND2x1.json"), "{ not json").unwrap();
    std::fs::write(dir.path().join("maps/BUFx2.json"), M0_LAYER_MAP).unwrap();
    let paths = write_cells(&dir, &["INVx1", "NAND2x1", "BUFx2"]);

    let results = run_batch(&paths, &config(&dir), memory_lvs).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].path, paths[0]);
    assert_eq!(results[0].report.as_ref().unwrap().drc_clean, 2);
    assert_eq!(results[2].report.as_ref().unwrap().drc_clean, 2);

    let err = results[1].report.as_ref().unwrap_err();
    assert!(matches!(err.source(), ErrorSource::JsonParsing(_)));
    assert!(!err.context().is_empty());
}

#[test]
fn missing_layer_map_is_reported_per_layout() {
    let dir = TempDir::new("permute").unwrap();
    std::fs::create_dir_all(dir.path().join("maps")).unwrap();
    let paths = write_cells(&dir, &["INVx1"]);

    let results = run_batch(&paths, &config(&dir), memory_lvs).unwrap();
    let err = results[0].report.as_ref().unwrap_err();
    assert!(matches!(err.source(), ErrorSource::LayerMapNotFound(_)));
}

#[test]
fn database_flow_fails_the_whole_batch() {
    let dir = TempDir::new("permute").unwrap();
    let mut cfg = config(&dir);
    cfg.flow = FlowType::Db;
    let paths = write_cells(&dir, &["INVx1"]);
    let err = run_batch(&paths, &cfg, memory_lvs).unwrap_err();
    assert!(matches!(err.source(), ErrorSource::InvalidArgs(_)));
}

#[test]
fn limiter_from_config_applies_to_every_layout() {
    let dir = TempDir::new("permute").unwrap();
    std::fs::create_dir_all(dir.path().join("maps")).unwrap();
    std::fs::write(dir.path().join("maps/layermap.json"), M0_LAYER_MAP).unwrap();
    let paths = write_cells(&dir, &["INVx1", "BUFx2"]);

    let mut cfg = config(&dir);
    cfg.limiter = Some(1);
    let results = run_batch(&paths, &cfg, memory_lvs).unwrap();
    for r in results {
        assert_eq!(r.report.unwrap().accepted.len(), 1);
    }
}

#[test]
fn layouts_from_one_base_cell_get_separate_clients() {
    let dir = TempDir::new("permute").unwrap();
    std::fs::create_dir_all(dir.path().join("maps")).unwrap();
    std::fs::write(dir.path().join("maps/INVx1.json"), M0_LAYER_MAP).unwrap();
    let paths = write_cells(&dir, &["INVx1_1", "INVx1_2"]);
    assert_eq!(output_name(&paths[0]), "INVx1_1");

    let names = Mutex::new(Vec::new());
    let results = run_batch(&paths, &config(&dir), |name| {
        names.lock().unwrap().push(name.to_string());
        memory_lvs(name)
    })
    .unwrap();
    assert!(results.iter().all(|r| r.is_ok()));

    let mut names = names.into_inner().unwrap();
    names.sort();
    assert_eq!(names, vec!["INVx1_1", "INVx1_2"]);
}

#[test]
fn duplicate_input_names_fail_the_batch() {
    let dir = TempDir::new("permute").unwrap();
    std::fs::create_dir_all(dir.path().join("a")).unwrap();
    std::fs::create_dir_all(dir.path().join("b")).unwrap();
    let paths = vec![dir.path().join("a/INVx1.json"), dir.path().join("b/INVx1.json")];
    let err = run_batch(&paths, &config(&dir), memory_lvs).unwrap_err();
    assert!(matches!(err.source(), ErrorSource::InvalidArgs(_)));
}
