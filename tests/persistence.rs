//! Saving solved calculations and loading them again.
use flowopt::calculation::Calculation;
use flowopt::math_model::solver::SolverSettings;
use flowopt::output::{load_infos, load_metadata, load_results};
use tempfile::tempdir;

use demo_system::*;

#[test]
fn test_save_and_load_calculation() {
    let mut system = reference_system(time_axis(), true);
    let solved = Calculation::new("saved", &mut system, None)
        .unwrap()
        .model_full()
        .unwrap()
        .solve(&SolverSettings::default())
        .unwrap();

    let dir = tempdir().unwrap();
    solved.save(dir.path(), false).unwrap();

    let results = load_results(dir.path(), "saved").unwrap();
    assert_eq!(&results, solved.results());

    let infos = load_infos(dir.path(), "saved").unwrap();
    assert_eq!(infos.calculation.name, "saved");
    assert_eq!(infos.calculation.mode, solved.infos().calculation.mode);
    assert_eq!(infos.system_models.len(), 1);

    let metadata = load_metadata(dir.path(), "saved").unwrap();
    assert_eq!(metadata.program.name, "flowopt");

    // Saving again needs permission to overwrite
    assert!(solved.save(dir.path(), false).is_err());
    solved.save(dir.path(), true).unwrap();
}
