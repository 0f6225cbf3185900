//! End-to-end tests: weather reading to trained estimator to evaluated risk.

use approx::assert_relative_eq;
use turbulence_risk_core::training::RecordingObserver;
use turbulence_risk_core::weather::Location;
use turbulence_risk_core::{
    evaluate, evaluate_dataset, heuristic_risk, train, train_with_observer, Celsius, Dataset,
    Hectopascals, MetersPerSecond, RiskError, RiskEstimator, SampleBuilder, StaticWeather,
    TrainingConfig,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn reference_dataset() -> Dataset {
    SampleBuilder::default().build(0.42)
}

#[test]
fn reference_scenario_trains_for_full_budget() {
    init_tracing();
    let dataset = reference_dataset();
    assert_eq!(dataset.len(), 7);

    let config = TrainingConfig::default().with_seed(2024);
    let (estimator, history) = train(&dataset, &config).unwrap();

    assert_eq!(history.len(), 1000);
    assert_eq!(history.total().len(), history.data().len());
    assert_eq!(history.data().len(), history.physics().len());
    for record in history.records() {
        assert!(record.total.is_finite());
        assert!(record.data.is_finite() && record.data >= 0.0);
        assert!(record.physics.is_finite() && record.physics >= 0.0);
    }
    assert!(history.max_recombination_error() < 1e-6);

    // Losses stay bounded and training makes progress
    let first = history.total()[0];
    let ceiling = 10.0 * first.max(1.0);
    assert!(history.total().iter().all(|&t| t < ceiling), "ceiling={ceiling}");
    let last = history.last().unwrap();
    assert!(last.total <= first, "first={first}, last={}", last.total);

    let risk = evaluate(&estimator, &dataset.features()).unwrap();
    assert!(risk.is_finite());
    assert!((-0.5..=1.5).contains(&risk), "risk={risk}");
}

#[test]
fn seeded_runs_are_reproducible() {
    let dataset = reference_dataset();
    let config = TrainingConfig::default()
        .with_epochs(40)
        .with_hidden_dim(10)
        .with_seed(11);

    let (first_model, first) = train(&dataset, &config).unwrap();
    let (second_model, second) = train(&dataset, &config).unwrap();

    assert_eq!(first, second);
    assert_eq!(first_model, second_model);
}

#[test]
fn zero_epochs_returns_untrained_estimator() {
    let dataset = reference_dataset();
    let config = TrainingConfig::default()
        .with_epochs(0)
        .with_hidden_dim(12)
        .with_seed(5);

    let (estimator, history) = train(&dataset, &config).unwrap();

    assert!(history.is_empty());
    assert_eq!(estimator, RiskEstimator::seeded(12, 5).unwrap());
}

#[test]
fn history_length_matches_epochs() {
    let dataset = reference_dataset();
    for epochs in [1, 2, 17] {
        let config = TrainingConfig::default()
            .with_epochs(epochs)
            .with_hidden_dim(6)
            .with_seed(1);
        let mut recorder = RecordingObserver::new();
        let (_, history) = train_with_observer(&dataset, &config, &mut recorder).unwrap();
        assert_eq!(history.len(), epochs);
        assert_eq!(recorder.reports().len(), epochs);
    }
}

#[test]
fn empty_dataset_is_rejected() {
    let err = train(&Dataset::empty(), &TrainingConfig::default()).unwrap_err();
    assert_eq!(err, RiskError::EmptyDataset);
}

#[test]
fn missing_weather_surfaces_as_empty_dataset() {
    let dataset = SampleBuilder::default().from_source(&StaticWeather::unavailable());
    assert!(dataset.is_empty());

    let err = train(&dataset, &TrainingConfig::default().with_epochs(5)).unwrap_err();
    assert_eq!(err, RiskError::EmptyDataset);
}

#[test]
fn zero_physics_weight_tracks_data_only() {
    let dataset = reference_dataset();
    let config = TrainingConfig::default()
        .with_epochs(25)
        .with_hidden_dim(8)
        .with_physics_weight(0.0)
        .with_seed(9);

    let (_, history) = train(&dataset, &config).unwrap();

    assert_eq!(history.physics_weight(), 0.0);
    assert_eq!(history.total(), history.data());
    // The residual is still measured even though it has no influence
    assert!(history.physics().iter().all(|p| p.is_finite()));
}

#[test]
fn physics_weight_scales_contribution() {
    let dataset = reference_dataset();
    let config = TrainingConfig::default()
        .with_epochs(10)
        .with_hidden_dim(8)
        .with_physics_weight(2.5)
        .with_seed(4);

    let (_, history) = train(&dataset, &config).unwrap();

    for i in 0..history.len() {
        let record = history.get(i).unwrap();
        let weighted = history.weighted_physics(i).unwrap();
        assert_relative_eq!(record.total, record.data + weighted, epsilon = 1e-9);
    }
}

#[test]
fn weather_reading_drives_targets() {
    let wind = MetersPerSecond::new(30.0);
    let pressure = Hectopascals::new(1000.0);
    let temperature = Celsius::new(-10.0);
    let expected = heuristic_risk(wind, pressure, temperature);
    assert_relative_eq!(expected, 0.3 + 0.013 + 0.05, epsilon = 1e-12);

    let builder = SampleBuilder::new(Location::new(35.0, 129.0));
    let dataset = builder.from_source(&StaticWeather::new(wind, pressure, temperature));

    assert_eq!(dataset.len(), 7);
    assert_relative_eq!(dataset.examples()[0].target, expected, epsilon = 1e-12);
    assert_relative_eq!(dataset.examples()[5].target, expected * 1.3, epsilon = 1e-12);
    assert_relative_eq!(dataset.examples()[3].features.x1, 35.3, epsilon = 1e-12);
    assert_relative_eq!(dataset.examples()[3].features.t, 3.0);
}

#[test]
fn evaluation_does_not_mutate_trained_model() {
    let dataset = reference_dataset();
    let config = TrainingConfig::default()
        .with_epochs(5)
        .with_hidden_dim(6)
        .with_seed(8);
    let (estimator, _) = train(&dataset, &config).unwrap();
    let snapshot = estimator.clone();

    let a = evaluate_dataset(&estimator, &dataset).unwrap();
    let b = evaluate_dataset(&estimator, &dataset).unwrap();

    assert_eq!(a, b);
    assert_eq!(estimator, snapshot);
}
