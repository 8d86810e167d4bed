use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use nalgebra::Point2;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{KrigingError, Result};
use crate::geometry::{CoordinateBounds, DistanceMetric, Euclidean};
use crate::spatial_database::{feature_table::FeatureTable, Dataset};
use crate::variography::fit_with_config;
use crate::variography::model_variograms::iso_fitter::FitConfig;
use crate::variography::model_variograms::{ModelKind, VariogramParameters};

use super::cross_validation::{leave_one_out, CrossValidation};
use super::ordinary_kriging::OrdinaryKriging;
use super::{assemble, validate_features, validate_queries, FeaturePredictions, GridPrediction};

type ModelCell<M> = Arc<OnceLock<Result<Arc<OrdinaryKriging<M>>>>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FitKey {
    name: String,
    /// Insertion the fit was computed from.
    generation: u64,
    model: ModelKind,
    lag_bins: usize,
}

#[derive(Clone)]
struct Entry<M> {
    dataset: Arc<Dataset>,
    generation: u64,
    config: FitConfig,
    /// Set when the parameters were supplied rather than fitted.
    pinned: Option<Result<Arc<OrdinaryKriging<M>>>>,
}

/// Datasets registered by name with lazily fitted, shared kriging models.
///
/// Each (dataset, model kind, lag bins) combination is fitted at most once,
/// even when many threads ask for it at the same time. Re-inserting a
/// dataset under an existing name drops every model fitted for it.
pub struct PredictionEngine<M = Euclidean> {
    metric: M,
    bounds: CoordinateBounds,
    entries: RwLock<HashMap<String, Entry<M>>>,
    models: RwLock<HashMap<FitKey, ModelCell<M>>>,
    generations: AtomicU64,
    fits: AtomicUsize,
}

impl PredictionEngine<Euclidean> {
    pub fn new() -> Self {
        Self::with_metric(Euclidean)
    }
}

impl Default for PredictionEngine<Euclidean> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> PredictionEngine<M>
where
    M: DistanceMetric + Clone,
{
    pub fn with_metric(metric: M) -> Self {
        Self {
            metric,
            bounds: CoordinateBounds::default(),
            entries: RwLock::new(HashMap::new()),
            models: RwLock::new(HashMap::new()),
            generations: AtomicU64::new(0),
            fits: AtomicUsize::new(0),
        }
    }

    pub fn with_bounds(mut self, bounds: CoordinateBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn bounds(&self) -> &CoordinateBounds {
        &self.bounds
    }

    /// Register `dataset` to be fitted with `config` on first use.
    pub fn insert(&self, dataset: Dataset, config: FitConfig) {
        self.insert_entry(Entry {
            dataset: Arc::new(dataset),
            generation: 0,
            config,
            pinned: None,
        });
    }

    /// Register every feature of `table` with the same fitting options.
    pub fn insert_table(&self, table: &FeatureTable, config: &FitConfig) {
        for dataset in table.datasets() {
            self.insert(dataset, config.clone());
        }
    }

    /// Register `dataset` with already known variogram parameters; no fit runs for it.
    pub fn insert_fitted(&self, dataset: Dataset, params: VariogramParameters) {
        let pinned = OrdinaryKriging::with_metric(&dataset, params, self.metric.clone()).map(Arc::new);
        self.insert_entry(Entry {
            dataset: Arc::new(dataset),
            generation: 0,
            config: FitConfig::new(params.model),
            pinned: Some(pinned),
        });
    }

    /// Fits keyed by an older generation are unreachable once the entry is
    /// replaced, even if they finish after this call.
    fn insert_entry(&self, mut entry: Entry<M>) {
        let name = entry.dataset.name.clone();
        entry.generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = entry.generation;

        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), entry);
        self.models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|key, _| key.name != name || key.generation == generation);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Number of variogram fits actually computed.
    pub fn fits_performed(&self) -> usize {
        self.fits.load(Ordering::SeqCst)
    }

    fn lookup(&self, name: &str) -> Result<Entry<M>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| KrigingError::InvalidInput(format!("unknown feature {}", name)))
    }

    /// The kriging model for `name` under its registered options.
    pub fn fitted(&self, name: &str) -> Result<Arc<OrdinaryKriging<M>>> {
        let mut entry = self.lookup(name)?;
        if let Some(model) = entry.pinned.take() {
            return model;
        }
        self.fitted_from(entry)
    }

    /// The kriging model for `name` with an explicit model kind and lag bin count.
    pub fn fitted_with(&self, name: &str, model: ModelKind, lag_bins: usize) -> Result<Arc<OrdinaryKriging<M>>> {
        let mut entry = self.lookup(name)?;
        entry.config.model = model;
        entry.config.lag_bins = lag_bins;
        self.fitted_from(entry)
    }

    fn fitted_from(&self, entry: Entry<M>) -> Result<Arc<OrdinaryKriging<M>>> {
        let Entry {
            dataset,
            generation,
            config,
            ..
        } = entry;
        let key = FitKey {
            name: dataset.name.clone(),
            generation,
            model: config.model,
            lag_bins: config.lag_bins,
        };
        let cell = self.cell(key);

        cell.get_or_init(|| {
            self.fits.fetch_add(1, Ordering::SeqCst);
            let fit = fit_with_config(&dataset, &config, &self.metric)?;
            info!(
                dataset = %dataset.name,
                model = %fit.params.model,
                nugget = fit.params.nugget,
                sill = fit.params.sill,
                range = fit.params.range,
                cost = fit.cost,
                "fitted variogram"
            );
            OrdinaryKriging::with_metric(&dataset, fit.params, self.metric.clone()).map(Arc::new)
        })
        .clone()
    }

    fn cell(&self, key: FitKey) -> ModelCell<M> {
        if let Some(cell) = self
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return cell.clone();
        }
        self.models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .clone()
    }

    pub fn params(&self, name: &str) -> Result<VariogramParameters> {
        self.fitted(name).map(|model| model.params)
    }

    /// Estimate every feature at every query point.
    ///
    /// Out-of-range queries, an empty feature list or an unknown feature fail
    /// the whole call. A feature whose fit or system fails reports that error
    /// in its own entries while the other features still succeed.
    pub fn predict<S: AsRef<str>>(&self, queries: &[Point2<f64>], features: &[S]) -> Result<Vec<FeaturePredictions>> {
        let names = validate_features(features)?;
        validate_queries(queries, &self.bounds)?;
        if let Some(unknown) = names.iter().find(|name| !self.contains(name)) {
            return Err(KrigingError::InvalidInput(format!("unknown feature {}", unknown)));
        }
        debug!(queries = queries.len(), features = names.len(), "predicting");

        // Fits run on the calling thread; a rayon worker must not block on a
        // cell whose initializer it may itself be stealing work for.
        let models = names
            .into_iter()
            .map(|name| {
                let model = self.fitted(&name);
                (name, model)
            })
            .collect::<Vec<_>>();

        let per_feature = models
            .into_par_iter()
            .map(|(name, model)| {
                let results = match model {
                    Ok(model) => model.predict_batch(queries),
                    Err(e) => vec![Err(e); queries.len()],
                };
                (name, results)
            })
            .collect();

        Ok(assemble(queries.len(), per_feature))
    }

    pub fn predict_one<S: AsRef<str>>(&self, query: Point2<f64>, features: &[S]) -> Result<FeaturePredictions> {
        let mut out = self.predict(&[query], features)?;
        Ok(out.pop().unwrap_or_default())
    }

    /// Estimates for one feature over the lattice `xs × ys`.
    pub fn predict_grid(&self, feature: &str, xs: &[f64], ys: &[f64]) -> Result<GridPrediction> {
        for y in ys {
            for x in xs {
                self.bounds.check(&Point2::new(*x, *y))?;
            }
        }
        Ok(self.fitted(feature)?.predict_grid(xs, ys))
    }

    /// Leave-one-out validation of the model fitted for `feature`.
    pub fn cross_validate(&self, feature: &str) -> Result<CrossValidation> {
        let entry = self.lookup(feature)?;
        let model = match entry.pinned.clone() {
            Some(model) => model?,
            None => self.fitted_from(entry.clone())?,
        };
        leave_one_out(&entry.dataset, model.params, &self.metric)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::spatial_database::SamplePoint;

    use super::*;

    // Latitude/longitude pairs around a small river catchment.
    fn stations(n: usize, seed: u64) -> Vec<Point2<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| Point2::new(rng.gen_range(-7.0..-6.8), rng.gen_range(107.5..107.7)))
            .collect()
    }

    fn water_table() -> FeatureTable {
        let coords = stations(30, 3);
        let ph = coords
            .iter()
            .map(|p| 7.0 + 4.0 * (p.x + 6.9) + 3.0 * (p.y - 107.6))
            .collect();
        let bod = coords
            .iter()
            .map(|p| 3.0 + (p.x * 40.0).sin() + (p.y * 30.0).cos())
            .collect();
        let mut table = FeatureTable::new(coords);
        table.insert_feature("pH", ph).unwrap();
        table.insert_feature("BOD", bod).unwrap();
        table
    }

    fn quick_config(model: ModelKind) -> FitConfig {
        FitConfig::new(model).with_restarts(2).with_timeout(None)
    }

    #[test]
    fn fits_once_under_concurrent_access() {
        let engine = PredictionEngine::new();
        engine.insert_table(&water_table(), &quick_config(ModelKind::Spherical));

        let queries = stations(4, 11);
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let out = engine.predict(&queries, &["pH", "BOD"]).unwrap();
                    assert_eq!(out.len(), 4);
                });
            }
        });

        assert_eq!(engine.fits_performed(), 2);
        engine.predict_one(queries[0], &["pH"]).unwrap();
        assert_eq!(engine.fits_performed(), 2);
    }

    #[test]
    fn reinsert_invalidates_fit() {
        let engine = PredictionEngine::new();
        let table = water_table();
        engine.insert_table(&table, &quick_config(ModelKind::Spherical));

        engine.params("pH").unwrap();
        engine.insert(table.dataset("pH").unwrap(), quick_config(ModelKind::Spherical));
        engine.params("pH").unwrap();

        assert_eq!(engine.fits_performed(), 2);
    }

    #[test]
    fn fit_finishing_after_reinsert_is_not_served() {
        let engine = PredictionEngine::new();
        let ph = water_table().dataset("pH").unwrap();
        engine.insert(ph.clone(), quick_config(ModelKind::Spherical));

        // a fit that read the entry before it was replaced completes afterwards
        let before = engine.lookup("pH").unwrap();
        let scaled = Dataset::new(
            "pH",
            ph.points
                .iter()
                .map(|p| SamplePoint::new(p.x, p.y, p.value * 100.0))
                .collect(),
        );
        engine.insert(scaled.clone(), quick_config(ModelKind::Spherical));
        let late = engine.fitted_from(before).unwrap();

        let current = engine.fitted("pH").unwrap();

        assert_eq!(late.values, ph.usable_parts().1);
        assert_eq!(current.values, scaled.usable_parts().1);
        assert!(!Arc::ptr_eq(&late, &current));
        assert_eq!(engine.fits_performed(), 2);
    }

    #[test]
    fn model_kind_and_lag_bins_are_cached_separately() {
        let engine = PredictionEngine::new();
        engine.insert_table(&water_table(), &quick_config(ModelKind::Spherical));

        let spherical = engine.fitted("pH").unwrap();
        let gaussian = engine.fitted_with("pH", ModelKind::Gaussian, 6).unwrap();
        let again = engine.fitted_with("pH", ModelKind::Spherical, 6).unwrap();

        assert_eq!(spherical.params.model, ModelKind::Spherical);
        assert_eq!(gaussian.params.model, ModelKind::Gaussian);
        assert!(Arc::ptr_eq(&spherical, &again));
        assert_eq!(engine.fits_performed(), 2);
    }

    #[test]
    fn spherical_and_gaussian_tables_side_by_side() {
        let engine = PredictionEngine::new();
        let table = water_table();
        engine.insert(table.dataset("pH").unwrap(), quick_config(ModelKind::Spherical));
        engine.insert(table.dataset("BOD").unwrap(), quick_config(ModelKind::Gaussian));

        let query = Point2::new(-6.9, 107.6);
        let out = engine.predict_one(query, &["pH", "BOD"]).unwrap();

        assert_eq!(engine.params("pH").unwrap().model, ModelKind::Spherical);
        assert_eq!(engine.params("BOD").unwrap().model, ModelKind::Gaussian);
        let ph = out["pH"].as_ref().unwrap();
        assert!(ph.estimate > 6.0 && ph.estimate < 8.0);
        assert!(out["BOD"].as_ref().unwrap().variance >= 0.0);
    }

    #[test]
    fn singular_feature_reports_per_entry() {
        let engine = PredictionEngine::new();
        let params = VariogramParameters::new(ModelKind::Spherical, 0.0, 1.0, 0.1).unwrap();
        engine.insert_fitted(
            Dataset::new(
                "dup",
                vec![
                    SamplePoint::new(-6.90, 107.60, 1.0),
                    SamplePoint::new(-6.90, 107.60, 2.0),
                    SamplePoint::new(-6.95, 107.62, 3.0),
                ],
            ),
            params,
        );
        engine.insert_table(&water_table(), &quick_config(ModelKind::Exponential));

        let queries = stations(3, 5);
        let out = engine.predict(&queries, &["dup", "pH"]).unwrap();

        for row in out.iter() {
            assert!(matches!(row["dup"], Err(KrigingError::SingularSystem { dimension: 4 })));
            assert!(row["pH"].is_ok());
        }
        assert_eq!(engine.fits_performed(), 1);
    }

    #[test]
    fn rejects_invalid_requests() {
        let engine = PredictionEngine::new();
        engine.insert_table(&water_table(), &quick_config(ModelKind::Spherical));
        let inside = Point2::new(-6.9, 107.6);
        let none: [&str; 0] = [];

        assert!(matches!(engine.predict(&[inside], &none), Err(KrigingError::InvalidInput(_))));
        assert!(matches!(engine.predict(&[inside], &["COD"]), Err(KrigingError::InvalidInput(_))));
        assert!(matches!(
            engine.predict(&[inside, Point2::new(-6.9, 181.0)], &["pH"]),
            Err(KrigingError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.predict(&[Point2::new(-91.0, 107.6)], &["pH"]),
            Err(KrigingError::InvalidInput(_))
        ));
        assert_eq!(engine.fits_performed(), 0);
    }

    #[test]
    fn unbounded_engine_accepts_planar_coordinates() {
        let engine = PredictionEngine::new().with_bounds(CoordinateBounds::unbounded());
        let params = VariogramParameters::new(ModelKind::Gaussian, 0.0, 1.0, 500.0).unwrap();
        engine.insert_fitted(
            Dataset::new(
                "elev",
                vec![
                    SamplePoint::new(1000.0, 2000.0, 10.0),
                    SamplePoint::new(1200.0, 2000.0, 20.0),
                ],
            ),
            params,
        );

        let out = engine.predict_one(Point2::new(1100.0, 2000.0), &["elev"]).unwrap();

        assert_relative_eq!(out["elev"].as_ref().unwrap().estimate, 15.0, epsilon = 1e-9);
    }

    #[test]
    fn serialized_parameters_reproduce_predictions() {
        let table = water_table();
        let fitting = PredictionEngine::new();
        fitting.insert_table(&table, &quick_config(ModelKind::Spherical));
        let params = fitting.params("BOD").unwrap();

        let json = serde_json::to_string(&params).unwrap();
        let reloaded: VariogramParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(params, reloaded);

        let restored = PredictionEngine::new();
        restored.insert_fitted(table.dataset("BOD").unwrap(), reloaded);

        let queries = stations(10, 21);
        let a = fitting.predict(&queries, &["BOD"]).unwrap();
        let b = restored.predict(&queries, &["BOD"]).unwrap();
        assert_eq!(a, b);
        assert_eq!(restored.fits_performed(), 0);
    }

    #[test]
    fn grid_prediction_checks_bounds() {
        let engine = PredictionEngine::new();
        engine.insert_table(&water_table(), &quick_config(ModelKind::Spherical));

        let grid = engine
            .predict_grid("pH", &[-6.95, -6.9, -6.85], &[107.55, 107.65])
            .unwrap();
        assert_eq!(grid.values.len(), 6);
        assert!(grid.values.iter().all(|v| v.is_ok()));

        assert!(matches!(
            engine.predict_grid("pH", &[-6.9, 95.0], &[107.6]),
            Err(KrigingError::InvalidInput(_))
        ));
    }

    #[test]
    fn cross_validation_uses_fitted_model() {
        let engine = PredictionEngine::new();
        engine.insert_table(&water_table(), &quick_config(ModelKind::Spherical));

        let cv = engine.cross_validate("pH").unwrap();

        assert_eq!(cv.entries.len(), 30);
        assert!(cv.rmse.is_finite());
        assert_eq!(engine.fits_performed(), 1);
    }

    #[test]
    fn csv_table_end_to_end() {
        let csv = "\
LocationName,Latitude,Longitude,pH,BOD
A,-6.90,107.60,7.2,3.1
B,-6.91,107.62,6.8,
C,-6.93,107.65,6.5,4.4
D,-6.95,107.61,7.0,3.9
E,-6.88,107.66,6.9,2.7
F,-6.92,107.58,7.4,3.3
";
        let table = FeatureTable::from_csv_reader(csv.as_bytes(), "Latitude", "Longitude").unwrap();
        let engine = PredictionEngine::new();
        engine.insert_table(&table, &quick_config(ModelKind::Spherical));

        assert_eq!(engine.names(), vec!["BOD".to_string(), "pH".to_string()]);
        let out = engine.predict_one(Point2::new(-6.93, 107.65), &["pH", "BOD"]).unwrap();

        assert_relative_eq!(out["pH"].as_ref().unwrap().estimate, 6.5, epsilon = 1e-6);
        assert_relative_eq!(out["BOD"].as_ref().unwrap().estimate, 4.4, epsilon = 1e-6);
    }
}
