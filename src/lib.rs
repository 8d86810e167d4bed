pub mod error;
pub mod estimators;
pub mod geometry;
pub mod spatial_database;
pub mod systems;
pub mod variography;

pub mod prelude {

    pub mod re_exports {
        pub use nalgebra;
    }

    pub use crate::error::{KrigingError, NumericalWarning, Result};
    pub use crate::estimators::{
        cross_validation::{leave_one_out, CrossValidation},
        engine::PredictionEngine,
        ordinary_kriging::OrdinaryKriging,
        predict, predict_with, FeaturePredictions, GridPrediction, PredictionResult,
    };
    pub use crate::geometry::{CoordinateBounds, DistanceMetric, Euclidean};
    pub use crate::spatial_database::{Dataset, FeatureTable, SamplePoint};
    pub use crate::variography::{
        fit, fit_with_config,
        model_variograms::{
            iso_fitter::{FitConfig, LagWeighting},
            ModelKind, VariogramParameters,
        },
        VariogramFit,
    };
}
