use std::collections::BTreeMap;
use std::io::Read;

use nalgebra::Point2;

use crate::error::{KrigingError, Result};

use super::Dataset;

/// A shared coordinate set with one value column per measured feature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    pub coords: Vec<Point2<f64>>,
    pub features: BTreeMap<String, Vec<f64>>,
}

impl FeatureTable {
    pub fn new(coords: Vec<Point2<f64>>) -> Self {
        Self {
            coords,
            features: BTreeMap::new(),
        }
    }

    /// Add (or replace) a feature column. The column must have one value per coordinate.
    pub fn insert_feature(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.coords.len() {
            return Err(KrigingError::InvalidInput(format!(
                "feature {} has {} values for {} coordinates",
                name,
                values.len(),
                self.coords.len()
            )));
        }
        self.features.insert(name, values);
        Ok(())
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    /// Project one feature into a dataset, dropping rows with a missing value.
    pub fn dataset(&self, name: &str) -> Option<Dataset> {
        let values = self.features.get(name)?;
        let (coords, values): (Vec<_>, Vec<_>) = self
            .coords
            .iter()
            .zip(values)
            .filter(|(_, v)| v.is_finite())
            .map(|(p, v)| (*p, *v))
            .unzip();
        Some(Dataset::from_parts(name, &coords, &values))
    }

    /// Every feature as a dataset.
    pub fn datasets(&self) -> Vec<Dataset> {
        self.feature_names()
            .filter_map(|name| self.dataset(name))
            .collect()
    }

    /// Read a table with a header row.
    ///
    /// `x_col` and `y_col` must parse on every row. Any other column becomes a
    /// feature if each non-empty cell parses as a number; empty cells are kept
    /// as missing values. Columns with text (e.g. location names) are skipped.
    pub fn from_csv_reader<R: Read>(reader: R, x_col: &str, y_col: &str) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();

        let col_index = |name: &str| {
            headers.iter().position(|h| h.trim() == name).ok_or_else(|| {
                KrigingError::InvalidInput(format!("missing coordinate column {}", name))
            })
        };
        let x_idx = col_index(x_col)?;
        let y_idx = col_index(y_col)?;

        let mut coords = Vec::new();
        let mut columns: Vec<Option<Vec<f64>>> = vec![Some(Vec::new()); headers.len()];

        for (row, result) in rdr.records().enumerate() {
            let record = result?;

            let parse_coord = |idx: usize| {
                let cell = record.get(idx).unwrap_or("").trim();
                cell.parse::<f64>().map_err(|_| {
                    KrigingError::InvalidInput(format!(
                        "row {}: coordinate {:?} in column {} is not a number",
                        row + 1,
                        cell,
                        &headers[idx]
                    ))
                })
            };
            coords.push(Point2::new(parse_coord(x_idx)?, parse_coord(y_idx)?));

            for (idx, column) in columns.iter_mut().enumerate() {
                if idx == x_idx || idx == y_idx {
                    continue;
                }
                let Some(values) = column else {
                    continue;
                };
                let cell = record.get(idx).unwrap_or("").trim();
                if cell.is_empty() {
                    values.push(f64::NAN);
                } else if let Ok(v) = cell.parse::<f64>() {
                    values.push(v);
                } else {
                    *column = None;
                }
            }
        }

        let mut table = Self::new(coords);
        for (idx, column) in columns.into_iter().enumerate() {
            if idx == x_idx || idx == y_idx {
                continue;
            }
            if let Some(values) = column {
                table.insert_feature(headers[idx].trim(), values)?;
            }
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use crate::spatial_database::SamplePoint;

    use super::*;

    const TABLE: &str = "\
LocationName,Latitude,Longitude,pH,BOD
Hulu,-6.90,107.60,7.2,3.1
Tengah,-6.91,107.62,6.8,
Hilir,-6.93,107.65,6.5,4.4
";

    #[test]
    fn reads_numeric_feature_columns() {
        let table = FeatureTable::from_csv_reader(TABLE.as_bytes(), "Latitude", "Longitude").unwrap();

        assert_eq!(table.coords.len(), 3);
        assert_eq!(table.coords[1], Point2::new(-6.91, 107.62));
        assert_eq!(table.feature_names().collect::<Vec<_>>(), vec!["BOD", "pH"]);
        assert_eq!(table.features["pH"], vec![7.2, 6.8, 6.5]);
    }

    #[test]
    fn missing_cells_are_dropped_from_dataset() {
        let table = FeatureTable::from_csv_reader(TABLE.as_bytes(), "Latitude", "Longitude").unwrap();
        let bod = table.dataset("BOD").unwrap();

        assert_eq!(bod.len(), 2);
        assert_eq!(bod.points[1], SamplePoint::new(-6.93, 107.65, 4.4));
        assert!(table.dataset("COD").is_none());
    }

    #[test]
    fn missing_coordinate_column_is_invalid_input() {
        let err = FeatureTable::from_csv_reader(TABLE.as_bytes(), "Lat", "Longitude").unwrap_err();
        assert!(matches!(err, KrigingError::InvalidInput(_)));
    }

    #[test]
    fn insert_feature_checks_length() {
        let mut table = FeatureTable::new(vec![Point2::new(0.0, 0.0)]);
        assert!(table.insert_feature("pH", vec![7.0]).is_ok());
        assert!(table.insert_feature("BOD", vec![1.0, 2.0]).is_err());
    }
}
