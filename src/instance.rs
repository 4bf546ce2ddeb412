//! Module for parsing TSP instances and building their distance matrix.
//!
//! This module handles the TSP-LIB format files (`NODE_COORD_SECTION`, Euclidean 2D).
//! The city list only lives long enough to fill the matrix.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Index;
use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// A city as listed in the dataset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct City {
    /// City identifier (1-indexed, as in the file)
    pub id: usize,
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
}

impl City {
    pub fn new(id: usize, x: f64, y: f64) -> Self {
        City { id, x, y }
    }
}

/// Symmetric matrix of Euclidean distances, stored row-major in one buffer.
///
/// Indices are 0-based: the distance between cities `a` and `b` (1-based ids)
/// is `matrix[(a - 1, b - 1)]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    dimension: usize,
    data: Vec<f64>,
}

/// Cells of an `n x n` matrix, if such a buffer is addressable
fn matrix_cells(n: usize) -> Option<usize> {
    n.checked_mul(n)
        .filter(|&cells| cells <= isize::MAX as usize / std::mem::size_of::<f64>())
}

impl DistanceMatrix {
    /// Compute the Euclidean distance matrix of `cities`, in slice order.
    ///
    /// # Panics
    /// Panics if `cities.len()` squared overflows the address space.
    pub fn from_cities(cities: &[City]) -> Self {
        let n = cities.len();
        let cells = matrix_cells(n)
            .unwrap_or_else(|| panic!("{} cities do not fit in a distance matrix", n));
        Self::fill(cities, vec![0.0; cells])
    }

    /// Like [`DistanceMatrix::from_cities`], but a matrix that cannot be
    /// addressed or allocated is reported instead of aborting
    pub fn try_from_cities(cities: &[City]) -> Result<Self, ParseError> {
        let n = cities.len();
        let too_large = || ParseError::InvalidDimension(n.to_string());
        let cells = matrix_cells(n).ok_or_else(too_large)?;

        let mut data = Vec::new();
        data.try_reserve_exact(cells).map_err(|_| too_large())?;
        data.resize(cells, 0.0);
        Ok(Self::fill(cities, data))
    }

    fn fill(cities: &[City], mut data: Vec<f64>) -> Self {
        let n = cities.len();
        for i in 0..n {
            for j in i + 1..n {
                let dx = cities[i].x - cities[j].x;
                let dy = cities[i].y - cities[j].y;
                let d = (dx * dx + dy * dy).sqrt();
                data[i * n + j] = d;
                data[j * n + i] = d;
            }
        }

        DistanceMatrix { dimension: n, data }
    }

    /// Number of cities
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Get the distance between two cities (0-based indices)
    #[inline]
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.dimension + j]
    }

    pub fn is_symmetric(&self) -> bool {
        let n = self.dimension;
        (0..n).all(|i| {
            self.distance(i, i) == 0.0 && (i + 1..n).all(|j| self.distance(i, j) == self.distance(j, i))
        })
    }

    /// Largest pairwise distance (0.0 when every city coincides)
    pub fn max_distance(&self) -> f64 {
        self.data.iter().cloned().fold(0.0, f64::max)
    }
}

impl Index<(usize, usize)> for DistanceMatrix {
    type Output = f64;

    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &f64 {
        &self.data[i * self.dimension + j]
    }
}

/// Represents a loaded TSP instance
#[derive(Debug, Clone)]
pub struct TspInstance {
    /// Name of the instance
    pub name: String,
    /// Comment/description
    pub comment: String,
    /// Precomputed distance matrix
    pub matrix: DistanceMatrix,
}

impl TspInstance {
    /// Build an instance directly from a city list
    pub fn from_cities(name: &str, cities: &[City]) -> Self {
        TspInstance {
            name: name.to_string(),
            comment: String::new(),
            matrix: DistanceMatrix::from_cities(cities),
        }
    }

    /// Parse a TSP instance from a TSP-LIB format file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ParseError> {
        let file = File::open(&path)?;
        let mut instance = Self::from_reader(BufReader::new(file))?;
        if instance.name.is_empty() {
            instance.name = path.as_ref()
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        Ok(instance)
    }

    /// Parse a TSP instance from any buffered reader
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, ParseError> {
        let mut name = String::new();
        let mut comment = String::new();
        let mut dimension: Option<usize> = None;
        let mut in_coords = false;
        let mut seen_coords = false;
        let mut cities: Vec<Option<City>> = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();

            if line.is_empty() {
                continue;
            }
            if line.starts_with("EOF") {
                break;
            }

            if in_coords {
                let city = parse_city(line, line_no + 1)?;
                let n = cities.len();
                if city.id == 0 || city.id > n {
                    return Err(ParseError::NodeOutOfRange { id: city.id, dimension: n });
                }
                let slot = &mut cities[city.id - 1];
                if slot.is_some() {
                    return Err(ParseError::DuplicateNode(city.id));
                }
                *slot = Some(city);
                continue;
            }

            if line.starts_with("NODE_COORD_SECTION") {
                let n = dimension.ok_or(ParseError::MissingDimension)?;
                cities.try_reserve_exact(n)
                    .map_err(|_| ParseError::InvalidDimension(n.to_string()))?;
                cities.resize(n, None);
                in_coords = true;
                seen_coords = true;
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            match key.trim() {
                "NAME" => name = value.trim().to_string(),
                "COMMENT" => comment = value.trim().to_string(),
                "DIMENSION" => {
                    let value = value.trim();
                    let n: usize = value.parse()
                        .map_err(|_| ParseError::InvalidDimension(value.to_string()))?;
                    if matrix_cells(n).is_none() {
                        return Err(ParseError::InvalidDimension(value.to_string()));
                    }
                    dimension = Some(n);
                }
                _ => {}
            }
        }

        if dimension.is_none() {
            return Err(ParseError::MissingDimension);
        }
        if !seen_coords {
            return Err(ParseError::MissingCoordSection);
        }

        let expected = cities.len();
        let cities: Vec<City> = cities.into_iter().flatten().collect();
        if cities.len() != expected {
            return Err(ParseError::MissingNodes { expected, found: cities.len() });
        }

        Ok(TspInstance {
            name,
            comment,
            matrix: DistanceMatrix::try_from_cities(&cities)?,
        })
    }

    /// Number of cities
    pub fn dimension(&self) -> usize {
        self.matrix.dimension()
    }
}

fn parse_city(line: &str, line_no: usize) -> Result<City, ParseError> {
    let invalid = || ParseError::InvalidCoordinate {
        line: line_no,
        content: line.to_string(),
    };

    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(invalid());
    }
    let id: usize = parts[0].parse().map_err(|_| invalid())?;
    let x: f64 = parts[1].parse().map_err(|_| invalid())?;
    let y: f64 = parts[2].parse().map_err(|_| invalid())?;
    if !x.is_finite() || !y.is_finite() {
        return Err(invalid());
    }

    Ok(City::new(id, x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = "NAME: square4
COMMENT: unit square
TYPE: TSP
DIMENSION: 4
EDGE_WEIGHT_TYPE: EUC_2D
NODE_COORD_SECTION
1 0 0
2 0 1
3 1 1
4 1 0
EOF
";

    fn parse(text: &str) -> Result<TspInstance, ParseError> {
        TspInstance::from_reader(text.as_bytes())
    }

    #[test]
    fn test_distance_calculation() {
        let cities = vec![City::new(1, 0.0, 0.0), City::new(2, 3.0, 4.0)];
        let matrix = DistanceMatrix::from_cities(&cities);

        assert!((matrix[(0, 1)] - 5.0).abs() < 1e-10);
        assert!((matrix[(1, 0)] - 5.0).abs() < 1e-10);
        assert_eq!(matrix, DistanceMatrix::try_from_cities(&cities).unwrap());
    }

    #[test]
    fn test_parse_unit_square() {
        let instance = parse(SQUARE).unwrap();

        assert_eq!(instance.name, "square4");
        assert_eq!(instance.comment, "unit square");
        assert_eq!(instance.dimension(), 4);
        assert!((instance.matrix.distance(0, 2) - 2f64.sqrt()).abs() < 1e-12);
        assert!((instance.matrix.distance(0, 1) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_matrix_is_symmetric_with_zero_diagonal() {
        let instance = parse(SQUARE).unwrap();
        let m = &instance.matrix;

        assert!(m.is_symmetric());
        for i in 0..m.dimension() {
            assert_eq!(m[(i, i)], 0.0);
            for j in 0..m.dimension() {
                assert_eq!(m[(i, j)], m[(j, i)]);
                assert!(m[(i, j)] >= 0.0);
            }
        }
    }

    #[test]
    fn test_spaced_header_and_unordered_ids() {
        let text = "DIMENSION : 3\nNODE_COORD_SECTION\n3 2.5 0\n1 0 0\n2 1e0 0\nEOF\n";
        let instance = parse(text).unwrap();

        assert_eq!(instance.dimension(), 3);
        assert!((instance.matrix.distance(0, 2) - 2.5).abs() < 1e-12);
        assert!((instance.matrix.distance(1, 2) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_lines_after_eof_are_ignored() {
        let text = format!("{SQUARE}5 9 9\n");
        assert_eq!(parse(&text).unwrap().dimension(), 4);
    }

    #[test]
    fn test_oversized_dimension_is_rejected() {
        // n * n overflows
        assert!(matches!(parse("DIMENSION: 4294967296\nNODE_COORD_SECTION\n"),
            Err(ParseError::InvalidDimension(v)) if v == "4294967296"));
        // n * n fits a usize but not a buffer of f64
        assert!(matches!(parse("DIMENSION: 3037000499\n"), Err(ParseError::InvalidDimension(_))));
        let max = usize::MAX.to_string();
        assert!(matches!(parse(&format!("DIMENSION: {max}\n")), Err(ParseError::InvalidDimension(v)) if v == max));
        assert_eq!(matrix_cells(4), Some(16));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse("NODE_COORD_SECTION\n1 0 0\nEOF\n"), Err(ParseError::MissingDimension)));
        assert!(matches!(parse("DIMENSION: four\n"), Err(ParseError::InvalidDimension(v)) if v == "four"));
        assert!(matches!(parse("DIMENSION: 2\nEOF\n"), Err(ParseError::MissingCoordSection)));
        assert!(matches!(
            parse("DIMENSION: 2\nNODE_COORD_SECTION\n1 0 zero\n"),
            Err(ParseError::InvalidCoordinate { line: 3, .. })
        ));
        assert!(matches!(
            parse("DIMENSION: 2\nNODE_COORD_SECTION\n1 0 0\n3 1 1\n"),
            Err(ParseError::NodeOutOfRange { id: 3, dimension: 2 })
        ));
        assert!(matches!(
            parse("DIMENSION: 2\nNODE_COORD_SECTION\n1 0 0\n1 1 1\n"),
            Err(ParseError::DuplicateNode(1))
        ));
        assert!(matches!(
            parse("DIMENSION: 3\nNODE_COORD_SECTION\n1 0 0\n2 1 1\nEOF\n"),
            Err(ParseError::MissingNodes { expected: 3, found: 2 })
        ));
    }
}
