//! Plain-text correspondence format.
//!
//! One correspondence per line, whitespace separated:
//!
//! ```text
//! # x1 y1 x2 y2            normalized image coordinates (z = 1)
//! 0.012 -0.104 0.031 -0.097
//! # x1 y1 z1 x2 y2 z2      bearing vectors
//! 0.012 -0.104 1.0 0.031 -0.097 1.0
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. Files are written in
//! the six-column form.

use crate::core::PointCorrespondence;
use crate::io::{DataLoader, IoError};
use memmap2::Mmap;
use nalgebra::Vector3;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Loader for whitespace-separated correspondence files
pub struct CorrespondenceLoader;

impl DataLoader<Vec<PointCorrespondence>> for CorrespondenceLoader {
    fn load<P: AsRef<Path>>(path: P) -> Result<Vec<PointCorrespondence>, IoError> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(Vec::new());
        }
        let mmap = unsafe { Mmap::map(&file)? };
        let content = std::str::from_utf8(&mmap).map_err(|e| IoError::Parse {
            line: 0,
            message: format!("Invalid UTF-8: {e}"),
        })?;

        Self::parse_content(content)
    }

    fn write<P: AsRef<Path>>(points: &Vec<PointCorrespondence>, path: P) -> Result<(), IoError> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "# x1 y1 z1 x2 y2 z2")?;
        for point in points {
            writeln!(
                writer,
                "{:.17e} {:.17e} {:.17e} {:.17e} {:.17e} {:.17e}",
                point.x1.x, point.x1.y, point.x1.z, point.x2.x, point.x2.y, point.x2.z
            )?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl CorrespondenceLoader {
    /// Parse the content of a correspondence file.
    pub fn parse_content(content: &str) -> Result<Vec<PointCorrespondence>, IoError> {
        let mut points = Vec::new();
        for (line_num, line) in content.lines().enumerate() {
            if let Some(point) = Self::parse_line(line, line_num + 1)? {
                points.push(point);
            }
        }
        Ok(points)
    }

    fn parse_line(line: &str, line_num: usize) -> Result<Option<PointCorrespondence>, IoError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let values = line
            .split_whitespace()
            .map(|token| {
                token.parse::<f64>().map_err(|_| IoError::InvalidNumber {
                    line: line_num,
                    value: token.to_string(),
                })
            })
            .collect::<Result<Vec<f64>, IoError>>()?;

        match values.as_slice() {
            [x1, y1, x2, y2] => Ok(Some(PointCorrespondence::new(
                Vector3::new(*x1, *y1, 1.0),
                Vector3::new(*x2, *y2, 1.0),
            ))),
            [x1, y1, z1, x2, y2, z2] => Ok(Some(PointCorrespondence::new(
                Vector3::new(*x1, *y1, *z1),
                Vector3::new(*x2, *y2, *z2),
            ))),
            [] | [_] | [_, _] | [_, _, _] => Err(IoError::MissingFields { line: line_num }),
            _ => Err(IoError::Parse {
                line: line_num,
                message: format!("expected 4 or 6 values, found {}", values.len()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_both_formats() {
        let content = "# header\n\n0.1 0.2 0.3 0.4\n  1 2 3 4 5 6  \n";
        let points = CorrespondenceLoader::parse_content(content).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].x1, Vector3::new(0.1, 0.2, 1.0));
        assert_eq!(points[0].x2, Vector3::new(0.3, 0.4, 1.0));
        assert_eq!(points[1].x1, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(points[1].x2, Vector3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_invalid_number_reports_line() {
        let content = "0.1 0.2 0.3 0.4\n0.1 abc 0.3 0.4\n";
        match CorrespondenceLoader::parse_content(content) {
            Err(IoError::InvalidNumber { line, value }) => {
                assert_eq!(line, 2);
                assert_eq!(value, "abc");
            }
            other => panic!("expected InvalidNumber, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_column_count() {
        assert!(matches!(
            CorrespondenceLoader::parse_content("1 2 3"),
            Err(IoError::MissingFields { line: 1 })
        ));
        assert!(matches!(
            CorrespondenceLoader::parse_content("# c\n1 2 3 4 5"),
            Err(IoError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn test_load_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# correspondences").unwrap();
        writeln!(file, "0.5 -0.25 0.75 0.125").unwrap();
        file.flush().unwrap();

        let points = CorrespondenceLoader::load(file.path()).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].x2, Vector3::new(0.75, 0.125, 1.0));
    }

    #[test]
    fn test_load_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let points = CorrespondenceLoader::load(file.path()).unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let result = CorrespondenceLoader::load("/nonexistent/correspondences.txt");
        assert!(matches!(result, Err(IoError::Io(_))));
    }

    #[test]
    fn test_write_then_load_preserves_values() {
        let points = vec![
            PointCorrespondence::new(
                Vector3::new(0.1, -0.3, 1.0),
                Vector3::new(1.0 / 3.0, 0.7, 1.0),
            ),
            PointCorrespondence::from_bearings(
                Vector3::new(1.0, 2.0, 3.0),
                Vector3::new(-0.5, 0.1, 0.9),
            ),
        ];
        let file = NamedTempFile::new().unwrap();
        CorrespondenceLoader::write(&points, file.path()).unwrap();
        let loaded = CorrespondenceLoader::load(file.path()).unwrap();
        assert_eq!(loaded, points);
    }
}
