//! Readers for refractive-index data files and the glass catalog.
//!
//! - refractiveindex.info exports: header `wl,n` (or `wl\tn`), wavelengths in
//!   µm, optionally followed by a `wl,k` block.
//! - filmetrics.com exports: header `Wavelength(nm)\tn\tk`, possibly with a
//!   UTF-8 byte-order mark, wavelengths in nm.
//! - Glass catalogs: one glass per line, `NAME B1 B2 B3 C1 C2 C3` (Sellmeier,
//!   C in µm²), `NAME cauchy A B C` or `NAME schott A0 .. A5`.
//!
//! Windows line endings are accepted everywhere.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::debug;

use crate::error::{Result, TraceError};
use crate::interp::Graph1D;
use crate::refractive_index::{RefractiveIndex, Sellmeier};
use crate::units::{NM, UM};


fn strip_line(line: &str) -> &str {
    line.trim_start_matches('\u{feff}').trim_end_matches(['\r', '\n'])
}

fn split_fields(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
}

fn parse_pair(line: &str) -> Option<(f64, f64)> {
    let mut fields = split_fields(line);
    let x = fields.next()?.parse().ok()?;
    let y = fields.next()?.parse().ok()?;
    Some((x, y))
}

fn parse_triple(line: &str) -> Option<(f64, f64, f64)> {
    let mut fields = split_fields(line);
    let x = fields.next()?.parse().ok()?;
    let y = fields.next()?.parse().ok()?;
    let z = fields.next()?.parse().ok()?;
    Some((x, y, z))
}

/// Reads a refractiveindex.info CSV/TSV export.
pub fn read_refractiveindex_info<R: BufRead>(reader: R) -> Result<RefractiveIndex> {
    let mut lines = reader.lines();
    let header = lines.next().transpose()?.unwrap_or_default();
    let header = strip_line(&header);
    let with_k = match header {
        "wl,n" | "wl\tn" => false,
        "wl,n,k" | "wl\tn\tk" => true,
        _ => {
            return Err(TraceError::Parse {
                line: 1,
                message: format!("expected header 'wl,n' or 'wl,n,k', found '{}'", header),
            })
        }
    };

    let mut n_points = Vec::new();
    let mut k_points = Vec::new();
    let mut reading_k = false;
    for line in lines {
        let line = line?;
        let line = strip_line(&line);
        if line.is_empty() {
            continue;
        }
        if !with_k && (line == "wl,k" || line == "wl\tk") {
            reading_k = true;
            continue;
        }
        if with_k {
            let Some((wl, n, k)) = parse_triple(line) else {
                break;
            };
            n_points.push((wl * UM, n));
            k_points.push((wl * UM, k));
            continue;
        }
        // data ends at the first row that is not a number pair
        let Some((wl, value)) = parse_pair(line) else {
            break;
        };
        if reading_k {
            k_points.push((wl * UM, value));
        } else {
            n_points.push((wl * UM, value));
        }
    }

    let n = Graph1D::new(n_points)?;
    let k = if k_points.is_empty() {
        None
    } else {
        Some(Graph1D::new(k_points)?)
    };
    Ok(RefractiveIndex::tabulated(n, k))
}

/// Reads a filmetrics.com `Wavelength(nm) n k` export.
pub fn read_filmetrics<R: BufRead>(reader: R) -> Result<RefractiveIndex> {
    let mut lines = reader.lines();
    let header = lines.next().transpose()?.unwrap_or_default();
    let header = strip_line(&header);
    if header != "Wavelength(nm)\tn\tk" {
        return Err(TraceError::Parse {
            line: 1,
            message: format!("expected header 'Wavelength(nm)\\tn\\tk', found '{}'", header),
        });
    }

    let mut n_points = Vec::new();
    let mut k_points = Vec::new();
    for line in lines {
        let line = line?;
        let mut fields = split_fields(strip_line(&line)).map(str::parse::<f64>);
        match (fields.next(), fields.next(), fields.next()) {
            (Some(Ok(wl)), Some(Ok(n)), Some(Ok(k))) => {
                n_points.push((wl * NM, n));
                k_points.push((wl * NM, k));
            }
            _ => break,
        }
    }

    Ok(RefractiveIndex::tabulated(
        Graph1D::new(n_points)?,
        Some(Graph1D::new(k_points)?),
    ))
}

pub fn refractiveindex_info_from_file<P: AsRef<Path>>(path: P) -> Result<RefractiveIndex> {
    let file = File::open(path.as_ref())?;
    read_refractiveindex_info(BufReader::new(file))
}

pub fn filmetrics_from_file<P: AsRef<Path>>(path: P) -> Result<RefractiveIndex> {
    let file = File::open(path.as_ref())?;
    read_filmetrics(BufReader::new(file))
}

/// Named glasses with their dispersion formulas.
#[derive(Debug, Clone, Default)]
pub struct GlassCatalog {
    glasses: BTreeMap<String, RefractiveIndex>,
}

impl GlassCatalog {
    /// SCHOTT N-BK7 and SF6.
    pub fn builtin() -> Self {
        let mut catalog = Self::default();
        catalog.insert(
            "N-BK7",
            RefractiveIndex::Sellmeier(Sellmeier::new(
                [1.03961212, 0.231792344, 1.01046945],
                [0.00600069867, 0.0200179144, 103.560653],
            )),
        );
        catalog.insert(
            "SF6",
            RefractiveIndex::Sellmeier(Sellmeier::new(
                [1.72448482, 0.390104889, 1.04572858],
                [0.0134871947, 0.0569318095, 118.557185],
            )),
        );
        catalog
    }

    pub fn read<R: BufRead>(reader: R) -> Result<Self> {
        let mut catalog = Self::default();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line = strip_line(&line).trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, index) = parse_glass(line).map_err(|message| TraceError::Parse {
                line: i + 1,
                message,
            })?;
            catalog.insert(name, index);
        }
        debug!("read {} glasses", catalog.len());
        Ok(catalog)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::read(BufReader::new(file))
    }

    pub fn insert(&mut self, name: &str, index: RefractiveIndex) {
        self.glasses.insert(name.to_string(), index);
    }

    pub fn get(&self, name: &str) -> Option<&RefractiveIndex> {
        self.glasses.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.glasses.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.glasses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glasses.is_empty()
    }
}

fn parse_numbers(fields: &[&str]) -> std::result::Result<Vec<f64>, String> {
    fields
        .iter()
        .map(|f| f.parse::<f64>().map_err(|e| format!("'{}': {}", f, e)))
        .collect()
}

fn parse_glass(line: &str) -> std::result::Result<(&str, RefractiveIndex), String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let name = fields[0];
    let formula = fields.get(1).map(|s| s.to_ascii_lowercase());

    let index = match formula.as_deref() {
        Some("cauchy") => match parse_numbers(&fields[2..])?.as_slice() {
            &[a, b, c] => RefractiveIndex::Cauchy { a, b, c },
            other => return Err(format!("cauchy needs 3 coefficients, got {}", other.len())),
        },
        Some("schott") => {
            let a: [f64; 6] = parse_numbers(&fields[2..])?
                .try_into()
                .map_err(|v: Vec<f64>| format!("schott needs 6 coefficients, got {}", v.len()))?;
            RefractiveIndex::Schott { a }
        }
        _ => match parse_numbers(&fields[1..])?.as_slice() {
            &[b1, b2, b3, c1, c2, c3] => {
                RefractiveIndex::Sellmeier(Sellmeier::new([b1, b2, b3], [c1, c2, c3]))
            }
            other => {
                return Err(format!(
                    "sellmeier entry '{}' needs 6 coefficients, got {}",
                    name,
                    other.len()
                ))
            }
        },
    };
    Ok((name, index))
}
