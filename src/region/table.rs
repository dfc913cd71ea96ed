//! Region lookup table loaded from `kode_wilayah.csv`
//!
//! The table is a flat list of rows in file order. Hierarchy queries work on
//! code prefixes, so rows may appear in any order and intermediate levels
//! may be missing.

use crate::error::CuacaError;
use crate::models::{AdmLevel, Coordinates, RegionCode, RegionRecord};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

const CODE_COLUMN: &str = "kode";
const NAME_COLUMN: &str = "nama";
const LATITUDE_COLUMNS: [&str; 5] = ["lat", "latitude", "y", "latit", "lintang"];
const LONGITUDE_COLUMNS: [&str; 5] = ["lon", "longitude", "x", "longit", "bujur"];

/// In-memory administrative region table
#[derive(Debug, Clone, Default)]
pub struct RegionTable {
    records: Vec<RegionRecord>,
    by_code: HashMap<RegionCode, usize>,
}

/// Column positions resolved from the CSV header
struct Columns {
    code: usize,
    name: usize,
    latitude: Option<usize>,
    longitude: Option<usize>,
}

impl Columns {
    fn from_header(header: &csv::StringRecord) -> Result<Self, CuacaError> {
        let normalized: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |name: &str| normalized.iter().position(|h| h == name);
        let find_any = |names: &[&str]| names.iter().find_map(|&n| find(n));

        let code = find(CODE_COLUMN).ok_or_else(|| {
            CuacaError::data(format!("CSV needs at least the columns '{CODE_COLUMN}' and '{NAME_COLUMN}' (missing '{CODE_COLUMN}')"))
        })?;
        let name = find(NAME_COLUMN).ok_or_else(|| {
            CuacaError::data(format!("CSV needs at least the columns '{CODE_COLUMN}' and '{NAME_COLUMN}' (missing '{NAME_COLUMN}')"))
        })?;

        Ok(Self {
            code,
            name,
            latitude: find_any(&LATITUDE_COLUMNS),
            longitude: find_any(&LONGITUDE_COLUMNS),
        })
    }

    fn coordinates(&self, record: &csv::StringRecord) -> Option<Coordinates> {
        let parse = |idx: Option<usize>| -> Option<f64> {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };
        let lat = parse(self.latitude)?;
        let lon = parse(self.longitude)?;
        Coordinates::new(lat, lon).ok()
    }
}

impl RegionTable {
    /// Load the table from a CSV file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CuacaError> {
        let path = path.as_ref();
        info!("Loading region table from: {}", path.display());

        if !path.exists() {
            return Err(CuacaError::data(format!(
                "Region file not found: {}",
                path.display()
            )));
        }

        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Parse the table from any CSV source with a header row
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CuacaError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let header = reader
            .headers()
            .map_err(|e| CuacaError::data(format!("Failed to read CSV header: {e}")))?
            .clone();
        let columns = Columns::from_header(&header)?;

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (line, row) in reader.records().enumerate() {
            let row = row.map_err(|e| {
                CuacaError::data(format!("Failed to read CSV record {}: {e}", line + 2))
            })?;

            let raw_code = row.get(columns.code).unwrap_or_default();
            let name = row.get(columns.name).unwrap_or_default().trim();
            let code = match RegionCode::parse(raw_code) {
                Ok(code) if !name.is_empty() => code,
                Ok(_) => {
                    debug!("Skipping row {} with empty name", line + 2);
                    skipped += 1;
                    continue;
                }
                Err(e) => {
                    debug!("Skipping row {}: {}", line + 2, e);
                    skipped += 1;
                    continue;
                }
            };

            let mut record = RegionRecord::new(code, name);
            record.coordinates = columns.coordinates(&row);
            records.push(record);
        }

        if skipped > 0 {
            warn!("Skipped {} invalid rows in region table", skipped);
        }

        let table = Self::from_records(records);
        info!(
            "Loaded {} regions ({} with coordinates)",
            table.len(),
            table.records.iter().filter(|r| r.coordinates.is_some()).count()
        );
        Ok(table)
    }

    /// Build a table from already parsed records; a later duplicate code
    /// shadows an earlier one for code lookups.
    #[must_use]
    pub fn from_records(records: Vec<RegionRecord>) -> Self {
        let by_code = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.code.clone(), i))
            .collect();
        Self { records, by_code }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All rows in file order
    #[must_use]
    pub fn records(&self) -> &[RegionRecord] {
        &self.records
    }

    #[must_use]
    pub fn get(&self, code: &RegionCode) -> Option<&RegionRecord> {
        self.by_code.get(code).map(|&i| &self.records[i])
    }

    #[must_use]
    pub fn parent(&self, record: &RegionRecord) -> Option<&RegionRecord> {
        record.code.parent().and_then(|p| self.get(&p))
    }

    /// Enclosing regions present in the table, nearest first
    #[must_use]
    pub fn ancestors(&self, record: &RegionRecord) -> Vec<&RegionRecord> {
        let mut out = Vec::new();
        let mut current = record.code.parent();
        while let Some(code) = current {
            if let Some(found) = self.get(&code) {
                out.push(found);
            }
            current = code.parent();
        }
        out
    }

    /// Direct children of a code, in file order
    #[must_use]
    pub fn children(&self, code: &RegionCode) -> Vec<&RegionRecord> {
        self.records
            .iter()
            .filter(|r| r.code.parent().as_ref() == Some(code))
            .collect()
    }

    /// Every region below a code, in file order
    #[must_use]
    pub fn descendants(&self, code: &RegionCode) -> Vec<&RegionRecord> {
        self.records
            .iter()
            .filter(|r| code.is_ancestor_of(&r.code))
            .collect()
    }

    /// The adm4 code to use for a region: the code itself when it already
    /// is a village, otherwise the first village below it in file order.
    #[must_use]
    pub fn first_village_under(&self, code: &RegionCode) -> Option<RegionCode> {
        if code.level() == AdmLevel::Village {
            return Some(code.clone());
        }
        self.records
            .iter()
            .find(|r| r.level() == AdmLevel::Village && code.is_ancestor_of(&r.code))
            .map(|r| r.code.clone())
    }

    /// "Simogirang, Prambon, Kab. Sidoarjo, Jawa Timur"
    #[must_use]
    pub fn path_label(&self, record: &RegionRecord) -> String {
        std::iter::once(record.name.as_str())
            .chain(self.ancestors(record).into_iter().map(|r| r.name.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// First `n` names in the table, for showing what can be searched
    #[must_use]
    pub fn sample_names(&self, n: usize) -> Vec<&str> {
        self.records.iter().take(n).map(|r| r.name.as_str()).collect()
    }
}
