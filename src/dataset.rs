use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use std::{collections::BTreeSet, fs::File, io::Read, path::Path};

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "Station Type")]
    station_type: String,
    #[serde(rename = "Category")]
    category: String,
    #[serde(rename = "Charging Load (kW)")]
    charging_load_kw: f64,
    #[serde(rename = "Timestamp")]
    timestamp: String,
}

/// One observed charging session at a station.
#[derive(Debug, Clone, PartialEq)]
pub struct StationRecord {
    pub address: String,
    pub station_type: String,
    pub category: String,
    pub charging_load_kw: f64,
    pub timestamp: NaiveDateTime,
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// The station table, loaded once and read-only afterwards.
#[derive(Debug, Clone)]
pub struct StationTable {
    records: Vec<StationRecord>,
    // sorted distinct addresses; an address's index is its city code
    addresses: Vec<String>,
}

impl StationTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open station dataset {}", path.display()))?;
        let table = Self::from_reader(file)
            .with_context(|| format!("failed to read station dataset {}", path.display()))?;
        table.log_summary();
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut records = Vec::new();
        for (i, row) in rdr.deserialize::<RawRow>().enumerate() {
            // header is line 1
            let line = i + 2;
            let row = row.with_context(|| format!("malformed row at line {}", line))?;
            let timestamp = parse_timestamp(&row.timestamp).with_context(|| {
                format!("unparseable timestamp {:?} at line {}", row.timestamp, line)
            })?;
            if !row.charging_load_kw.is_finite() {
                bail!("non-finite charging load at line {}", line);
            }
            records.push(StationRecord {
                address: row.address,
                station_type: row.station_type,
                category: row.category,
                charging_load_kw: row.charging_load_kw,
                timestamp,
            });
        }
        Ok(Self::from_records(records))
    }

    pub fn from_records(records: Vec<StationRecord>) -> Self {
        let addresses = records
            .iter()
            .map(|r| r.address.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Self { records, addresses }
    }

    pub fn records(&self) -> &[StationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted distinct addresses (the city-code vocabulary).
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Distinct addresses in the order they first appear in the dataset.
    pub fn locations(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.records
            .iter()
            .map(|r| r.address.as_str())
            .filter(|a| seen.insert(*a))
            .collect()
    }

    pub fn address_code(&self, address: &str) -> Option<u32> {
        self.addresses
            .binary_search_by(|a| a.as_str().cmp(address))
            .ok()
            .map(|i| i as u32)
    }

    /// First record (in table order) whose address contains `city`, ignoring case.
    pub fn find_city(&self, city: &str) -> Option<&StationRecord> {
        let needle = city.to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.records
            .iter()
            .find(|r| r.address.to_lowercase().contains(&needle))
    }

    pub fn time_span(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let min = self.records.iter().map(|r| r.timestamp).min()?;
        let max = self.records.iter().map(|r| r.timestamp).max()?;
        Some((min, max))
    }

    fn log_summary(&self) {
        match self.time_span() {
            Some((from, to)) => tracing::info!(
                "loaded {} station rows, {} distinct addresses, {} .. {}",
                self.len(),
                self.addresses.len(),
                from,
                to
            ),
            None => tracing::warn!("station dataset is empty"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
Address,Station Type,Category,Charging Load (kW),Timestamp
\"Torstrasse 1, 10119 Berlin\",AC,Rewe,11.0,2024-03-01 08:00:00
\"Hafenweg 2, 20457 Hamburg\",DC,Netto,48.5,2024-03-01T09:30:00
\"Torstrasse 1, 10119 Berlin\",HPC,Penny,120.0,2024-03-02 18:15:00
";

    #[test]
    fn loads_rows_and_address_vocabulary() {
        let table = StationTable::from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.addresses(),
            &["Hafenweg 2, 20457 Hamburg", "Torstrasse 1, 10119 Berlin"]
        );
        assert_eq!(
            table.locations(),
            vec!["Torstrasse 1, 10119 Berlin", "Hafenweg 2, 20457 Hamburg"]
        );
        assert_eq!(table.address_code("Torstrasse 1, 10119 Berlin"), Some(1));
        assert_eq!(table.address_code("Nowhere"), None);
    }

    #[test]
    fn city_lookup_is_case_insensitive_substring() {
        let table = StationTable::from_reader(CSV.as_bytes()).unwrap();
        let rec = table.find_city("HAMBURG").unwrap();
        assert_eq!(rec.station_type, "DC");
        assert!(table.find_city("atlantis").is_none());
        assert!(table.find_city("").is_none());
    }

    #[test]
    fn rejects_bad_timestamp() {
        let bad = "Address,Station Type,Category,Charging Load (kW),Timestamp\nX,AC,Rewe,1.0,yesterday\n";
        let err = StationTable::from_reader(bad.as_bytes()).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }
}
