//! Exchange-rate data model.
//!
//! Rates are quoted against a single base currency. A [`RateSnapshot`] is the
//! full view handed to a newly joined subscriber; a [`RateChangeSet`] is the
//! delta pushed to everybody after a refresh cycle.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mapping from currency code to display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyDirectory(BTreeMap<String, String>);

impl CurrencyDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Display name for a code, or an empty string if the code is unknown.
    pub fn name(&self, code: &str) -> &str {
        self.0.get(code).map(String::as_str).unwrap_or("")
    }

    /// Add or replace a name.
    pub fn insert(&mut self, code: impl Into<String>, name: impl Into<String>) {
        self.0.insert(code.into(), name.into());
    }

    /// Iterate over known currency codes in code order.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of known currencies.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no currency is known.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, String>> for CurrencyDirectory {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map.into_iter().collect())
    }
}

impl<const N: usize> From<[(&str, &str); N]> for CurrencyDirectory {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(code, name)| (code.to_string(), name.to_string()))
                .collect(),
        )
    }
}

/// Rates as the upstream provider shapes them.
///
/// Both live fetches and simulated cycles produce this type, so the
/// enrichment pipeline never knows which source it is processing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRates {
    /// Currency the rates are quoted against.
    pub base: String,
    /// Unix seconds reported by the source.
    pub timestamp: i64,
    /// Rate per currency code.
    pub rates: BTreeMap<String, f64>,
}

impl RawRates {
    /// Flat code to rate mapping, the delta baseline for the next cycle.
    pub fn to_baseline(&self) -> HashMap<String, f64> {
        self.rates.iter().map(|(code, rate)| (code.clone(), *rate)).collect()
    }
}

/// A single currency line in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateEntry {
    /// Currency code.
    pub code: String,
    /// Display name, empty when the directory does not know the code.
    pub name: String,
    /// Units of this currency per one unit of the base.
    pub rate: f64,
    /// Movement since the previous cycle, zero when there was no prior observation.
    pub change: f64,
}

impl RateEntry {
    /// Check if this entry moved during its cycle.
    pub fn has_changed(&self) -> bool {
        self.change != 0.0
    }
}

/// Compare display names the way a user-facing table orders them.
///
/// Case is ignored at the primary level; the exact name breaks ties so the
/// order stays total.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
        .then_with(|| a.cmp(b))
}

fn compare_entries(a: &RateEntry, b: &RateEntry) -> Ordering {
    compare_names(&a.name, &b.name).then_with(|| a.code.cmp(&b.code))
}

/// The most recent view of all rates against the base currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateSnapshot {
    /// Base currency code. Never present among the entries.
    pub base: String,
    /// When the source produced these rates.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated_at: DateTime<Utc>,
    /// Entries sorted by name.
    pub rates: Vec<RateEntry>,
}

impl RateSnapshot {
    /// Create a snapshot, sorting the entries by name.
    pub fn new(
        base: impl Into<String>,
        last_updated_at: DateTime<Utc>,
        rates: Vec<RateEntry>,
    ) -> Self {
        let mut snapshot = Self {
            base: base.into(),
            last_updated_at,
            rates,
        };
        snapshot.sort_entries();
        snapshot
    }

    /// Sort entries by name ascending.
    pub fn sort_entries(&mut self) {
        self.rates.sort_by(compare_entries);
    }

    /// Check the name ordering invariant.
    pub fn is_sorted(&self) -> bool {
        self.rates
            .windows(2)
            .all(|pair| compare_entries(&pair[0], &pair[1]) != Ordering::Greater)
    }

    /// Look up an entry by code.
    pub fn get(&self, code: &str) -> Option<&RateEntry> {
        self.rates.iter().find(|entry| entry.code == code)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Check if the snapshot has no entries.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Entries that moved during one refresh cycle, keyed by code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateChangeSet(BTreeMap<String, RateEntry>);

impl RateChangeSet {
    /// Collect every entry of the snapshot whose change is non-zero.
    pub fn from_snapshot(snapshot: &RateSnapshot) -> Self {
        Self(
            snapshot
                .rates
                .iter()
                .filter(|entry| entry.has_changed())
                .map(|entry| (entry.code.clone(), entry.clone()))
                .collect(),
        )
    }

    /// Look up a changed entry by code.
    pub fn get(&self, code: &str) -> Option<&RateEntry> {
        self.0.get(code)
    }

    /// Iterate over changed entries in code order.
    pub fn iter(&self) -> impl Iterator<Item = &RateEntry> {
        self.0.values()
    }

    /// Number of changed entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(code: &str, name: &str, rate: f64, change: f64) -> RateEntry {
        RateEntry {
            code: code.to_string(),
            name: name.to_string(),
            rate,
            change,
        }
    }

    #[test]
    fn test_directory_unknown_code() {
        let directory = CurrencyDirectory::from([("EUR", "Euro")]);
        assert_eq!(directory.name("EUR"), "Euro");
        assert_eq!(directory.name("XYZ"), "");
    }

    #[test]
    fn test_snapshot_sorted_by_name() {
        let snapshot = RateSnapshot::new(
            "USD",
            Utc::now(),
            vec![
                entry("JPY", "Japanese Yen", 150.0, 0.0),
                entry("EUR", "Euro", 0.9, 0.0),
                entry("GBP", "british Pound", 0.8, 0.0),
            ],
        );

        let codes: Vec<&str> = snapshot.rates.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["GBP", "EUR", "JPY"]);
        assert!(snapshot.is_sorted());
    }

    #[test]
    fn test_unknown_names_sort_first() {
        let snapshot = RateSnapshot::new(
            "USD",
            Utc::now(),
            vec![entry("EUR", "Euro", 0.9, 0.0), entry("XYZ", "", 3.0, 0.0)],
        );
        assert_eq!(snapshot.rates[0].code, "XYZ");
    }

    #[test]
    fn test_change_set_only_moved_entries() {
        let snapshot = RateSnapshot::new(
            "USD",
            Utc::now(),
            vec![
                entry("EUR", "Euro", 0.855, -0.045),
                entry("GBP", "British Pound", 0.8, 0.0),
            ],
        );

        let changes = RateChangeSet::from_snapshot(&snapshot);
        assert_eq!(changes.len(), 1);
        assert!(changes.get("EUR").is_some());
        assert!(changes.get("GBP").is_none());
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let snapshot = RateSnapshot::new(
            "USD",
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            vec![entry("EUR", "Euro", 0.9, 0.0)],
        );

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["base"], "USD");
        assert_eq!(json["lastUpdatedAt"], 1_700_000_000_000i64);
        assert_eq!(json["rates"][0]["code"], "EUR");
    }

    #[test]
    fn test_change_set_serializes_as_map() {
        let snapshot = RateSnapshot::new(
            "USD",
            Utc::now(),
            vec![entry("EUR", "Euro", 0.855, -0.045)],
        );
        let json = serde_json::to_value(RateChangeSet::from_snapshot(&snapshot)).unwrap();
        assert_eq!(json["EUR"]["name"], "Euro");
    }

    fn arb_entry() -> impl Strategy<Value = RateEntry> {
        ("[A-Z]{3}", "[A-Za-z ]{0,12}", 0.001f64..1000.0, -5.0f64..5.0)
            .prop_map(|(code, name, rate, change)| RateEntry { code, name, rate, change })
    }

    proptest! {
        #[test]
        fn prop_sort_is_idempotent(entries in prop::collection::vec(arb_entry(), 0..40)) {
            let mut snapshot = RateSnapshot::new("USD", Utc::now(), entries);
            prop_assert!(snapshot.is_sorted());

            let before = snapshot.rates.clone();
            snapshot.sort_entries();
            prop_assert_eq!(before, snapshot.rates);
        }

        #[test]
        fn prop_change_set_matches_nonzero(entries in prop::collection::vec(arb_entry(), 0..40)) {
            let snapshot = RateSnapshot::new("USD", Utc::now(), entries);
            let changes = RateChangeSet::from_snapshot(&snapshot);

            for entry in &snapshot.rates {
                if entry.change != 0.0 {
                    prop_assert!(changes.get(&entry.code).is_some());
                }
            }
            prop_assert!(changes.iter().all(|e| e.change != 0.0));
        }
    }
}
