//! Batch processing of uploaded tables
//!
//! Rows are resolved one at a time in input order; a row that cannot be
//! resolved keeps empty coordinates and the batch carries on.

use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{info, warn};

use crate::distance::{self, DistanceRounding};
use crate::location_resolver::LocationResolver;
use crate::models::{LocationQuery, ProcessedRecord, Resolution, RowResult};
use crate::scenario::{DESTINATION, LocationColumns, ORIGIN, PLAIN, Scenario, WAREHOUSE};
use crate::table::{Table, cell};

/// Receives progress updates while a batch runs
pub trait ProgressSink: Send + Sync {
    fn start(&self, _total: usize) {}
    fn advance(&self, done: usize, total: usize);
    fn finish(&self) {}
}

/// Discards progress updates
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn advance(&self, _done: usize, _total: usize) {}
}

impl ProgressSink for ProgressBar {
    fn start(&self, total: usize) {
        self.set_length(total as u64);
    }

    fn advance(&self, done: usize, _total: usize) {
        self.set_position(done as u64);
    }

    fn finish(&self) {
        self.finish_and_clear();
    }
}

/// Counts over every location resolved in a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub rows: usize,
    pub resolved: usize,
    pub not_found: usize,
    pub service_errors: usize,
}

impl BatchSummary {
    fn record(&mut self, result: &RowResult) {
        self.rows += 1;
        for resolution in result.resolutions() {
            match resolution {
                Resolution::Found(_) => self.resolved += 1,
                Resolution::NotFound => self.not_found += 1,
                Resolution::ServiceError { .. } => self.service_errors += 1,
            }
        }
    }
}

/// Everything a front end needs after a batch
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub scenario: Scenario,
    pub headers: Vec<String>,
    pub records: Vec<ProcessedRecord>,
    pub summary: BatchSummary,
}

/// Drives the resolver over a table
#[derive(Clone)]
pub struct Pipeline {
    resolver: LocationResolver,
    rounding: DistanceRounding,
}

impl Pipeline {
    pub fn new(resolver: LocationResolver, rounding: DistanceRounding) -> Self {
        Self { resolver, rounding }
    }

    /// Validate the table for `scenario`, then resolve every row.
    ///
    /// Fails before any lookup when required columns are missing.
    pub async fn run(
        &self,
        table: &Table,
        scenario: Scenario,
        progress: &dyn ProgressSink,
    ) -> crate::Result<BatchOutput> {
        scenario.validate_columns(&table.headers)?;

        let total = table.len();
        info!("Processing {} rows as {}", total, scenario);
        progress.start(total);

        let mut records = Vec::with_capacity(total);
        let mut summary = BatchSummary::default();

        for (index, row) in table.rows.iter().enumerate() {
            let result = self.process_row(table, row, scenario).await;
            summary.record(&result);
            records.push(ProcessedRecord {
                index,
                cells: row.clone(),
                category: scenario
                    .category_column()
                    .and_then(|column| cell(table, row, column))
                    .map(str::to_string),
                result,
            });
            progress.advance(index + 1, total);
        }

        progress.finish();
        info!(
            "Finished {}: {} rows, {} resolved, {} not found, {} service errors",
            scenario,
            summary.rows,
            summary.resolved,
            summary.not_found,
            summary.service_errors
        );

        Ok(BatchOutput {
            scenario,
            headers: table.headers.clone(),
            records,
            summary,
        })
    }

    async fn process_row(&self, table: &Table, row: &[String], scenario: Scenario) -> RowResult {
        match scenario {
            Scenario::Standard | Scenario::Volume => RowResult::Single {
                location: self.resolve_side(table, row, &PLAIN).await,
            },
            Scenario::SupplyChain => {
                let destination = self.resolve_side(table, row, &DESTINATION).await;
                let warehouse = self.resolve_side(table, row, &WAREHOUSE).await;
                RowResult::SupplyChain {
                    warehouse,
                    destination,
                }
            }
            Scenario::Distance => {
                let origin = self.resolve_side(table, row, &ORIGIN).await;
                let destination = self.resolve_side(table, row, &DESTINATION).await;
                let distance_km =
                    distance::distance_km(origin.location(), destination.location(), self.rounding);
                RowResult::Distance {
                    origin,
                    destination,
                    distance_km,
                }
            }
        }
    }

    async fn resolve_side(
        &self,
        table: &Table,
        row: &[String],
        columns: &LocationColumns,
    ) -> Resolution {
        let country = cell(table, row, columns.country_code).unwrap_or_default();
        let postal = cell(table, row, columns.postal_code);
        let city = cell(table, row, columns.city);

        match LocationQuery::new(country, postal, city) {
            Ok(query) => self.resolver.resolve(&query).await,
            Err(e) => {
                warn!("Row has no usable {}: {}", columns.country_code, e);
                Resolution::NotFound
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocmapError;
    use crate::geocoding::{Address, GeocodeHit, Geocoder};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Resolves "<anything>, <CC>" style queries to fixed points per country
    struct CountryGeocoder {
        calls: AtomicUsize,
    }

    fn point_for(country: &str) -> Option<(f64, f64)> {
        match country {
            "US" => Some((40.7128, -74.0060)),
            "GB" => Some((51.5074, -0.1278)),
            "DE" => Some((51.0504, 13.7373)),
            _ => None,
        }
    }

    #[async_trait]
    impl Geocoder for CountryGeocoder {
        async fn geocode(&self, query: &str) -> crate::Result<Option<GeocodeHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let country = query.rsplit([',', ' ']).next().unwrap_or_default().trim();
            if country == "XX" {
                return Err(LocmapError::api("service unavailable"));
            }
            Ok(point_for(country).map(|(latitude, longitude)| GeocodeHit {
                latitude,
                longitude,
                address: [("country_code", country.to_ascii_lowercase())]
                    .into_iter()
                    .collect(),
            }))
        }

        async fn reverse_geocode(&self, _: f64, _: f64) -> crate::Result<Option<Address>> {
            Ok(None)
        }
    }

    fn pipeline() -> (Pipeline, Arc<CountryGeocoder>) {
        let geocoder = Arc::new(CountryGeocoder {
            calls: AtomicUsize::new(0),
        });
        let resolver = LocationResolver::new(geocoder.clone());
        (Pipeline::new(resolver, DistanceRounding::Float), geocoder)
    }

    #[tokio::test]
    async fn test_missing_columns_abort_before_lookup() {
        let (pipeline, geocoder) = pipeline();
        let table = Table::from_bytes(b"country_code,city\nUS,Boston\n").unwrap();

        let err = pipeline
            .run(&table, Scenario::Standard, &NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, LocmapError::MissingColumns { .. }));
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_standard_batch_keeps_order_and_category() {
        let (pipeline, _) = pipeline();
        let table = Table::from_bytes(
            b"country_code,postal_code,city,layer\nUS,10001,New York,1\nFR,,Paris,2\n,,,3\n",
        )
        .unwrap();

        let output = pipeline
            .run(&table, Scenario::Standard, &NoProgress)
            .await
            .unwrap();

        assert_eq!(output.records.len(), 3);
        assert_eq!(output.records[0].category.as_deref(), Some("1"));
        assert!(matches!(
            &output.records[0].result,
            RowResult::Single { location } if location.is_found()
        ));
        assert!(matches!(
            &output.records[1].result,
            RowResult::Single { location: Resolution::NotFound }
        ));
        assert_eq!(
            output.summary,
            BatchSummary {
                rows: 3,
                resolved: 1,
                not_found: 2,
                service_errors: 0
            }
        );
    }

    #[tokio::test]
    async fn test_distance_batch() {
        let (pipeline, _) = pipeline();
        let table = Table::from_bytes(
            b"country_code_orig,postal_code_orig,city_orig,country_code_dest,postal_code_dest,city_dest\n\
US,10001,New York,GB,,London\n\
US,10001,New York,XX,,Atlantis\n",
        )
        .unwrap();

        let output = pipeline
            .run(&table, Scenario::Distance, &NoProgress)
            .await
            .unwrap();

        match &output.records[0].result {
            RowResult::Distance { distance_km, .. } => {
                let km = distance_km.unwrap();
                assert!((km - 5570.0).abs() <= 5.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &output.records[1].result {
            RowResult::Distance {
                destination,
                distance_km,
                ..
            } => {
                assert!(destination.is_service_error());
                assert!(distance_km.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(output.summary.service_errors, 1);
    }

    #[tokio::test]
    async fn test_supply_chain_resolves_both_ends() {
        let (pipeline, _) = pipeline();
        let table = Table::from_bytes(
            b"country_code_warehouse,postal_code_warehouse,city_warehouse,country_code_dest,postal_code_dest,city_dest,layer\n\
DE,01067,Dresden,US,10001,New York,2\n",
        )
        .unwrap();

        let output = pipeline
            .run(&table, Scenario::SupplyChain, &NoProgress)
            .await
            .unwrap();

        match &output.records[0].result {
            RowResult::SupplyChain {
                warehouse,
                destination,
            } => {
                assert_eq!(warehouse.location().unwrap().latitude, 51.0504);
                assert_eq!(destination.location().unwrap().latitude, 40.7128);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_progress_reaches_total() {
        struct Recorder(std::sync::Mutex<Vec<(usize, usize)>>);
        impl ProgressSink for Recorder {
            fn advance(&self, done: usize, total: usize) {
                self.0.lock().unwrap().push((done, total));
            }
        }

        let (pipeline, _) = pipeline();
        let table =
            Table::from_bytes(b"country_code,postal_code,city,volume\nUS,,,10\nDE,,,20\n").unwrap();
        let recorder = Recorder(std::sync::Mutex::new(Vec::new()));

        pipeline
            .run(&table, Scenario::Volume, &recorder)
            .await
            .unwrap();

        assert_eq!(*recorder.0.lock().unwrap(), vec![(1, 2), (2, 2)]);
    }
}
