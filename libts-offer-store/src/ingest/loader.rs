// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Load orchestration: hotels into the hotel table, offers through the
//! interner into the columnar store in one streaming pass, then indexes
//! over the frozen store. Offers referencing unknown hotels or carrying
//! unparsable required timestamps are dropped at ingest and never
//! resurface later.

use crate::api::{Hotel, LoadStats, ProgressEvent};
use crate::collections::identifiable::StringId;
use crate::collections::string_table::StringTable;
use crate::config::EngineConfig;
use crate::error::IngestError;
use crate::index::OfferIndexes;
use crate::ingest::dates::{days_between, parse_timestamp_ms};
use crate::ingest::delimited::{DelimitedReader, Record, Schema, SchemaField};
use crate::storage::{HotelTable, OfferRow, OfferStore};
use anyhow::Context;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Rows between coarse progress events on the offers pass.
const PROGRESS_BATCH_ROWS: usize = 1 << 20;

const TWO_HOURS_MS: i64 = 2 * 3_600_000;
const DEFAULT_DURATION_DAYS: u16 = 7;

pub type ProgressObserver = dyn Fn(&ProgressEvent) + Send + Sync;

mod hotel_fields {
    pub const ID: usize = 0;
    pub const NAME: usize = 1;
    pub const STARS: usize = 2;
}

static HOTELS_SCHEMA: Schema = Schema {
    fields: &[
        SchemaField {
            name: "hotelid",
            aliases: &[],
            required: true,
        },
        SchemaField {
            name: "hotelname",
            aliases: &[],
            required: true,
        },
        SchemaField {
            name: "hotelstars",
            aliases: &[],
            required: true,
        },
    ],
    strict_order: true,
};

mod offer_fields {
    pub const HOTEL_ID: usize = 0;
    pub const OUTBOUND_DEPARTURE: usize = 1;
    pub const INBOUND_DEPARTURE: usize = 2;
    pub const OUTBOUND_ARRIVAL: usize = 3;
    pub const INBOUND_ARRIVAL: usize = 4;
    pub const ADULTS: usize = 5;
    pub const CHILDREN: usize = 6;
    pub const PRICE: usize = 7;
    pub const OUTBOUND_DEPARTURE_AIRPORT: usize = 8;
    pub const INBOUND_DEPARTURE_AIRPORT: usize = 9;
    pub const OUTBOUND_ARRIVAL_AIRPORT: usize = 10;
    pub const INBOUND_ARRIVAL_AIRPORT: usize = 11;
    pub const MEAL_TYPE: usize = 12;
    pub const ROOM_TYPE: usize = 13;
    pub const DURATION: usize = 14;
    pub const OCEAN_VIEW: usize = 15;
}

static OFFERS_SCHEMA: Schema = Schema {
    fields: &[
        SchemaField {
            name: "hotelid",
            aliases: &[],
            required: true,
        },
        SchemaField {
            name: "outbounddeparturedatetime",
            aliases: &["departuredate"],
            required: true,
        },
        SchemaField {
            name: "inbounddeparturedatetime",
            aliases: &["returndate"],
            required: true,
        },
        SchemaField {
            name: "outboundarrivaldatetime",
            aliases: &[],
            required: false,
        },
        SchemaField {
            name: "inboundarrivaldatetime",
            aliases: &[],
            required: false,
        },
        SchemaField {
            name: "countadults",
            aliases: &[],
            required: true,
        },
        SchemaField {
            name: "countchildren",
            aliases: &[],
            required: true,
        },
        SchemaField {
            name: "price",
            aliases: &[],
            required: true,
        },
        SchemaField {
            name: "outbounddepartureairport",
            aliases: &[],
            required: true,
        },
        SchemaField {
            name: "inbounddepartureairport",
            aliases: &[],
            required: true,
        },
        SchemaField {
            name: "outboundarrivalairport",
            aliases: &[],
            required: true,
        },
        SchemaField {
            name: "inboundarrivalairport",
            aliases: &[],
            required: true,
        },
        SchemaField {
            name: "mealtype",
            aliases: &[],
            required: true,
        },
        SchemaField {
            name: "roomtype",
            aliases: &[],
            required: true,
        },
        SchemaField {
            name: "duration",
            aliases: &[],
            required: false,
        },
        SchemaField {
            name: "oceanview",
            aliases: &[],
            required: false,
        },
    ],
    strict_order: false,
};

/// Everything a successful load materializes. Owned by the engine and
/// replaced wholesale on re-load; indexes always describe exactly this
/// store's row set.
#[derive(Debug)]
pub struct LoadedDataset {
    pub interner: StringTable,
    pub hotels: HotelTable,
    pub store: OfferStore,
    pub indexes: OfferIndexes,
}

impl LoadedDataset {
    pub fn memory_bytes(&self) -> usize {
        self.interner.memory_bytes()
            + self.hotels.memory_bytes()
            + self.store.memory_bytes()
            + self.indexes.memory_bytes()
    }
}

pub struct Loader<'a> {
    config: &'a EngineConfig,
    progress: Option<&'a ProgressObserver>,
}

impl<'a> Loader<'a> {
    pub fn new(config: &'a EngineConfig, progress: Option<&'a ProgressObserver>) -> Self {
        Self { config, progress }
    }

    pub fn load(
        &self,
        hotels_path: &Path,
        offers_path: &Path,
    ) -> Result<(LoadedDataset, LoadStats), IngestError> {
        let started = Instant::now();
        let mut stats = LoadStats::default();

        self.emit(ProgressEvent::HotelsStart);
        info!(path = %hotels_path.display(), "loading hotels");
        let mut hotels = HotelTable::default();
        let outcome = self
            .reader(&HOTELS_SCHEMA)
            .read(hotels_path, |record| {
                let hotel = parse_hotel(record)?;
                hotels.insert(hotel)?;
                Ok(())
            })?;
        stats.hotels = hotels.len();
        stats.parse_errors += outcome.skipped as usize;
        info!(
            hotels = stats.hotels,
            skipped = outcome.skipped,
            "hotels loaded"
        );
        self.emit(ProgressEvent::HotelsDone {
            hotels: stats.hotels,
        });

        info!(path = %offers_path.display(), "loading offers");
        let mut interner = StringTable::new();
        let mut store = OfferStore::with_capacity(self.config.offer_capacity);
        let mut dropped: usize = 0;
        let mut arrivals_derived: usize = 0;
        let mut next_progress = PROGRESS_BATCH_ROWS;
        let outcome = self.reader(&OFFERS_SCHEMA).read(offers_path, |record| {
            match parse_offer(record, &hotels, &mut interner, &mut arrivals_derived)? {
                None => dropped += 1,
                Some(row) => {
                    store.append(&row).map_err(IngestError::from)?;
                    if store.len() == next_progress {
                        next_progress += PROGRESS_BATCH_ROWS;
                        debug!(appended = store.len(), dropped, "offer batch complete");
                        self.emit(ProgressEvent::OffersBatch {
                            appended: store.len(),
                            dropped,
                        });
                    }
                }
            }
            Ok(())
        })?;
        stats.offers_appended = store.len();
        stats.offers_dropped = dropped;
        stats.parse_errors += outcome.skipped as usize;
        stats.arrivals_derived = arrivals_derived;
        stats.interner_size = interner.len();
        info!(
            appended = stats.offers_appended,
            dropped = stats.offers_dropped,
            parse_errors = stats.parse_errors,
            "offers loaded"
        );
        self.emit(ProgressEvent::OffersDone {
            appended: stats.offers_appended,
            dropped,
        });

        let indexes = OfferIndexes::build(&store, self.config.numeric_index_cap);
        stats.indexes_skipped = indexes.skipped.len();
        stats.index_memory_bytes = indexes.memory_bytes();
        self.emit(ProgressEvent::IndexesDone);

        stats.load_time_ms = started.elapsed().as_millis() as u64;
        info!(
            load_time_ms = stats.load_time_ms,
            interner_size = stats.interner_size,
            index_memory_bytes = stats.index_memory_bytes,
            "load complete"
        );

        let dataset = LoadedDataset {
            interner,
            hotels,
            store,
            indexes,
        };
        Ok((dataset, stats))
    }

    fn reader<'s>(&self, schema: &'s Schema) -> DelimitedReader<'s> {
        DelimitedReader::new(schema)
            .skip_errors(self.config.skip_errors)
            .max_error_log(self.config.max_error_log)
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(observer) = self.progress {
            observer(&event);
        }
    }
}

fn parse_hotel(record: &Record<'_>) -> anyhow::Result<Hotel> {
    let id: u32 = record
        .require(hotel_fields::ID, "hotelid")?
        .trim()
        .parse()
        .context("hotelid")?;
    let name = record.require(hotel_fields::NAME, "hotelname")?.trim();
    anyhow::ensure!(!name.is_empty(), "empty hotelname");
    anyhow::ensure!(name.len() <= 255, "hotelname longer than 255 bytes");
    let stars: f32 = record
        .require(hotel_fields::STARS, "hotelstars")?
        .trim()
        .parse()
        .context("hotelstars")?;
    Ok(Hotel {
        id,
        name: name.to_owned(),
        stars: stars.clamp(0.0, 5.0),
    })
}

/// Parses one offer record. `Ok(None)` is an ingest-time drop (unknown
/// hotel, unparsable required timestamp, inverted trip); `Err` is a
/// malformed record that follows the skip_errors policy.
fn parse_offer(
    record: &Record<'_>,
    hotels: &HotelTable,
    interner: &mut StringTable,
    arrivals_derived: &mut usize,
) -> anyhow::Result<Option<OfferRow>> {
    use offer_fields as f;

    let hotel_id: u32 = record
        .require(f::HOTEL_ID, "hotelid")?
        .trim()
        .parse()
        .context("hotelid")?;
    if !hotels.contains(hotel_id) {
        return Ok(None);
    }

    let Some(outbound_departure_ts) =
        parse_timestamp_ms(record.require(f::OUTBOUND_DEPARTURE, "outbounddeparturedatetime")?)
    else {
        return Ok(None);
    };
    let Some(inbound_departure_ts) =
        parse_timestamp_ms(record.require(f::INBOUND_DEPARTURE, "inbounddeparturedatetime")?)
    else {
        return Ok(None);
    };
    if inbound_departure_ts < outbound_departure_ts {
        return Ok(None);
    }

    let mut derived = false;
    let outbound_arrival_ts = optional_timestamp(
        record.get(f::OUTBOUND_ARRIVAL),
        "outboundarrivaldatetime",
        outbound_departure_ts,
        &mut derived,
    )?;
    let inbound_arrival_ts = optional_timestamp(
        record.get(f::INBOUND_ARRIVAL),
        "inboundarrivaldatetime",
        inbound_departure_ts,
        &mut derived,
    )?;
    if derived {
        *arrivals_derived += 1;
    }

    let count_adults: u8 = record
        .require(f::ADULTS, "countadults")?
        .trim()
        .parse()
        .context("countadults")?;
    let count_children: u8 = record
        .require(f::CHILDREN, "countchildren")?
        .trim()
        .parse()
        .context("countchildren")?;
    let price: f32 = record
        .require(f::PRICE, "price")?
        .trim()
        .parse()
        .context("price")?;
    anyhow::ensure!(price >= 0.0 && price.is_finite(), "negative price");

    let duration = match record.get(f::DURATION).map(str::trim) {
        Some(raw) if !raw.is_empty() => raw.parse().context("duration")?,
        _ => {
            let days = days_between(outbound_departure_ts, inbound_departure_ts);
            if days > 0 {
                u16::try_from(days).unwrap_or(u16::MAX)
            } else {
                DEFAULT_DURATION_DAYS
            }
        }
    };

    let ocean_view = match record.get(f::OCEAN_VIEW).map(str::trim) {
        Some(raw) if !raw.is_empty() => parse_bool(raw).context("oceanview")?,
        _ => false,
    };

    let mut intern = |field: usize, name: &str| -> anyhow::Result<StringId> {
        let raw = record.require(field, name)?.trim();
        interner
            .intern(raw)
            .map_err(|e| anyhow::Error::new(IngestError::Interner(e)))
    };

    Ok(Some(OfferRow {
        hotel_id,
        price,
        count_adults,
        count_children,
        outbound_departure_ts,
        inbound_departure_ts,
        outbound_arrival_ts,
        inbound_arrival_ts,
        outbound_departure_airport: intern(
            f::OUTBOUND_DEPARTURE_AIRPORT,
            "outbounddepartureairport",
        )?,
        inbound_departure_airport: intern(f::INBOUND_DEPARTURE_AIRPORT, "inbounddepartureairport")?,
        outbound_arrival_airport: intern(f::OUTBOUND_ARRIVAL_AIRPORT, "outboundarrivalairport")?,
        inbound_arrival_airport: intern(f::INBOUND_ARRIVAL_AIRPORT, "inboundarrivalairport")?,
        meal_type: intern(f::MEAL_TYPE, "mealtype")?,
        room_type: intern(f::ROOM_TYPE, "roomtype")?,
        ocean_view,
        duration,
    }))
}

/// Optional arrival column: absent or empty derives departure + 2h, which
/// the source system did; the derivation is surfaced via LoadStats.
fn optional_timestamp(
    raw: Option<&str>,
    name: &str,
    departure_ts: i64,
    derived: &mut bool,
) -> anyhow::Result<i64> {
    match raw.map(str::trim) {
        Some(raw) if !raw.is_empty() => {
            parse_timestamp_ms(raw).ok_or_else(|| anyhow::anyhow!("unparsable {name}"))
        }
        _ => {
            *derived = true;
            Ok(departure_ts + TWO_HOURS_MS)
        }
    }
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => anyhow::bail!("not a boolean: '{other}'"),
    }
}
