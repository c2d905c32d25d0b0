// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios over real fixture files: load two delimited
//! files, query through the public engine surface only.

use libts_offer_store::{EngineConfig, OfferEngine, SearchCriteria};
use std::io::Write;

const HOTELS: &str = "hotelid;hotelname;hotelstars\n\
1;Strandhotel;4.0\n\
2;Bergblick;3.0\n\
3;Palast;5.0\n";

// All h1 offers depart FRA, all h2 from MUC, h3 from FRA.
const OFFERS: &str = "hotelid;outbounddeparturedatetime;inbounddeparturedatetime;countadults;\
countchildren;price;outbounddepartureairport;inbounddepartureairport;\
outboundarrivalairport;inboundarrivalairport;mealtype;roomtype;oceanview\n\
1;2024-06-01;2024-06-08;2;0;100;FRA;PMI;PMI;FRA;halfboard;double;false\n\
2;2024-06-01;2024-06-08;2;0;200;MUC;PMI;PMI;MUC;halfboard;double;false\n\
1;2024-06-01;2024-06-08;2;0;80;FRA;PMI;PMI;FRA;none;single;true\n\
3;2024-06-02;2024-06-09;2;0;300;FRA;PMI;PMI;FRA;allinclusive;suite;true\n\
2;2024-06-02;2024-06-09;2;0;150;MUC;PMI;PMI;MUC;none;double;false\n";

fn fixture(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn engine_with(hotels: &str, offers: &str) -> OfferEngine {
    let hotels = fixture(hotels);
    let offers = fixture(offers);
    let config = EngineConfig {
        offer_capacity: 1_000,
        pressure_trim: false,
        ..EngineConfig::default()
    };
    let mut engine = OfferEngine::new(config);
    engine.load(hotels.path(), offers.path()).unwrap();
    engine
}

#[test]
fn empty_criteria_returns_cheapest_per_hotel_in_price_order() {
    let engine = engine_with(HOTELS, OFFERS);
    let result = engine.best_by_hotel(&SearchCriteria::default()).unwrap();

    let summary: Vec<(u32, f32)> = result.iter().map(|b| (b.hotel_id, b.min_price)).collect();
    assert_eq!(vec![(1, 80.0), (2, 150.0), (3, 300.0)], summary);

    // Representative fields come from the cheapest surviving offer.
    assert_eq!("Strandhotel", result[0].hotel_name);
    assert_eq!(4.0, result[0].hotel_stars);
    assert_eq!("single", result[0].room_type);
    assert_eq!(2, result[0].available_offers_count);
    assert!(result.notices.is_empty());
}

#[test]
fn airport_filter() {
    let engine = engine_with(HOTELS, OFFERS);
    let criteria = SearchCriteria {
        departure_airports: vec!["FRA".to_owned()],
        ..Default::default()
    };
    let result = engine.best_by_hotel(&criteria).unwrap();
    let summary: Vec<(u32, f32)> = result.iter().map(|b| (b.hotel_id, b.min_price)).collect();
    assert_eq!(vec![(1, 80.0), (3, 300.0)], summary);
}

#[test]
fn date_bound_inclusivity() {
    let engine = engine_with(HOTELS, OFFERS);

    // Offers departing exactly on the earliest day must be present.
    let criteria = SearchCriteria {
        earliest_departure_date: Some("2024-06-01".to_owned()),
        ..Default::default()
    };
    let result = engine.best_by_hotel(&criteria).unwrap();
    assert_eq!(3, result.len());

    // One day later the 2024-06-01 departures must be absent.
    let criteria = SearchCriteria {
        earliest_departure_date: Some("2024-06-02".to_owned()),
        ..Default::default()
    };
    let result = engine.best_by_hotel(&criteria).unwrap();
    let summary: Vec<(u32, f32)> = result.iter().map(|b| (b.hotel_id, b.min_price)).collect();
    assert_eq!(vec![(2, 150.0), (3, 300.0)], summary);
}

#[test]
fn unknown_hotel_offers_are_dropped_at_ingest() {
    let offers = format!(
        "{OFFERS}999;2024-06-01;2024-06-08;2;0;10;FRA;PMI;PMI;FRA;none;double;false\n"
    );
    let engine = engine_with(HOTELS, &offers);

    let stats = engine.stats().unwrap();
    assert!(stats.offers_dropped >= 1);
    assert_eq!(5, stats.offers_appended);

    let best = engine.best_by_hotel(&SearchCriteria::default()).unwrap();
    assert!(best.iter().all(|b| b.hotel_id != 999));
    let offers = engine
        .offers_for_hotel(999, &SearchCriteria::default())
        .unwrap();
    assert!(offers.is_empty());
}

#[test]
fn passenger_counts_match_exactly() {
    let engine = engine_with(HOTELS, OFFERS);
    let criteria = SearchCriteria {
        count_adults: Some(2),
        count_children: Some(1),
        ..Default::default()
    };
    // Every offer in the fixture is (2 adults, 0 children).
    let result = engine.best_by_hotel(&criteria).unwrap();
    assert!(result.is_empty());

    let criteria = SearchCriteria {
        count_adults: Some(2),
        count_children: Some(0),
        ..Default::default()
    };
    let result = engine.best_by_hotel(&criteria).unwrap();
    assert_eq!(3, result.len());
}

#[test]
fn offers_for_hotel_sorted_by_price() {
    let engine = engine_with(HOTELS, OFFERS);
    let result = engine
        .offers_for_hotel(1, &SearchCriteria::default())
        .unwrap();
    let prices: Vec<f32> = result.iter().map(|o| o.price).collect();
    assert_eq!(vec![80.0, 100.0], prices);
    assert!(result.iter().all(|o| o.hotel_id == 1));
    assert_eq!("FRA", result[0].outbound_departure_airport);
}

#[test]
fn combined_filters() {
    let engine = engine_with(HOTELS, OFFERS);
    let criteria = SearchCriteria {
        departure_airports: vec!["FRA".to_owned()],
        ocean_view: Some(true),
        max_price: Some(250.0),
        ..Default::default()
    };
    let result = engine.best_by_hotel(&criteria).unwrap();
    let summary: Vec<(u32, f32)> = result.iter().map(|b| (b.hotel_id, b.min_price)).collect();
    assert_eq!(vec![(1, 80.0)], summary);
}

#[test]
fn hotel_stars_filter() {
    let engine = engine_with(HOTELS, OFFERS);
    let criteria = SearchCriteria {
        hotel_stars: vec![5.0],
        ..Default::default()
    };
    let result = engine.best_by_hotel(&criteria).unwrap();
    let summary: Vec<(u32, f32)> = result.iter().map(|b| (b.hotel_id, b.min_price)).collect();
    assert_eq!(vec![(3, 300.0)], summary);
}

#[test]
fn criteria_deserialize_from_presentation_layer_json() {
    let engine = engine_with(HOTELS, OFFERS);
    let criteria: SearchCriteria = serde_json::from_str(
        r#"{
            "departure_airports": ["MUC"],
            "earliest_departure_date": "2024-06-01",
            "max_price": 180.0
        }"#,
    )
    .unwrap();
    let result = engine.best_by_hotel(&criteria).unwrap();
    let summary: Vec<(u32, f32)> = result.iter().map(|b| (b.hotel_id, b.min_price)).collect();
    assert_eq!(vec![(2, 150.0)], summary);
}
