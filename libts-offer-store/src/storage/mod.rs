// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod hotel_table;
mod offer_store;

pub use hotel_table::*;
pub use offer_store::*;
