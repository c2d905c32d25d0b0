// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub(crate) mod cache;
pub(crate) mod criteria;
pub(crate) mod executor;
pub(crate) mod planner;
