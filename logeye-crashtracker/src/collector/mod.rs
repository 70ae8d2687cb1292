// Copyright 2024-Present Logeye, Inc.
// SPDX-License-Identifier: Apache-2.0

pub(crate) mod crash_handler;
pub(crate) mod stacktrace;
