// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Expose the semihosting corpus fuzzer for the semifuzz binary and tests.
// Author: Lukas Bower
#![forbid(unsafe_code)]

pub mod fuzzer;
