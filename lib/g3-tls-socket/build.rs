/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::env;

#[allow(clippy::unusual_byte_groupings)]
fn main() {
    println!("cargo:rustc-check-cfg=cfg(ossl300)");

    if let Ok(version) = env::var("DEP_OPENSSL_VERSION_NUMBER") {
        // exported by the openssl-sys crate, which must stay a direct dependency
        let Ok(version) = u64::from_str_radix(&version, 16) else {
            println!("cargo:warning=invalid openssl version number {version}");
            return;
        };

        if version >= 0x3_00_00_00_0 {
            println!("cargo:rustc-cfg=ossl300");
        }
    }
}
