/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;

/// Cipher selection in the OpenSSL cipher list grammar.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CipherPolicy {
    Default,
    Ecdh,
    Not(Box<CipherPolicy>),
    List(Vec<CipherPolicy>),
    Custom(String),
}

impl CipherPolicy {
    pub fn not(policy: CipherPolicy) -> Self {
        CipherPolicy::Not(Box::new(policy))
    }
}

impl fmt::Display for CipherPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherPolicy::Default => f.write_str("DEFAULT"),
            CipherPolicy::Ecdh => f.write_str("ECDH"),
            CipherPolicy::Not(p) => write!(f, "!{p}"),
            CipherPolicy::List(list) => {
                for (i, p) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str(":")?;
                    }
                    write!(f, "{p}")?;
                }
                Ok(())
            }
            CipherPolicy::Custom(s) => f.write_str(s),
        }
    }
}

impl FromStr for CipherPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow!("empty cipher policy"));
        }

        let parse_one = |item: &str| -> anyhow::Result<CipherPolicy> {
            if let Some(negated) = item.strip_prefix('!') {
                if negated.is_empty() || negated.starts_with('!') {
                    return Err(anyhow!("invalid negated cipher {item}"));
                }
                return Ok(CipherPolicy::not(one_cipher(negated)));
            }
            Ok(one_cipher(item))
        };

        let items: Vec<&str> = s.split(':').map(str::trim).collect();
        if items.iter().any(|i| i.is_empty()) {
            return Err(anyhow!("empty element in cipher policy {s}"));
        }
        if items.len() == 1 {
            parse_one(items[0])
        } else {
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                list.push(parse_one(item)?);
            }
            Ok(CipherPolicy::List(list))
        }
    }
}

fn one_cipher(s: &str) -> CipherPolicy {
    match s {
        "DEFAULT" => CipherPolicy::Default,
        "ECDH" => CipherPolicy::Ecdh,
        _ => CipherPolicy::Custom(s.to_string()),
    }
}
