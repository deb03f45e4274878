//! Window layout strings.
//!
//! A layout string is a 4-hex-digit checksum, a comma, and the cell tree
//! (`b25d,80x24,0,0,0`). This client keeps the remote authoritative for
//! layout, so parsing only validates the checksum and extracts the root
//! size; the raw string is retained for round-tripping.

use anyhow::{bail, Result};

/// A validated window layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    raw: String,
    /// Root cell width.
    pub sx: u32,
    /// Root cell height.
    pub sy: u32,
}

impl Layout {
    /// Parse and validate a layout string.
    pub fn parse(s: &str) -> Result<Self> {
        let Some((prefix, body)) = s.split_at_checked(4).and_then(|(p, rest)| {
            Some((p, rest.strip_prefix(',')?))
        }) else {
            bail!("layout too short: {s:?}");
        };

        let Ok(expected) = u16::from_str_radix(prefix, 16) else {
            bail!("bad layout checksum digits: {prefix:?}");
        };
        let actual = checksum(body);
        if expected != actual {
            bail!("layout checksum mismatch: expected {expected:04x}, computed {actual:04x}");
        }

        let (sx, sy) = root_size(body)?;
        Ok(Self { raw: s.to_string(), sx, sy })
    }

    /// Build the single-cell layout for a fresh window of the given size.
    pub fn single(sx: u32, sy: u32) -> Self {
        let body = format!("{sx}x{sy},0,0,0");
        let raw = format!("{:04x},{body}", checksum(&body));
        Self { raw, sx, sy }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Root `WxH` of the cell tree.
fn root_size(body: &str) -> Result<(u32, u32)> {
    let digits = |s: &str| -> (usize, Option<u32>) {
        let n = s.bytes().take_while(|b| b.is_ascii_digit()).count();
        (n, s[..n].parse().ok())
    };

    let (n, sx) = digits(body);
    let rest = &body[n..];
    let Some(rest) = rest.strip_prefix('x') else {
        bail!("bad layout root size: {body:?}");
    };
    let (_, sy) = digits(rest);
    match (sx, sy) {
        (Some(sx), Some(sy)) => Ok((sx, sy)),
        _ => bail!("bad layout root size: {body:?}"),
    }
}

/// Rotate-and-add checksum over the cell tree bytes.
fn checksum(body: &str) -> u16 {
    let mut csum: u16 = 0;
    for b in body.bytes() {
        csum = (csum >> 1).wrapping_add((csum & 1) << 15);
        csum = csum.wrapping_add(u16::from(b));
    }
    csum
}
