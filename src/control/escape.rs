//! Octal escaping used in control-mode output payloads.
//!
//! The remote encodes each raw byte outside the printable ASCII range as a
//! three-digit octal escape (`\012` for newline, `\134` for backslash via
//! `\\`), so multi-byte UTF-8 codepoints arrive as runs of consecutive
//! escapes. Decoding happens in place: the write index never passes the read
//! index, so a payload can be decoded inside the buffer it arrived in.

/// Octal digit check (`'0'..='7'`).
#[inline]
fn is_octal(b: u8) -> bool {
    (b & !7) == b'0'
}

/// Decode the control-mode escape forms in `buf`, truncating it to the
/// decoded length.
///
/// Recognized forms:
/// - `\` + three octal digits → the byte value modulo 256
/// - `\\` → a literal backslash
/// - any raw byte below `0x20` is malformed (logged, copied verbatim)
/// - everything else is copied verbatim
///
/// An escape cut short by the end of the payload has its remaining bytes
/// replaced with `?`.
pub fn unescape_in_place(buf: &mut Vec<u8>) {
    let len = buf.len();
    let mut out = 0;
    let mut i = 0;

    while i < len {
        let b = buf[i];
        if b == b'\\' {
            if i + 3 < len && is_octal(buf[i + 1]) && is_octal(buf[i + 2]) && is_octal(buf[i + 3])
            {
                let val = (u32::from(buf[i + 1] & 7) << 6)
                    | (u32::from(buf[i + 2] & 7) << 3)
                    | u32::from(buf[i + 3] & 7);
                buf[out] = (val & 0xff) as u8;
                out += 1;
                i += 4;
                continue;
            }
            if i + 1 < len && buf[i + 1] == b'\\' {
                buf[out] = b'\\';
                out += 1;
                i += 2;
                continue;
            }
            if len - i < 4 {
                // Truncated escape at end of payload.
                log::debug!("unescape: truncated escape: {}", preview(&buf[i..len]));
                while i < len {
                    buf[out] = b'?';
                    out += 1;
                    i += 1;
                }
                break;
            }
            log::debug!("unescape: malformed input: {}", preview(&buf[i..len]));
            buf[out] = b;
            out += 1;
            i += 1;
            continue;
        }

        if b < 0x20 {
            log::debug!("unescape: malformed input: {}", preview(&buf[i..len]));
        }
        buf[out] = b;
        out += 1;
        i += 1;
    }

    buf.truncate(out);
}

/// Decode a borrowed payload into a fresh buffer.
pub fn unescape(data: &[u8]) -> Vec<u8> {
    let mut buf = data.to_vec();
    unescape_in_place(&mut buf);
    buf
}

/// First few bytes of a malformed payload, for the log line.
fn preview(data: &[u8]) -> String {
    let head = &data[..data.len().min(10)];
    String::from_utf8_lossy(head).escape_debug().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The inverse encoding: `\` doubled, bytes outside `0x20..=0x7E` as
    /// three-digit octal. Only the decoder ships; the encoder exists to
    /// check the round trip.
    fn escape(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        for &b in data {
            if b == b'\\' {
                out.extend_from_slice(b"\\\\");
            } else if b < 0x20 || b > 0x7e {
                out.extend_from_slice(format!("\\{:03o}", b).as_bytes());
            } else {
                out.push(b);
            }
        }
        out
    }

    #[test]
    fn octal_escape_decodes_to_byte() {
        assert_eq!(unescape(b"a\\101b"), b"aAb");
    }

    #[test]
    fn doubled_backslash_decodes_to_one() {
        assert_eq!(unescape(b"a\\\\c"), b"a\\c");
    }

    #[test]
    fn mixed_payload() {
        // "%output %7 a\101b\\c" body from the wire.
        assert_eq!(unescape(b"a\\101b\\\\c"), b"aAb\\c");
    }

    #[test]
    fn newline_escape() {
        assert_eq!(unescape(b"hello\\012world"), b"hello\nworld");
    }

    #[test]
    fn plain_text_unchanged() {
        assert_eq!(unescape(b"plain text"), b"plain text");
    }

    #[test]
    fn empty_payload() {
        assert_eq!(unescape(b""), b"");
    }

    #[test]
    fn high_octal_wraps_modulo_256() {
        // \777 = 511 -> 255.
        assert_eq!(unescape(b"\\777"), [0xff]);
    }

    #[test]
    fn non_octal_digits_copied_verbatim() {
        assert_eq!(unescape(b"x\\089y"), b"x\\089y");
    }

    #[test]
    fn truncated_escape_becomes_question_marks() {
        assert_eq!(unescape(b"end\\01"), b"end???");
        assert_eq!(unescape(b"end\\"), b"end?");
    }

    #[test]
    fn trailing_doubled_backslash_still_decodes() {
        assert_eq!(unescape(b"end\\\\"), b"end\\");
    }

    #[test]
    fn control_bytes_copied_verbatim() {
        assert_eq!(unescape(b"a\x1bb"), b"a\x1bb");
    }

    #[test]
    fn multibyte_utf8_reassembles() {
        // U+00BB as \302\273.
        assert_eq!(unescape(b"\\302\\273"), "\u{bb}".as_bytes());
    }

    #[test]
    fn in_place_truncates_buffer() {
        let mut buf = b"\\134\\134".to_vec();
        unescape_in_place(&mut buf);
        assert_eq!(buf, b"\\\\");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn never_panics(input in proptest::collection::vec(any::<u8>(), 0..256)) {
                let _ = unescape(&input);
            }

            #[test]
            fn raw_bytes_without_backslash_are_fixed_points(
                input in proptest::collection::vec(0x20u8..0x7f, 0..128)
            ) {
                prop_assume!(!input.contains(&b'\\'));
                prop_assert_eq!(unescape(&input), input);
            }

            #[test]
            fn round_trip(input in proptest::collection::vec(any::<u8>(), 0..128)) {
                prop_assert_eq!(unescape(&escape(&input)), input);
            }
        }
    }
}
