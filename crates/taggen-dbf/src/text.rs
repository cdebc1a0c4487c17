//! Latin-1 text handling for fixed-width cells.

/// Byte written for characters outside Latin-1.
pub const REPLACEMENT_BYTE: u8 = b'?';

/// Encode to Latin-1, replacing anything above U+00FF.
pub fn encode(value: &str) -> Vec<u8> {
    value
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(REPLACEMENT_BYTE))
        .collect()
}

/// Decode Latin-1 bytes. Every byte maps to exactly one char.
pub fn decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Strip the padding a cell may carry: spaces, other ASCII whitespace, NULs.
pub fn trim_cell(value: &str) -> &str {
    value.trim_matches(|c: char| c.is_ascii_whitespace() || c == '\0')
}

/// Encode `value` into exactly `width` bytes, left-justified and space padded.
///
/// Returns the cell and the encoded length before truncation.
pub fn fit_cell(value: &str, width: usize) -> (Vec<u8>, usize) {
    let mut bytes = encode(value);
    let length = bytes.len();
    bytes.resize(width, b' ');
    (bytes, length)
}

/// The value a cell of `width` bytes would read back as.
///
/// This is what comparing a wanted value against a stored one has to use,
/// otherwise anything over-long or outside Latin-1 looks changed forever.
pub fn fit_to_width(value: &str, width: usize) -> String {
    let (cell, _) = fit_cell(value, width);
    trim_cell(&decode(&cell)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_replaces_non_latin1() {
        assert_eq!(encode("Pumpé"), vec![b'P', b'u', b'm', b'p', 0xE9]);
        assert_eq!(encode("泵1"), vec![b'?', b'1']);
    }

    #[test]
    fn test_decode_is_latin1() {
        assert_eq!(decode(&[b'A', 0xE9, b' ']), "Aé ");
    }

    #[test]
    fn test_fit_cell_pads_and_truncates() {
        assert_eq!(fit_cell("AB", 4), (b"AB  ".to_vec(), 2));
        assert_eq!(fit_cell("ABCDEF", 4), (b"ABCD".to_vec(), 6));
    }

    #[test]
    fn test_fit_to_width_matches_read_back() {
        assert_eq!(fit_to_width("  Motor 1  ", 20), "Motor 1");
        assert_eq!(fit_to_width("Conveyor", 4), "Conv");
        assert_eq!(fit_to_width("泵", 4), "?");
    }

    #[test]
    fn test_trim_cell_strips_nul_padding() {
        assert_eq!(trim_cell("TAG\0\0\0"), "TAG");
        assert_eq!(trim_cell("\t x \r\n"), "x");
    }
}
