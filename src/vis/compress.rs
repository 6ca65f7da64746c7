//! Zero-run compression of visibility rows.
//!
//! Non-zero bytes are copied; a run of zero bytes becomes a `0` followed by
//! the run length (at most 255).

pub fn compress_row(row: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(row.len());
    let mut i = 0;
    while i < row.len() {
        if row[i] != 0 {
            out.push(row[i]);
            i += 1;
            continue;
        }
        let mut run = 0u8;
        while i < row.len() && row[i] == 0 && run < u8::MAX {
            run += 1;
            i += 1;
        }
        out.push(0);
        out.push(run);
    }
    out
}

/// Expands a compressed row to `row_len` bytes. Returns `None` when the
/// data ends early.
pub fn decompress_row(data: &[u8], row_len: usize) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(row_len);
    let mut bytes = data.iter();
    while out.len() < row_len {
        let &b = bytes.next()?;
        if b != 0 {
            out.push(b);
            continue;
        }
        let &run = bytes.next()?;
        out.extend(std::iter::repeat_n(0, run as usize));
    }
    out.truncate(row_len);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_zero_runs_are_split() {
        let mut row = vec![0u8; 600];
        row[0] = 0x81;
        row[599] = 1;
        let packed = compress_row(&row);
        // 598 zeros: 255 + 255 + 88
        assert_eq!(packed, vec![0x81, 0, 255, 0, 255, 0, 88, 1]);
        assert_eq!(decompress_row(&packed, 600).unwrap(), row);
    }

    #[test]
    fn truncated_data_is_rejected() {
        assert_eq!(decompress_row(&[0xff, 0], 4), None);
    }
}
