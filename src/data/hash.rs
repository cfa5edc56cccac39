//! # Canonical k-mer hashing
//!
//! An invertible 64-bit integer mixer restricted to a low-bit mask, applied
//! to the 2-bit packing of a k-mer and of its reverse complement. The
//! canonical hash is the smaller of the two, so a k-mer and its reverse
//! complement always hash identically.

use crate::error::{PangeneError, Result};

/// Invertible integer hash (Thomas Wang's 64-bit mixer) restricted to the
/// low bits selected by `mask`.
#[inline]
pub fn hash64(mut key: u64, mask: u64) -> u64 {
    key = (!key).wrapping_add(key << 21) & mask;
    key ^= key >> 24;
    key = (key.wrapping_add(key << 3)).wrapping_add(key << 8) & mask;
    key ^= key >> 14;
    key = (key.wrapping_add(key << 2)).wrapping_add(key << 4) & mask;
    key ^= key >> 28;
    key = key.wrapping_add(key << 31) & mask;
    key
}

/// 2-bit base code: A=0, C=1, G=2, T=3. `None` for anything else.
#[inline]
pub fn base_to_code(base: u8) -> Option<u64> {
    match base.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

/// Hashes of a k-mer and its reverse complement, in that order.
///
/// `kmer.len() <= 32` is a contract; non-ACGT bases are rejected so callers
/// must filter first.
pub fn kmer_hashes(kmer: &[u8]) -> Result<(u64, u64)> {
    let k = kmer.len() as u32;
    assert!(k > 0 && k <= 32, "k must be in 1..=32, got {}", k);

    let mask: u64 = if k == 32 { u64::MAX } else { (1u64 << (2 * k)) - 1 };
    let shift = 2 * (k - 1);

    let mut fwd: u64 = 0;
    let mut rev: u64 = 0;
    for &base in kmer {
        let code = base_to_code(base).ok_or_else(|| {
            PangeneError::invalid_data(format!("non-ACGT base {:?} in k-mer", base as char))
        })?;
        fwd = ((fwd << 2) | code) & mask;
        rev = (rev >> 2) | ((3 - code) << shift);
    }

    Ok((hash64(fwd, mask), hash64(rev, mask)))
}

/// Canonical hash of a k-mer: `min(h_fwd, h_rev)`, plus the strand of the
/// canonical representative (`true` when the forward strand wins ties).
pub fn canonical_kmer_hash(kmer: &[u8]) -> Result<(u64, bool)> {
    let (fwd, rev) = kmer_hashes(kmer)?;
    if fwd <= rev {
        Ok((fwd, true))
    } else {
        Ok((rev, false))
    }
}

/// Reverse complement of an ACGT sequence. Non-ACGT bases map to `N`.
pub fn reverse_complement(seq: &str) -> String {
    seq.bytes()
        .rev()
        .map(|b| match b.to_ascii_uppercase() {
            b'A' => 'T',
            b'C' => 'G',
            b'G' => 'C',
            b'T' => 'A',
            _ => 'N',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash64_respects_mask() {
        let mask = (1u64 << 8) - 1;
        for key in [0u64, 1, 77, 255, 256, u64::MAX] {
            assert!(hash64(key, mask) <= mask);
        }
    }

    #[test]
    fn test_hash64_distinguishes_inputs() {
        let mask = (1u64 << 30) - 1;
        assert_ne!(hash64(3, mask), hash64(4, mask));
    }

    #[test]
    fn test_canonical_hash_matches_reverse_complement() {
        for s in ["ACGT", "AAAA", "GATTACA", "TTTTTTTTTTTTTTTT", "CAGTCCAGTCA"] {
            let rc = reverse_complement(s);
            let (h, _) = canonical_kmer_hash(s.as_bytes()).unwrap();
            let (h_rc, _) = canonical_kmer_hash(rc.as_bytes()).unwrap();
            assert_eq!(h, h_rc, "canonical hash differs for {} / {}", s, rc);
        }
    }

    #[test]
    fn test_strand_of_canonical_representative() {
        let (_, strand_fwd) = canonical_kmer_hash(b"ACGT").unwrap();
        // ACGT is its own reverse complement, so the forward strand wins.
        assert!(strand_fwd);

        let (_, s1) = canonical_kmer_hash(b"AACC").unwrap();
        let (_, s2) = canonical_kmer_hash(b"GGTT").unwrap();
        // Exactly one of a k-mer and its reverse complement is canonical.
        assert_ne!(s1, s2);
    }

    #[test]
    fn test_non_acgt_is_rejected() {
        assert!(kmer_hashes(b"ACNG").is_err());
    }

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement("ACGT"), "ACGT");
        assert_eq!(reverse_complement("AACG"), "CGTT");
    }
}
