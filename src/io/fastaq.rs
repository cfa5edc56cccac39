//! # FASTA/FASTQ ingestion
//!
//! Thin wrapper over `noodles` with transparent gzip. Format is sniffed
//! from the first byte of the (decompressed) stream, so `.fa`, `.fq` and
//! their `.gz` variants all flow through one entry point.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use noodles::{fasta, fastq};
use tracing::debug;

use crate::error::{PangeneError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Open a possibly-gzipped file as a raw byte stream.
fn open_maybe_gzipped(path: &Path) -> Result<Box<dyn Read>> {
    let mut file = File::open(path).map_err(|_| PangeneError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    let mut magic = [0u8; 2];
    let n = file.read(&mut magic)?;
    let reopened = File::open(path)?;
    if n == 2 && magic == GZIP_MAGIC {
        Ok(Box::new(MultiGzDecoder::new(reopened)))
    } else {
        Ok(Box::new(reopened))
    }
}

/// Read all records of a FASTA or FASTQ file as `(name, sequence)` pairs.
/// Sequences are upper-cased; record order is preserved.
pub fn read_sequences(path: impl AsRef<Path>) -> Result<Vec<(String, String)>> {
    let path = path.as_ref();
    let mut reader = BufReader::new(open_maybe_gzipped(path)?);
    let first = {
        let buf = reader.fill_buf()?;
        buf.first().copied()
    };
    let records = match first {
        Some(b'>') => read_fasta(reader)?,
        Some(b'@') => read_fastq(reader)?,
        _ => {
            return Err(PangeneError::invalid_data(format!(
                "{} is neither FASTA nor FASTQ",
                path.display()
            )))
        }
    };
    debug!(path = %path.display(), records = records.len(), "read sequences");
    Ok(records)
}

fn read_fasta(reader: impl BufRead) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    let mut reader = fasta::io::Reader::new(reader);
    for result in reader.records() {
        let record = result?;
        let name = String::from_utf8_lossy(record.name()).into_owned();
        let seq = String::from_utf8_lossy(record.sequence().as_ref())
            .to_ascii_uppercase();
        out.push((name, seq));
    }
    Ok(out)
}

fn read_fastq(reader: impl BufRead) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    let mut reader = fastq::io::Reader::new(reader);
    for result in reader.records() {
        let record = result?;
        let name = String::from_utf8_lossy(record.name()).into_owned();
        let seq = String::from_utf8_lossy(record.sequence()).to_ascii_uppercase();
        out.push((name, seq));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn write_temp(content: &[u8], suffix: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_read_fasta() {
        let file = write_temp(b">read1 extra\nacgt\nACGT\n>read2\nTTTT\n", ".fa");
        let records = read_sequences(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, "read1");
        assert_eq!(records[0].1, "ACGTACGT");
        assert_eq!(records[1], ("read2".to_string(), "TTTT".to_string()));
    }

    #[test]
    fn test_read_fastq() {
        let file = write_temp(b"@read1\nACGT\n+\nIIII\n", ".fq");
        let records = read_sequences(file.path()).unwrap();
        assert_eq!(records, vec![("read1".to_string(), "ACGT".to_string())]);
    }

    #[test]
    fn test_read_gzipped_fasta() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b">read1\nACGT\n").unwrap();
        let compressed = encoder.finish().unwrap();
        let file = write_temp(&compressed, ".fa.gz");
        let records = read_sequences(file.path()).unwrap();
        assert_eq!(records, vec![("read1".to_string(), "ACGT".to_string())]);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let file = write_temp(b"not a sequence file\n", ".txt");
        assert!(read_sequences(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_is_file_not_found() {
        let err = read_sequences("/definitely/not/here.fa").unwrap_err();
        assert!(matches!(err, PangeneError::FileNotFound { .. }));
    }
}
