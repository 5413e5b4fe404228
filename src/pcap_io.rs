//! Legacy pcap input and output.
//!
//! Records are read with `pcap_parser` and written back by hand in
//! little-endian byte order, keeping the source's timestamp precision.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, Linktype, PcapBlockOwned, PcapError, PcapHeader};
use tracing::debug;

use crate::error::{Error, Result};

/// Snap length declared in the output header.
pub const SNAPLEN: u32 = 65535;

const READ_BUFFER: usize = 65536;

/// Resolution of the fractional part of record timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Micro,
    Nano,
}

impl Precision {
    pub fn of(header: &PcapHeader) -> Self {
        if header.is_nanosecond_precision() {
            Self::Nano
        } else {
            Self::Micro
        }
    }

    const fn magic(self) -> u32 {
        match self {
            Self::Micro => 0xa1b2_c3d4,
            Self::Nano => 0xa1b2_3c4d,
        }
    }

    const fn nanos_per_unit(self) -> u32 {
        match self {
            Self::Micro => 1_000,
            Self::Nano => 1,
        }
    }

    pub fn to_datetime(self, sec: u32, frac: u32) -> Option<DateTime<Utc>> {
        let nanos = frac.checked_mul(self.nanos_per_unit())?;
        if nanos >= 1_000_000_000 {
            return None;
        }
        DateTime::from_timestamp(i64::from(sec), nanos)
    }

    /// Seconds and fraction as stored in a record header.
    pub fn split(self, ts: &DateTime<Utc>) -> Option<(u32, u32)> {
        let sec = u32::try_from(ts.timestamp()).ok()?;
        let nanos = ts.timestamp_subsec_nanos().min(999_999_999);
        Some((sec, nanos / self.nanos_per_unit()))
    }
}

// ─── Reader ───────────────────────────────────────────────────────────────────

/// One captured frame, owned by the pipeline while it is rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    pub timestamp: DateTime<Utc>,
    /// Length of the frame on the wire, which may exceed `data.len()`.
    pub orig_len: u32,
    pub data: Vec<u8>,
}

pub struct CaptureReader<R: Read> {
    reader: LegacyPcapReader<R>,
    header: PcapHeader,
    precision: Precision,
}

impl CaptureReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> CaptureReader<R> {
    /// Reads the global header and rejects anything but Ethernet captures.
    pub fn new(inner: R) -> Result<Self> {
        let mut reader = LegacyPcapReader::new(READ_BUFFER, inner)
            .map_err(|e| Error::Pcap(format!("not a valid legacy pcap file: {e:?}")))?;

        let header = loop {
            match reader.next() {
                Ok((offset, block)) => {
                    let header = match block {
                        PcapBlockOwned::LegacyHeader(hdr) => Some(hdr),
                        _ => None,
                    };
                    reader.consume(offset);
                    match header {
                        Some(hdr) => break hdr,
                        None => return Err(Error::Pcap("capture does not start with a pcap header".into())),
                    }
                }
                Err(PcapError::Incomplete(_)) => {
                    reader
                        .refill()
                        .map_err(|e| Error::Pcap(format!("refill error: {e:?}")))?;
                }
                Err(e) => return Err(Error::Pcap(format!("pcap header error: {e:?}"))),
            }
        };

        if header.network != Linktype::ETHERNET {
            return Err(Error::UnsupportedLinkType(header.network.0));
        }
        let precision = Precision::of(&header);
        debug!(
            "pcap v{}.{}, snaplen {}, {:?} precision",
            header.version_major, header.version_minor, header.snaplen, precision
        );
        Ok(Self {
            reader,
            header,
            precision,
        })
    }

    pub fn header(&self) -> &PcapHeader {
        &self.header
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Next record, or `None` at end of stream.
    pub fn next_record(&mut self) -> Result<Option<CaptureRecord>> {
        loop {
            match self.reader.next() {
                Ok((offset, block)) => {
                    let pkt: Option<(u32, u32, u32, Vec<u8>)> = match block {
                        PcapBlockOwned::Legacy(ref pkt) => {
                            Some((pkt.ts_sec, pkt.ts_usec, pkt.origlen, pkt.data.to_vec()))
                        }
                        PcapBlockOwned::LegacyHeader(_) => None,
                        PcapBlockOwned::NG(_) => {
                            return Err(Error::Pcap("pcapng block encountered, only legacy pcap is supported".into()));
                        }
                    };
                    drop(block);
                    self.reader.consume(offset);

                    if let Some((sec, frac, orig_len, data)) = pkt {
                        let timestamp = self
                            .precision
                            .to_datetime(sec, frac)
                            .ok_or_else(|| Error::Pcap(format!("invalid record timestamp {sec}.{frac}")))?;
                        return Ok(Some(CaptureRecord {
                            timestamp,
                            orig_len,
                            data,
                        }));
                    }
                }
                Err(PcapError::Eof) => return Ok(None),
                Err(PcapError::Incomplete(_)) => {
                    self.reader
                        .refill()
                        .map_err(|e| Error::Pcap(format!("refill error: {e:?}")))?;
                }
                Err(e) => return Err(Error::Pcap(format!("pcap parse error: {e:?}"))),
            }
        }
    }
}

// ─── Writer ───────────────────────────────────────────────────────────────────

pub struct CaptureWriter<W: Write> {
    inner: W,
    precision: Precision,
}

impl CaptureWriter<BufWriter<File>> {
    pub fn create(path: &Path, header: &PcapHeader) -> Result<Self> {
        let file = File::create(path).map_err(|source| Error::Create {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(BufWriter::new(file), header)
    }
}

impl<W: Write> CaptureWriter<W> {
    /// Writes the global header: the source's link type and precision with
    /// the maximum snap length.
    pub fn new(mut inner: W, source: &PcapHeader) -> Result<Self> {
        let precision = Precision::of(source);
        write_global_header(&mut inner, source, precision)?;
        Ok(Self { inner, precision })
    }

    pub fn write_record(&mut self, record: &CaptureRecord) -> Result<()> {
        let (ts_sec, ts_frac) = self
            .precision
            .split(&record.timestamp)
            .ok_or(Error::TimestampOutOfRange(record.timestamp))?;
        write_packet(&mut self.inner, ts_sec, ts_frac, record.orig_len, &record.data)?;
        Ok(())
    }

    /// Flushes buffered records and hands back the sink.
    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

fn write_global_header(w: &mut impl Write, hdr: &PcapHeader, precision: Precision) -> io::Result<()> {
    w.write_all(&precision.magic().to_le_bytes())?;
    w.write_all(&hdr.version_major.to_le_bytes())?;
    w.write_all(&hdr.version_minor.to_le_bytes())?;
    w.write_all(&hdr.thiszone.to_le_bytes())?;
    w.write_all(&hdr.sigfigs.to_le_bytes())?;
    w.write_all(&SNAPLEN.to_le_bytes())?;
    w.write_all(&(hdr.network.0 as u32).to_le_bytes())?;
    Ok(())
}

fn write_packet(w: &mut impl Write, ts_sec: u32, ts_frac: u32, orig_len: u32, data: &[u8]) -> io::Result<()> {
    let caplen = data.len() as u32;
    w.write_all(&ts_sec.to_le_bytes())?;
    w.write_all(&ts_frac.to_le_bytes())?;
    w.write_all(&caplen.to_le_bytes())?;
    w.write_all(&orig_len.max(caplen).to_le_bytes())?;
    w.write_all(data)?;
    Ok(())
}
