//! One pass over a capture: rebase, classify, rewrite, write.

use std::io::{self, Read, Write};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, FrameError, Result};
use crate::frame::{FrameLayout, Tagging};
use crate::pcap_io::{CaptureReader, CaptureRecord, CaptureWriter};
use crate::rewrite::{AddressRewriter, Rewrites};
use crate::timestamp::Rebaser;

const DOT_EVERY: u64 = 1000;
const DOTS_PER_LINE: u64 = 80;

/// Monotonic counters for one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub total: u64,
    pub arp: u64,
    pub vlan: u64,
    pub qinq: u64,
    pub malformed: u64,
    pub ethernet_macs_rewritten: u64,
    pub arp_macs_rewritten: u64,
    pub arp_ipv4_rewritten: u64,
    pub ipv4_rewritten: u64,
}

impl Counters {
    fn add(&mut self, rewrites: Rewrites) {
        self.ethernet_macs_rewritten += rewrites.ethernet_macs;
        self.arp_macs_rewritten += rewrites.arp_macs;
        self.arp_ipv4_rewritten += rewrites.arp_ipv4;
        self.ipv4_rewritten += rewrites.ipv4;
    }
}

/// Per-record processing state, built once from a [`Config`].
pub struct Pipeline<'a> {
    config: &'a Config,
    rebaser: Rebaser,
    rewriter: AddressRewriter,
    counters: Counters,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            rebaser: Rebaser::new(config.date, config.time_shifts.clone()),
            rewriter: config.rewriter(),
            counters: Counters::default(),
        }
    }

    /// Whether any option will change a record.
    pub fn is_enabled(&self) -> bool {
        self.rebaser.is_enabled() || self.rewriter.is_enabled()
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Rewrites one record in place.
    pub fn process(&mut self, record: &mut CaptureRecord) -> Result<()> {
        self.counters.total += 1;
        let index = self.counters.total;

        record.timestamp = self
            .rebaser
            .rebase(record.timestamp)
            .ok_or(Error::RebaseOverflow { record: index })?;

        let layout = match FrameLayout::classify(&record.data) {
            Ok(layout) => layout,
            Err(e) => return self.malformed(index, e),
        };
        match layout.tagging {
            Tagging::Vlan => self.counters.vlan += 1,
            Tagging::QinQ => self.counters.qinq += 1,
            Tagging::Untagged => {}
        }
        if layout.is_arp() {
            self.counters.arp += 1;
        }

        match self.rewriter.rewrite(&mut record.data, &layout) {
            Ok(rewrites) => {
                if rewrites.total() > 0 {
                    debug!("record {index}: {} fields rewritten", rewrites.total());
                }
                self.counters.add(rewrites);
                Ok(())
            }
            Err(e) => self.malformed(index, e),
        }
    }

    fn malformed(&mut self, index: u64, source: FrameError) -> Result<()> {
        if !self.config.skip_malformed {
            return Err(Error::MalformedFrame { record: index, source });
        }
        warn!("record {index}: {source}, writing it unchanged");
        self.counters.malformed += 1;
        Ok(())
    }
}

/// Prints a dot every [`DOT_EVERY`] records.
struct Progress<W: Write> {
    out: Option<W>,
    dots: u64,
}

impl<W: Write> Progress<W> {
    fn new(out: Option<W>) -> Self {
        Self { out, dots: 0 }
    }

    fn tick(&mut self, total: u64) {
        let Some(out) = self.out.as_mut() else { return };
        if total % DOT_EVERY != 0 {
            return;
        }
        self.dots += 1;
        let dot = if self.dots % DOTS_PER_LINE == 0 { ".\n" } else { "." };
        if out.write_all(dot.as_bytes()).is_err() {
            self.out = None;
        }
    }

    fn finish(&mut self) {
        if let Some(mut out) = self.out.take() {
            if self.dots % DOTS_PER_LINE != 0 && writeln!(out).is_err() {
                debug!("progress output closed");
            }
        }
    }
}

/// Rewrites every record of `reader` into `writer` and returns the sink.
pub fn rewrite_stream<R: Read, W: Write>(
    config: &Config,
    reader: &mut CaptureReader<R>,
    mut writer: CaptureWriter<W>,
) -> Result<(Counters, W)> {
    let mut pipeline = Pipeline::new(config);
    if !pipeline.is_enabled() {
        warn!("No rewrite options given, records are copied unchanged");
    }
    let mut progress = Progress::new(config.progress.then(io::stderr));
    if config.progress {
        info!("Each '.' represents {DOT_EVERY} records converted");
    }

    while let Some(mut record) = reader.next_record()? {
        pipeline.process(&mut record)?;
        writer.write_record(&record)?;
        progress.tick(pipeline.counters().total);
    }
    progress.finish();

    let sink = writer.finish()?;
    Ok((*pipeline.counters(), sink))
}

/// Rewrites `config.source` into `config.destination`.
pub fn run(config: &Config) -> Result<Counters> {
    info!("Opening {:?}", config.source);
    let mut reader = CaptureReader::open(&config.source)?;
    let writer = CaptureWriter::create(&config.destination, reader.header())?;
    info!("Writing {:?} ({:?} timestamps)", config.destination, reader.precision());

    let (counters, file) = rewrite_stream(config, &mut reader, writer)?;
    drop(file);
    Ok(counters)
}
