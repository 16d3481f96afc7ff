//! Compact command implementation - stream a TSV observation dump through the compactor

use anyhow::{Context, Result};
use kmerpath_core::{
    verify_graph, CompactedNode, CompactorConfig, KmerEncoding, NodeId, Observation,
    PathNodeCompactor, Position,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use crate::config::{Config, OutputConfig};
use crate::error::{CliError, CliResult};

/// Reads `bases start end ref weight` lines. The first malformed line ends
/// the stream and is kept for the caller to report.
pub struct ObservationReader<R: BufRead> {
    lines: io::Lines<R>,
    source: String,
    encoding: KmerEncoding,
    line_number: usize,
    error: Option<CliError>,
}

impl<R: BufRead> ObservationReader<R> {
    pub fn new(reader: R, source: impl Into<String>, encoding: KmerEncoding) -> Self {
        Self {
            lines: reader.lines(),
            source: source.into(),
            encoding,
            line_number: 0,
            error: None,
        }
    }

    /// Error that terminated the stream, if any
    pub fn take_error(&mut self) -> Option<CliError> {
        self.error.take()
    }

    fn parse_line(&self, line: &str) -> CliResult<Observation> {
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        if fields.len() != 5 {
            return Err(self.parse_error(format!("expected 5 fields, found {}", fields.len())));
        }

        let bases = fields[0].as_bytes();
        if bases.len() != self.encoding.k() {
            return Err(self.parse_error(format!(
                "k-mer '{}' has length {}, expected {}",
                fields[0],
                bases.len(),
                self.encoding.k()
            )));
        }
        let kmer = self
            .encoding
            .encode(bases)
            .ok_or_else(|| self.parse_error(format!("k-mer '{}' contains a non-ACGT base", fields[0])))?;

        let start: Position = self.parse_field(fields[1], "start")?;
        let end: Position = self.parse_field(fields[2], "end")?;
        let reference = match fields[3] {
            "1" | "true" => true,
            "0" | "false" => false,
            other => return Err(self.parse_error(format!("invalid reference flag '{}'", other))),
        };
        let weight: u32 = self.parse_field(fields[4], "weight")?;

        Ok(Observation::new(kmer, start, end, reference, weight))
    }

    fn parse_field<T: std::str::FromStr>(&self, value: &str, name: &str) -> CliResult<T> {
        value
            .parse()
            .map_err(|_| self.parse_error(format!("invalid {} '{}'", name, value)))
    }

    fn parse_error(&self, message: String) -> CliError {
        CliError::parse(self.source.clone(), self.line_number, message)
    }
}

impl<R: BufRead> Iterator for ObservationReader<R> {
    type Item = Observation;

    fn next(&mut self) -> Option<Observation> {
        if self.error.is_some() {
            return None;
        }
        loop {
            self.line_number += 1;
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    self.error = Some(err.into());
                    return None;
                }
            };
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match self.parse_line(line) {
                Ok(observation) => return Some(observation),
                Err(err) => {
                    self.error = Some(err);
                    return None;
                }
            }
        }
    }
}

/// One output line per compacted node
#[derive(Debug, Serialize)]
pub struct NodeRecord {
    pub id: u64,
    pub first_start: Position,
    pub first_end: Position,
    pub last_start: Position,
    pub last_end: Position,
    pub length: usize,
    pub reference: bool,
    pub weight: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bases: Option<String>,
    pub predecessors: Vec<u64>,
    pub successors: Vec<u64>,
}

impl NodeRecord {
    pub fn from_node(node: &CompactedNode, encoding: &KmerEncoding, with_bases: bool) -> Self {
        let ids = |set: &BTreeSet<NodeId>| -> Vec<u64> { set.iter().map(|id| id.0).collect() };
        Self {
            id: node.id().0,
            first_start: node.first_start(),
            first_end: node.first_end(),
            last_start: node.last_start(),
            last_end: node.last_end(),
            length: node.len(),
            reference: node.is_reference(),
            weight: node.total_weight(),
            bases: with_bases.then(|| String::from_utf8_lossy(&node.bases(encoding)).into_owned()),
            predecessors: ids(node.predecessors()),
            successors: ids(node.successors()),
        }
    }
}

/// Compaction overrides given on the command line
#[derive(Debug, Default, Clone, Copy)]
pub struct Overrides {
    pub key_length: Option<u32>,
    pub max_width: Option<u32>,
    pub max_run_length: Option<u32>,
    pub check: bool,
}

impl Overrides {
    fn apply(&self, config: &Config) -> (CompactorConfig, OutputConfig) {
        let mut compactor = config.compactor;
        if let Some(k) = self.key_length {
            compactor.key_length = k;
        }
        if let Some(w) = self.max_width {
            compactor.max_observation_width = w;
        }
        if let Some(l) = self.max_run_length {
            compactor.max_run_length = l;
        }
        let mut output = config.output.clone();
        output.check |= self.check;
        (compactor, output)
    }
}

pub fn execute(config: &Config, input: PathBuf, output: Option<PathBuf>, overrides: Overrides) -> Result<()> {
    log::info!("Starting compaction");
    log::info!("Input file: {}", input.display());

    if !input.exists() {
        return Err(CliError::file_not_found(input).into());
    }
    let reader = BufReader::new(
        File::open(&input).with_context(|| format!("Failed to open input file: {}", input.display()))?,
    );

    let writer: Box<dyn Write> = match &output {
        Some(path) => {
            log::info!("Output file: {}", path.display());
            Box::new(
                File::create(path)
                    .with_context(|| format!("Failed to create output file: {}", path.display()))?,
            )
        }
        None => Box::new(io::stdout().lock()),
    };

    let (compactor_config, output_config) = overrides.apply(config);
    let source = input.display().to_string();
    run(reader, &source, BufWriter::new(writer), compactor_config, &output_config)?;

    log::info!("Compaction completed successfully");
    Ok(())
}

/// Compact observations from `reader`, writing JSON lines to `writer`
pub fn run<R: BufRead, W: Write>(
    reader: R,
    source: &str,
    mut writer: W,
    compactor_config: CompactorConfig,
    output: &OutputConfig,
) -> CliResult<()> {
    log::debug!("Compactor configuration: {:?}", compactor_config);
    compactor_config.validate()?;
    let encoding = KmerEncoding::new(compactor_config.key_length as usize)?;
    let mut observations = ObservationReader::new(reader, source, encoding);

    let mut emitted = Vec::new();
    let stats = {
        let mut compactor = PathNodeCompactor::new(observations.by_ref(), compactor_config)?;
        for node in compactor.by_ref() {
            let node = node?;
            let record = NodeRecord::from_node(&node, &encoding, output.bases);
            if output.pretty {
                serde_json::to_writer_pretty(&mut writer, &record)?;
            } else {
                serde_json::to_writer(&mut writer, &record)?;
            }
            writeln!(writer)?;
            if output.check {
                emitted.push(node);
            }
        }
        compactor.stats()
    };
    writer.flush()?;

    if let Some(err) = observations.take_error() {
        return Err(err);
    }

    log::info!(
        "Compacted {} observations into {} nodes ({} merges, {} withdrawn proposals, peak window {})",
        stats.observations,
        stats.nodes_emitted,
        stats.merges,
        stats.revoked_merges,
        stats.peak_window
    );

    if output.check {
        let violations = verify_graph(&emitted, &encoding, compactor_config.max_run_length as usize);
        for violation in &violations {
            log::error!("{}", violation);
        }
        if !violations.is_empty() {
            return Err(CliError::validation(format!(
                "compacted graph has {} violations",
                violations.len()
            )));
        }
        log::info!("Graph check passed for {} nodes", emitted.len());
    }

    Ok(())
}
