// src/persistence.rs
// 会话文件: <data_dir>/<key>.csv，表头 Time (s),Flow,Volume
// key = <patient_id>_<first_name>_<last_name>_data；旧版本只有 <patient_id>_data，按病人编号查找时仍可找到

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

use log::{debug, info};
use tempfile::NamedTempFile;

use crate::drivers::StoreError;
use crate::types::{PatientIdentity, Sample};

pub const HEADER: [&str; 3] = ["Time (s)", "Flow", "Volume"];
const KEY_SUFFIX: &str = "_data";
const FILE_EXTENSION: &str = "csv";

/// Deterministic file stem addressing one stored session.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DurableKey(String);

impl DurableKey {
    pub fn for_identity(identity: &PatientIdentity) -> Self {
        Self(format!(
            "{}_{}_{}{KEY_SUFFIX}",
            normalize(&identity.patient_id),
            normalize(&identity.first_name),
            normalize(&identity.last_name)
        ))
    }

    /// Key used before names were part of the file name.
    pub fn legacy(patient_id: &str) -> Self {
        Self(format!("{}{KEY_SUFFIX}", normalize(patient_id)))
    }

    pub fn from_stem(stem: impl Into<String>) -> Self {
        Self(stem.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> String {
        format!("{}.{FILE_EXTENSION}", self.0)
    }
}

impl fmt::Display for DurableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trims and replaces anything that is not safe in a file name with `_`.
fn normalize(component: &str) -> String {
    component
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Encodes and decodes sessions under one data directory. Holds no session state.
#[derive(Clone, Debug)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &DurableKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    pub fn exists(&self, key: &DurableKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Writes the session and returns its key. An existing file for the same
    /// identity is replaced atomically.
    pub fn encode(
        &self,
        identity: &PatientIdentity,
        samples: &[Sample],
    ) -> Result<DurableKey, StoreError> {
        let key = DurableKey::for_identity(identity);
        fs::create_dir_all(&self.root)?;
        let tmp = NamedTempFile::new_in(&self.root)?;
        {
            let mut writer = csv::Writer::from_writer(BufWriter::new(tmp.as_file()));
            writer.write_record(HEADER)?;
            for s in samples {
                writer.write_record([
                    s.elapsed_seconds.to_string(),
                    s.flow.to_string(),
                    s.volume.to_string(),
                ])?;
            }
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(&key))?;
        info!("saved {} samples as {}", samples.len(), key);
        Ok(key)
    }

    /// Loads the session stored for `patient_id` (see [`SessionStore::resolve`]).
    pub fn decode(&self, patient_id: &str) -> Result<Vec<Sample>, StoreError> {
        let key = self.resolve(patient_id)?;
        self.decode_key(&key)
    }

    /// Finds the key for a patient id: any name-qualified key starting with
    /// `<patient_id>_` (lexicographically first), else the legacy key.
    pub fn resolve(&self, patient_id: &str) -> Result<DurableKey, StoreError> {
        let prefix = format!("{}_", normalize(patient_id));
        let legacy = DurableKey::legacy(patient_id);
        let qualified = self
            .list()?
            .into_iter()
            .find(|k| k.as_str().starts_with(&prefix) && *k != legacy);
        if let Some(key) = qualified {
            return Ok(key);
        }
        if self.exists(&legacy) {
            debug!("falling back to legacy key {legacy}");
            return Ok(legacy);
        }
        Err(StoreError::NotFound {
            patient_id: patient_id.to_string(),
        })
    }

    /// Exact key for the full identity first, then the patient-id lookup.
    pub fn resolve_identity(&self, identity: &PatientIdentity) -> Result<DurableKey, StoreError> {
        let exact = DurableKey::for_identity(identity);
        if self.exists(&exact) {
            return Ok(exact);
        }
        self.resolve(&identity.patient_id)
    }

    pub fn decode_key(&self, key: &DurableKey) -> Result<Vec<Sample>, StoreError> {
        let file = match File::open(self.path_for(key)) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    patient_id: key.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        decode_rows(key, BufReader::new(file))
    }

    /// All stored keys, sorted.
    pub fn list(&self) -> Result<Vec<DurableKey>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if stem.ends_with(KEY_SUFFIX) && path.is_file() {
                    keys.push(DurableKey::from_stem(stem));
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Parses a stored table. Any bad row fails the whole decode.
pub fn decode_rows<R: Read>(key: &DurableKey, reader: R) -> Result<Vec<Sample>, StoreError> {
    let malformed = |row: usize, reason: String| StoreError::MalformedRecord {
        key: key.to_string(),
        row,
        reason,
    };
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = csv_reader.records();
    match records.next() {
        Some(Ok(header)) if header.iter().eq(HEADER) => {}
        Some(Ok(header)) => {
            let found: Vec<&str> = header.iter().collect();
            return Err(malformed(1, format!("expected header {HEADER:?}, got {found:?}")));
        }
        Some(Err(e)) => return Err(malformed(1, e.to_string())),
        None => return Err(malformed(1, "missing header row".to_string())),
    }

    let mut samples = Vec::new();
    for (idx, record) in records.enumerate() {
        let row = idx + 2;
        let record = record.map_err(|e| malformed(row, e.to_string()))?;
        if record.len() != 3 {
            return Err(malformed(row, format!("expected 3 fields, got {}", record.len())));
        }
        let mut values = [0.0f64; 3];
        for (slot, field) in values.iter_mut().zip(record.iter()) {
            *slot = field
                .parse()
                .map_err(|_| malformed(row, format!("{field:?} is not a number")))?;
        }
        samples.push(Sample::new(values[0], values[1], values[2]));
    }
    Ok(samples)
}
