//! Directory conversion on a fixed-size worker pool
//!
//! Each worker reads one save end to end and writes its JSON projection.
//! Workers share only the read options, whose property registry is
//! read-only.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::archive::{ReadOptions, SaveFile, SaveFormat};
use crate::codec::{NameRegistry, SealedNameRegistry};
use crate::error::{Error, Result};
use crate::property::{PropertyKind, StructKind};

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Worker count; 0 lets the pool pick one per core.
    pub threads: usize,
    pub pretty: bool,
    pub memory_map: bool,
    pub read: ReadOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { threads: 0, pretty: false, memory_map: false, read: ReadOptions::default() }
    }
}

/// Outcome of a batch run. A failed file does not stop the others.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub converted: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, Error)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Names every archive repeats: the list terminator, property type tags
/// and native struct types. Sealed before the workers start.
pub fn common_names() -> SealedNameRegistry {
    let mut registry = NameRegistry::new();
    registry.intern("None", 0);
    for kind in PropertyKind::ALL {
        registry.intern(kind.tag(), 0);
    }
    for kind in StructKind::NATIVE {
        registry.intern(kind.type_name(), 0);
    }
    registry.seal()
}

/// Save files directly inside `dir` whose extension names a known format,
/// sorted by path.
pub fn collect_inputs(dir: &Path) -> Result<Vec<(PathBuf, SaveFormat)>> {
    let mut inputs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        match SaveFormat::from_path(&path) {
            Some(format) => inputs.push((path, format)),
            None => debug!(path = %path.display(), "skipping file of unknown format"),
        }
    }
    inputs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(inputs)
}

/// `<output_dir>/<input file name>.json`
pub fn output_path(input: &Path, output_dir: &Path) -> PathBuf {
    let mut name = input.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".json");
    output_dir.join(name)
}

/// Convert one save to JSON; returns the written path.
pub fn convert_file(input: &Path, format: SaveFormat, output_dir: &Path, options: &BatchOptions) -> Result<PathBuf> {
    let (save, stats) = SaveFile::read_path(input, Some(format), &options.read, options.memory_map)?;
    if stats.unreadable_properties > 0 {
        warn!(path = %input.display(), skipped = stats.unreadable_properties, "skipped unreadable properties");
    }
    let json = save.to_json();
    let bytes = if options.pretty { serde_json::to_vec_pretty(&json)? } else { serde_json::to_vec(&json)? };
    let output = output_path(input, output_dir);
    fs::write(&output, bytes)?;
    Ok(output)
}

/// Convert every save in `input_dir` into `output_dir`.
pub fn run(input_dir: &Path, output_dir: &Path, options: &BatchOptions) -> Result<BatchReport> {
    let inputs = collect_inputs(input_dir)?;
    fs::create_dir_all(output_dir)?;
    let options = &BatchOptions {
        read: options.read.clone().shared_names(Arc::new(common_names())),
        ..options.clone()
    };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.threads)
        .thread_name(|i| format!("ark-batch-{i}"))
        .build()
        .map_err(|err| Error::Io(format!("cannot start worker pool: {err}")))?;
    info!(files = inputs.len(), threads = pool.current_num_threads(), "starting batch conversion");

    let total = inputs.len();
    let done = AtomicUsize::new(0);
    let results: Vec<(PathBuf, Result<PathBuf>)> = pool.install(|| {
        inputs
            .par_iter()
            .map(|(input, format)| {
                let result = convert_file(input, *format, output_dir, options);
                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                match &result {
                    Ok(_) => info!(finished, total, path = %input.display(), "converted"),
                    Err(err) => warn!(finished, total, path = %input.display(), error = %err, "conversion failed"),
                }
                (input.clone(), result)
            })
            .collect()
    });

    let mut report = BatchReport::default();
    for (input, result) in results {
        match result {
            Ok(output) => report.converted.push(output),
            Err(err) => report.failed.push((input, err)),
        }
    }
    info!(converted = report.converted.len(), failed = report.failed.len(), "batch conversion finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{PropertyBag, SaveArchive};
    use crate::codec::Name;
    use crate::property::{Property, PropertyValue};

    fn scratch_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ark-batch-{label}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn bag_bytes(value: i32) -> Vec<u8> {
        let mut bag = PropertyBag::new(Name::new("PrimalLocalProfile", 0));
        bag.properties.push(Property::new("Value", PropertyValue::Int(value)));
        bag.to_bytes().unwrap()
    }

    #[test]
    fn test_common_names() {
        let names = common_names();
        assert!(names.contains("None"));
        assert!(names.contains("IntProperty"));
        assert!(names.contains("Vector"));
    }

    #[test]
    fn test_output_path() {
        let out = output_path(Path::new("saves/LocalPlayer.sav"), Path::new("json"));
        assert_eq!(out, Path::new("json/LocalPlayer.sav.json"));
    }

    #[test]
    fn test_inputs_sorted_by_path() {
        let dir = scratch_dir("sorted");
        fs::write(dir.join("c.arktribe"), b"").unwrap();
        fs::write(dir.join("a.sav"), b"").unwrap();
        fs::write(dir.join("b.ark"), b"").unwrap();
        fs::write(dir.join("readme.md"), b"").unwrap();

        let inputs = collect_inputs(&dir).unwrap();
        let names: Vec<(String, SaveFormat)> =
            inputs.iter().map(|(p, f)| (p.file_name().unwrap().to_string_lossy().into_owned(), *f)).collect();
        assert_eq!(
            names,
            vec![
                ("a.sav".to_string(), SaveFormat::Bag),
                ("b.ark".to_string(), SaveFormat::World),
                ("c.arktribe".to_string(), SaveFormat::Tribe),
            ]
        );
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_batch_converts_known_formats() {
        let input = scratch_dir("in");
        let output = input.join("out");
        fs::write(input.join("a.sav"), bag_bytes(1)).unwrap();
        fs::write(input.join("b.sav"), bag_bytes(2)).unwrap();
        fs::write(input.join("broken.sav"), [0xff, 0xff]).unwrap();
        fs::write(input.join("notes.txt"), b"ignored").unwrap();

        let options = BatchOptions { threads: 2, ..Default::default() };
        let report = run(&input, &output, &options).unwrap();
        assert_eq!(report.converted.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].0.ends_with("broken.sav"));

        let json: serde_json::Value = serde_json::from_slice(&fs::read(output.join("b.sav.json")).unwrap()).unwrap();
        assert_eq!(json["format"], "bag");
        fs::remove_dir_all(&input).unwrap();
    }
}
