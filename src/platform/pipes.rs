// wv2sleuth - platform/pipes.rs
//
// Named-pipe namespace enumeration.
//
// The pipe filesystem is exposed at `\\.\pipe\` and can be listed with a
// plain directory read; no native API declarations are needed.  Pipe names
// are returned bare (no namespace prefix), which is the form the
// discovery engine's pattern expects.

use crate::core::probes::PipeEnumerator;
use crate::util::error::ProbeError;

/// Enumerator over the OS pipe namespace.
#[derive(Debug, Default)]
pub struct NamedPipeEnumerator;

impl NamedPipeEnumerator {
    pub fn new() -> NamedPipeEnumerator {
        NamedPipeEnumerator
    }
}

#[cfg(target_os = "windows")]
impl PipeEnumerator for NamedPipeEnumerator {
    fn pipe_names(&self) -> Result<Vec<String>, ProbeError> {
        const PIPE_ROOT: &str = r"\\.\pipe\";

        let entries = std::fs::read_dir(PIPE_ROOT).map_err(|source| ProbeError::Io {
            operation: "enumerating the pipe namespace",
            source,
        })?;

        // Individual entries can vanish between the directory read and the
        // name fetch; those are skipped, not errors.
        let names = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        Ok(names)
    }
}

#[cfg(not(target_os = "windows"))]
impl PipeEnumerator for NamedPipeEnumerator {
    fn pipe_names(&self) -> Result<Vec<String>, ProbeError> {
        Err(ProbeError::NotSupported)
    }
}
