//! Per-compiler build cache
//!
//! Holds a single slot keyed on the exact device source. A rebuild of the
//! same text returns the stored program without calling the device
//! compiler; any other text replaces the slot, successful or not.

use super::device::DeviceCompiler;
use sha2::{Digest, Sha256};

/// What a build produced, and whether it came from the cache
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutcome<P> {
    pub program: Option<P>,
    pub success: bool,
    pub log: String,
    pub cached: bool,
}

#[derive(Debug, Clone)]
struct CacheSlot<P> {
    source: String,
    program: Option<P>,
    success: bool,
    log: String,
}

/// Build cache and last binaries of one compiler instance
#[derive(Debug, Clone)]
pub struct CompileEnvironment<P> {
    slot: Option<CacheSlot<P>>,
    last_raw_binary: Option<Vec<u8>>,
    last_patched_binary: Option<Vec<u8>>,
}

impl<P: Clone> CompileEnvironment<P> {
    /// Creates an empty environment
    pub fn new() -> Self {
        CompileEnvironment {
            slot: None,
            last_raw_binary: None,
            last_patched_binary: None,
        }
    }

    /// Builds `source`, reusing the previous result if the text is unchanged
    pub fn build<D>(&mut self, device: &mut D, source: &str) -> BuildOutcome<P>
    where
        D: DeviceCompiler<Program = P>,
    {
        if let Some(slot) = self.slot.as_ref().filter(|s| s.source == source) {
            tracing::debug!(fingerprint = %source_fingerprint(source), "build cache hit");
            return BuildOutcome {
                program: slot.program.clone(),
                success: slot.success,
                log: slot.log.clone(),
                cached: true,
            };
        }

        tracing::debug!(fingerprint = %source_fingerprint(source), "build cache miss");
        let build = device.compile_from_source(source);
        let success = build.success && build.program.is_some();
        self.slot = Some(CacheSlot {
            source: source.to_string(),
            program: build.program.clone(),
            success,
            log: build.log.clone(),
        });

        BuildOutcome {
            program: build.program,
            success,
            log: build.log,
            cached: false,
        }
    }

    /// Success flag of the most recent build, if any
    pub fn last_build_succeeded(&self) -> Option<bool> {
        self.slot.as_ref().map(|s| s.success)
    }

    pub fn last_raw_binary(&self) -> Option<&[u8]> {
        self.last_raw_binary.as_deref()
    }

    pub fn last_patched_binary(&self) -> Option<&[u8]> {
        self.last_patched_binary.as_deref()
    }

    /// Records the binaries of a finished compile
    pub fn record_binaries(&mut self, raw: Vec<u8>, patched: Vec<u8>) {
        self.last_raw_binary = Some(raw);
        self.last_patched_binary = Some(patched);
    }

    /// Forgets the cached build; the next build always calls the device
    pub fn invalidate(&mut self) {
        self.slot = None;
    }
}

impl<P: Clone> Default for CompileEnvironment<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Short SHA-256 fingerprint of device source, for logs
pub fn source_fingerprint(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::device::DeviceBuild;
    use crate::error::Result;

    #[derive(Default)]
    struct CountingDevice {
        calls: usize,
    }

    impl DeviceCompiler for CountingDevice {
        type Program = usize;

        fn compile_from_source(&mut self, source: &str) -> DeviceBuild<usize> {
            self.calls += 1;
            let success = !source.contains("error");
            DeviceBuild {
                program: success.then_some(self.calls),
                success,
                log: format!("build {}", self.calls),
            }
        }

        fn binary(&self, program: &usize) -> Result<Vec<u8>> {
            Ok(vec![*program as u8])
        }

        fn compile_from_binary(&mut self, binaries: &[Vec<u8>]) -> Result<usize> {
            Ok(binaries.len())
        }

        fn build(&mut self, _program: &usize) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_same_source_hits_cache() {
        let mut device = CountingDevice::default();
        let mut env = CompileEnvironment::new();

        let first = env.build(&mut device, "kernel a");
        let second = env.build(&mut device, "kernel a");

        assert_eq!(device.calls, 1);
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.success, first.success);
        assert_eq!(second.program, Some(1));
        assert_eq!(second.log, "build 1");
    }

    #[test]
    fn test_single_slot_replaced() {
        let mut device = CountingDevice::default();
        let mut env = CompileEnvironment::new();

        env.build(&mut device, "a");
        env.build(&mut device, "b");
        let again = env.build(&mut device, "a");

        assert_eq!(device.calls, 3);
        assert!(!again.cached);
        assert!(env.build(&mut device, "a").cached);
    }

    #[test]
    fn test_failed_build_is_cached_too() {
        let mut device = CountingDevice::default();
        let mut env = CompileEnvironment::new();

        let first = env.build(&mut device, "error here");
        let second = env.build(&mut device, "error here");

        assert!(!first.success);
        assert!(second.cached && !second.success);
        assert_eq!(env.last_build_succeeded(), Some(false));
        assert_eq!(device.calls, 1);
    }

    #[test]
    fn test_invalidate() {
        let mut device = CountingDevice::default();
        let mut env = CompileEnvironment::new();
        env.build(&mut device, "a");
        env.invalidate();
        assert!(!env.build(&mut device, "a").cached);
        assert_eq!(device.calls, 2);
    }

    #[test]
    fn test_fingerprint() {
        let fp = source_fingerprint("abc");
        assert_eq!(fp.len(), 16);
        assert_eq!(fp, "ba7816bf8f01cfea");
        assert_ne!(fp, source_fingerprint("abd"));
    }
}
