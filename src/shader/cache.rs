//! Compiled program cache shared by the passes of a composer.

use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHasher};

use super::{AssembleOptions, ProgramSource};
use crate::device::{ProgramId, RenderDevice};
use crate::effect::Effect;
use crate::error::Result;

/// Structural identity of a program.
///
/// Derived from the ordered active effects (names, code, attributes, depth packing,
/// blend functions, defines, uniform layout, texture names) and the program options.
/// Uniform values and opacity do not contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramKey(pub u64);

impl ProgramKey {
    pub fn for_effects(effects: &[&Effect], options: &AssembleOptions) -> Self {
        let mut hasher = FxHasher::default();
        "effects".hash(&mut hasher);
        for effect in effects.iter().filter(|e| e.is_active()) {
            effect.hash_structure(&mut hasher);
        }
        options.hash(&mut hasher);
        Self(hasher.finish())
    }

    pub fn passthrough(options: &AssembleOptions) -> Self {
        let mut hasher = FxHasher::default();
        "passthrough".hash(&mut hasher);
        options.hash(&mut hasher);
        Self(hasher.finish())
    }
}

/// Identifies one compilation.
///
/// Every call to the device's compiler yields a fresh token, so a pass whose token
/// changed is running a program that was compiled anew. Together with the
/// [`ProgramKey`] it names one cached program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompilationToken(pub u64);

/// A compiled program and its structure.
#[derive(Debug)]
pub struct CachedProgram {
    pub id: ProgramId,
    pub source: ProgramSource,
    pub token: CompilationToken,
    refs: usize,
}

/// Reference-counted programs keyed on [`ProgramKey`].
///
/// The key is a hash, so a hit is confirmed by comparing the assembled program with
/// the cached one; structures that happen to share a key are compiled and kept apart.
///
/// Programs whose last reference is released stay cached until [`collect`]
/// runs at the end of the frame, so a pass that drops and re-acquires the same
/// structure within one frame does not recompile.
///
/// [`collect`]: ProgramCache::collect
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: FxHashMap<ProgramKey, Vec<CachedProgram>>,
    next_token: u64,
    compilations: u64,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a reference to the program `build` describes, compiling it if needed.
    ///
    /// The returned token, with `key`, is what [`get`](Self::get) and
    /// [`release`](Self::release) expect.
    pub fn acquire(
        &mut self,
        device: &mut dyn RenderDevice,
        key: ProgramKey,
        build: impl FnOnce() -> Result<ProgramSource>,
    ) -> Result<CompilationToken> {
        let source = build()?;
        let bucket = self.programs.entry(key).or_default();
        if let Some(program) = bucket.iter_mut().find(|p| p.source.same_program(&source)) {
            program.refs += 1;
            log::debug!("program cache hit for '{}'", program.source.label);
            return Ok(program.token);
        }
        if !bucket.is_empty() {
            log::warn!(
                "program '{}' shares its cache key with {} other program(s)",
                source.label,
                bucket.len()
            );
        }

        let id = match device.compile_program(&source) {
            Ok(id) => id,
            Err(err) => {
                if bucket.is_empty() {
                    self.programs.remove(&key);
                }
                return Err(err);
            }
        };
        self.next_token += 1;
        self.compilations += 1;
        let token = CompilationToken(self.next_token);
        log::debug!(
            "compiled program '{}' ({} stage(s)), token {}",
            source.label,
            source.stages.len(),
            token.0
        );

        bucket.push(CachedProgram {
            id,
            source,
            token,
            refs: 1,
        });
        Ok(token)
    }

    /// Drops a reference taken by [`acquire`](Self::acquire).
    pub fn release(&mut self, key: ProgramKey, token: CompilationToken) {
        if let Some(program) = self.find_mut(key, token) {
            program.refs = program.refs.saturating_sub(1);
        }
    }

    pub fn get(&self, key: ProgramKey, token: CompilationToken) -> Option<&CachedProgram> {
        self.programs.get(&key)?.iter().find(|p| p.token == token)
    }

    fn find_mut(&mut self, key: ProgramKey, token: CompilationToken) -> Option<&mut CachedProgram> {
        self.programs.get_mut(&key)?.iter_mut().find(|p| p.token == token)
    }

    /// Destroys programs nobody references anymore.
    pub fn collect(&mut self, device: &mut dyn RenderDevice) {
        self.programs.retain(|_, bucket| {
            bucket.retain(|program| {
                if program.refs == 0 {
                    log::debug!("destroying unused program '{}'", program.source.label);
                    device.destroy_program(program.id);
                    false
                } else {
                    true
                }
            });
            !bucket.is_empty()
        });
    }

    /// Destroys every program, referenced or not.
    pub fn clear(&mut self, device: &mut dyn RenderDevice) {
        for program in self.programs.drain().flat_map(|(_, bucket)| bucket) {
            device.destroy_program(program.id);
        }
    }

    /// Number of cached programs.
    pub fn len(&self) -> usize {
        self.programs.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Total number of compilations performed.
    pub fn compilations(&self) -> u64 {
        self.compilations
    }
}
