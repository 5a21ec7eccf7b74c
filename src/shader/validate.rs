//! Offline WGSL validation with naga.

use super::ProgramSource;
use crate::error::Result;

/// Parses and validates an assembled program.
///
/// Failures come back as compilation errors carrying the program's pass, effects and
/// source.
pub fn validate_program(source: &ProgramSource) -> Result<naga::Module> {
    let module = naga::front::wgsl::parse_str(&source.wgsl)
        .map_err(|e| source.compilation_error(e.emit_to_string(&source.wgsl)))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| source.compilation_error(format!("validation failed: {e:?}")))?;

    Ok(module)
}
