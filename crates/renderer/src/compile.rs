//! GLSL loading for the render stages.
//!
//! Sources live on disk so they can be edited while the renderer runs and
//! reloaded with a hotkey. `#include "file"` lines are spliced in before the
//! source reaches naga, which has no include support of its own. Every
//! compile validates with naga first so that errors surface as messages
//! instead of device panics.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use wgpu::naga;
use wgpu::naga::ShaderStage;

const MAX_INCLUDE_DEPTH: usize = 16;

#[derive(Debug, thiserror::Error)]
pub(crate) enum CompileError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot resolve #include \"{name}\" in {path}")]
    MissingInclude { name: String, path: PathBuf },
    #[error("includes nested deeper than {MAX_INCLUDE_DEPTH} levels at {path}")]
    IncludeDepth { path: PathBuf },
    #[error("{path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("{path} failed validation: {message}")]
    Validate { path: PathBuf, message: String },
}

/// A shader file plus the preprocessor definitions it is compiled with.
pub(crate) struct ShaderRequest<'a> {
    pub file: &'a str,
    pub stage: ShaderStage,
    pub defines: &'a [(String, String)],
}

#[derive(Debug, Clone)]
pub(crate) struct ShaderCompiler {
    shader_dir: PathBuf,
}

impl ShaderCompiler {
    pub(crate) fn new(shader_dir: impl Into<PathBuf>) -> Self {
        Self {
            shader_dir: shader_dir.into(),
        }
    }

    /// Compiles `request`, retrying once after a failure so that a source
    /// fixed on disk in the meantime is picked up.
    pub(crate) fn compile(&self, device: &wgpu::Device, request: &ShaderRequest<'_>) -> Result<wgpu::ShaderModule> {
        let module = with_second_chance(request.file, || self.try_compile(device, request))?;
        Ok(module)
    }

    fn try_compile(
        &self,
        device: &wgpu::Device,
        request: &ShaderRequest<'_>,
    ) -> Result<wgpu::ShaderModule, CompileError> {
        let path = self.shader_dir.join(request.file);
        let source = self.preprocess(&path)?;
        validate(&path, &source, request.stage, request.defines)?;

        let defines: Vec<(&str, &str)> = request
            .defines
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(request.file),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(source),
                stage: request.stage,
                defines: &defines,
            },
        }))
    }

    /// Reads `path` and splices its includes recursively. Each file is
    /// included at most once.
    pub(crate) fn preprocess(&self, path: &Path) -> Result<String, CompileError> {
        let mut seen = HashSet::new();
        let mut out = String::new();
        self.splice(path, 0, &mut seen, &mut out)?;
        Ok(out)
    }

    fn splice(
        &self,
        path: &Path,
        depth: usize,
        seen: &mut HashSet<PathBuf>,
        out: &mut String,
    ) -> Result<(), CompileError> {
        if depth > MAX_INCLUDE_DEPTH {
            return Err(CompileError::IncludeDepth {
                path: path.to_path_buf(),
            });
        }
        if !seen.insert(path.to_path_buf()) {
            return Ok(());
        }
        let source = fs::read_to_string(path).map_err(|source| CompileError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        for line in source.lines() {
            match include_target(line) {
                Some(name) => {
                    let resolved = self.resolve_include(path, name).ok_or_else(|| {
                        CompileError::MissingInclude {
                            name: name.to_string(),
                            path: path.to_path_buf(),
                        }
                    })?;
                    self.splice(&resolved, depth + 1, seen, out)?;
                }
                None => {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        Ok(())
    }

    /// Looks next to the including file first, then in the shader directory.
    fn resolve_include(&self, from: &Path, name: &str) -> Option<PathBuf> {
        let sibling = from.parent().map(|dir| dir.join(name));
        sibling
            .into_iter()
            .chain(std::iter::once(self.shader_dir.join(name)))
            .find(|candidate| candidate.is_file())
    }
}

fn include_target(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix("#include")?;
    let rest = rest.trim();
    rest.strip_prefix('"')?.strip_suffix('"')
}

fn validate(path: &Path, source: &str, stage: ShaderStage, defines: &[(String, String)]) -> Result<(), CompileError> {
    let mut options = naga::front::glsl::Options::from(stage);
    for (name, value) in defines {
        options.defines.insert(name.clone(), value.clone());
    }
    let module = naga::front::glsl::Frontend::default()
        .parse(&options, source)
        .map_err(|err| CompileError::Parse {
            path: path.to_path_buf(),
            message: err.emit_to_string(source),
        })?;
    naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all())
        .validate(&module)
        .map_err(|err| CompileError::Validate {
            path: path.to_path_buf(),
            message: err.emit_to_string(source),
        })?;
    Ok(())
}

pub(crate) fn with_second_chance<T>(
    label: &str,
    mut attempt: impl FnMut() -> Result<T, CompileError>,
) -> Result<T, CompileError> {
    match attempt() {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::error!(shader = label, error = %err, "shader compilation failed; retrying once");
            attempt()
        }
    }
}
