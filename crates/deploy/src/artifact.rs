//! Artifact specs and the compiled artifacts they are deployed from.
//!
//! Compilation happens elsewhere: this module only reads the hardhat output
//! directory (`artifacts/`), which holds one `<Name>.json` per contract next to
//! a `<Name>.dbg.json` pointing at the build-info used for verification.

use std::path::{Path, PathBuf};

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes, U256},
};
use anyhow::{Context, Result};
use serde::Deserialize;

/// Number of decimals used by every token deployed by the pipeline.
pub const TOKEN_DECIMALS: u8 = 18;

/// Scale a whole-token amount to its 18-decimal base unit.
pub fn to_wei(amount: u64) -> U256 {
    U256::from(amount) * U256::from(10u64).pow(U256::from(TOKEN_DECIMALS))
}

/// A typed constructor argument.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::From)]
pub enum ConstructorArg {
    Uint(U256),
    Address(Address),
    Bool(bool),
    String(String),
}

impl ConstructorArg {
    fn to_sol_value(&self) -> DynSolValue {
        match self {
            ConstructorArg::Uint(value) => DynSolValue::Uint(*value, 256),
            ConstructorArg::Address(address) => DynSolValue::Address(*address),
            ConstructorArg::Bool(value) => DynSolValue::Bool(*value),
            ConstructorArg::String(value) => DynSolValue::String(value.clone()),
        }
    }
}

/// ABI-encode constructor arguments as they are appended to creation code.
pub fn encode_constructor_args(args: &[ConstructorArg]) -> Bytes {
    if args.is_empty() {
        return Bytes::new();
    }

    let params = DynSolValue::Tuple(args.iter().map(ConstructorArg::to_sol_value).collect());
    params.abi_encode_params().into()
}

/// A deployable artifact: a unique name and its ordered constructor arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    name: String,
    args: Vec<ConstructorArg>,
}

impl ArtifactSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append a constructor argument.
    pub fn arg(mut self, arg: impl Into<ConstructorArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[ConstructorArg] {
        &self.args
    }

    pub fn encoded_args(&self) -> Bytes {
        encode_constructor_args(&self.args)
    }
}

/// Compiled output of one contract, as emitted by hardhat.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledArtifact {
    pub contract_name: String,
    pub source_name: String,
    pub bytecode: Bytes,
    /// Location of the artifact file this was read from.
    #[serde(skip)]
    pub path: PathBuf,
}

impl CompiledArtifact {
    /// Creation code: bytecode followed by the encoded constructor arguments.
    pub fn creation_code(&self, spec: &ArtifactSpec) -> Bytes {
        let args = spec.encoded_args();
        let mut code = Vec::with_capacity(self.bytecode.len() + args.len());
        code.extend_from_slice(&self.bytecode);
        code.extend_from_slice(&args);
        code.into()
    }

    /// Fully-qualified name used by verification services (`source:Contract`).
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }
}

/// Compiler input needed to verify a deployed contract.
#[derive(Debug, Clone)]
pub struct VerificationSource {
    pub qualified_name: String,
    /// Full compiler version, e.g. `v0.8.20+commit.a1b79de6`.
    pub compiler_version: String,
    /// Standard-JSON compiler input, serialized.
    pub standard_json_input: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildInfo {
    solc_long_version: String,
    input: serde_json::Value,
}

/// Read-only view over a hardhat `artifacts/` directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the compiled artifact for a contract name.
    pub fn load(&self, name: &str) -> Result<CompiledArtifact> {
        let path = self.find(name)?;
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let mut artifact: CompiledArtifact = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

        if artifact.bytecode.is_empty() {
            anyhow::bail!(
                "Artifact {} has no bytecode (abstract contract or interface?)",
                path.display()
            );
        }

        artifact.path = path;
        Ok(artifact)
    }

    /// Load the compiler input recorded for a compiled artifact.
    pub fn verification_source(&self, artifact: &CompiledArtifact) -> Result<VerificationSource> {
        let dbg_path = artifact.path.with_extension("dbg.json");
        let content = std::fs::read_to_string(&dbg_path)
            .with_context(|| format!("Failed to read debug file {}", dbg_path.display()))?;
        let dbg: DebugFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse debug file {}", dbg_path.display()))?;

        let parent = dbg_path
            .parent()
            .context("Debug file path must have a parent directory")?;
        let build_info_path = parent.join(&dbg.build_info);
        let content = std::fs::read_to_string(&build_info_path).with_context(|| {
            format!("Failed to read build info {}", build_info_path.display())
        })?;
        let build_info: BuildInfo = serde_json::from_str(&content).with_context(|| {
            format!("Failed to parse build info {}", build_info_path.display())
        })?;

        Ok(VerificationSource {
            qualified_name: artifact.qualified_name(),
            compiler_version: format!("v{}", build_info.solc_long_version),
            standard_json_input: build_info.input.to_string(),
        })
    }

    fn find(&self, name: &str) -> Result<PathBuf> {
        let conventional = self
            .root
            .join("contracts")
            .join(format!("{name}.sol"))
            .join(format!("{name}.json"));
        if conventional.is_file() {
            return Ok(conventional);
        }

        let file_name = format!("{name}.json");
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let entries = std::fs::read_dir(&dir)
                .with_context(|| format!("Failed to list artifacts in {}", dir.display()))?;
            for entry in entries {
                let path = entry?.path();
                if path.is_dir() {
                    if path.file_name().is_some_and(|n| n != "build-info") {
                        pending.push(path);
                    }
                } else if path.file_name().is_some_and(|n| n == file_name.as_str()) {
                    return Ok(path);
                }
            }
        }

        anyhow::bail!(
            "No compiled artifact named {} under {}",
            name,
            self.root.display()
        )
    }
}
