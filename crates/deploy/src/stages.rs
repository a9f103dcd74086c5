//! Declared pipeline stages.
//!
//! A run executes stages in declaration order. Each stage is selected by tag:
//! `all` selects everything, `tokens` and `pool` select a single stage.
//!
//! How a stage flushes is part of its declaration: the tokens stage rewrites
//! the registry file, the pool stage appends to it. Running `pool` on its own
//! keeps the token bindings later scripts import.

use crate::{
    artifact::{ArtifactSpec, to_wei},
    registry::WriteMode,
};

/// Tag shared by every declared stage.
pub const TAG_ALL: &str = "all";

/// An ordered list of artifacts deployed and flushed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub tags: Vec<String>,
    pub artifacts: Vec<ArtifactSpec>,
    /// How the stage's bindings land in the registry file. Defaults to append.
    pub write_mode: WriteMode,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            artifacts: Vec::new(),
            write_mode: WriteMode::Append,
        }
    }

    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn artifact(mut self, spec: ArtifactSpec) -> Self {
        self.artifacts.push(spec);
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Token contracts, each minting its initial supply to the deployer.
pub fn tokens_stage() -> Stage {
    const SUPPLIES: [(&str, u64); 5] = [
        ("BNB", 100_000_000),
        ("Chainlink", 200_000_000),
        ("Polygon", 500_000_000),
        ("TRON", 1_500_000_000),
        ("WrappedBitcoin", 400_000_000),
    ];

    SUPPLIES.into_iter().fold(
        Stage::new("tokens")
            .tag(TAG_ALL)
            .tag("tokens")
            .write_mode(WriteMode::Overwrite),
        |stage, (name, supply)| stage.artifact(ArtifactSpec::new(name).arg(to_wei(supply))),
    )
}

/// The pool factory; pools themselves are created later against its address.
pub fn pool_stage() -> Stage {
    Stage::new("pool")
        .tag(TAG_ALL)
        .tag("pool")
        .artifact(ArtifactSpec::new("PoolFactory"))
}

/// All declared stages, in execution order.
pub fn declared_stages() -> Vec<Stage> {
    vec![tokens_stage(), pool_stage()]
}

/// Stages carrying at least one of `tags`, keeping declaration order.
pub fn select_stages<S: AsRef<str>>(stages: Vec<Stage>, tags: &[S]) -> Vec<Stage> {
    stages
        .into_iter()
        .filter(|stage| tags.iter().any(|tag| stage.has_tag(tag.as_ref())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ConstructorArg;

    fn names(stage: &Stage) -> Vec<&str> {
        stage.artifacts.iter().map(ArtifactSpec::name).collect()
    }

    #[test]
    fn test_tokens_stage_order_and_supplies() {
        let stage = tokens_stage();
        assert_eq!(
            names(&stage),
            ["BNB", "Chainlink", "Polygon", "TRON", "WrappedBitcoin"]
        );
        assert_eq!(
            stage.artifacts[0].args(),
            [ConstructorArg::Uint(to_wei(100_000_000))]
        );
        assert_eq!(
            stage.artifacts[3].args(),
            [ConstructorArg::Uint(to_wei(1_500_000_000))]
        );
    }

    #[test]
    fn test_pool_stage_has_no_args() {
        let stage = pool_stage();
        assert_eq!(names(&stage), ["PoolFactory"]);
        assert!(stage.artifacts[0].args().is_empty());
    }

    #[test]
    fn test_write_mode_follows_stage_not_position() {
        assert_eq!(tokens_stage().write_mode, WriteMode::Overwrite);
        assert_eq!(pool_stage().write_mode, WriteMode::Append);
        assert_eq!(Stage::new("custom").write_mode, WriteMode::Append);

        let pool_only = select_stages(declared_stages(), &["pool"]);
        assert_eq!(pool_only[0].write_mode, WriteMode::Append);
    }

    #[test]
    fn test_select_by_tag() {
        let all = select_stages(declared_stages(), &["all"]);
        assert_eq!(
            all.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            ["tokens", "pool"]
        );

        let pool = select_stages(declared_stages(), &["pool"]);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].name, "pool");

        // Request order does not change declaration order.
        let both = select_stages(declared_stages(), &["pool", "tokens"]);
        assert_eq!(both[0].name, "tokens");
        assert_eq!(both[1].name, "pool");

        assert!(select_stages(declared_stages(), &["nope"]).is_empty());
    }
}
