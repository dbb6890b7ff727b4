//! Workspace image flavors and the flavor set requested for a run.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::WsbuildError;

/// Component name shared by every flavor's image.
pub const COMPONENT_NAME: &str = "ml-workspace";

/// A named build variant of the workspace image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Flavor {
    Minimal,
    Light,
    Full,
    Gpu,
}

impl Flavor {
    /// Every flavor, in the order an `all` run processes them.
    pub const ALL: [Flavor; 4] = [Flavor::Minimal, Flavor::Light, Flavor::Full, Flavor::Gpu];

    /// Get the flavor name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Flavor::Minimal => "minimal",
            Flavor::Light => "light",
            Flavor::Full => "full",
            Flavor::Gpu => "gpu",
        }
    }

    /// Docker image name for this flavor.
    ///
    /// Only minimal and light carry a suffix; full and gpu share the bare
    /// component name.
    pub fn image_name(&self) -> String {
        match self {
            Flavor::Minimal | Flavor::Light => format!("{}-{}", COMPONENT_NAME, self.name()),
            Flavor::Full | Flavor::Gpu => COMPONENT_NAME.to_string(),
        }
    }

    /// Name of the build-tool step that prepares this flavor.
    pub fn build_step(&self) -> String {
        format!("{}-flavor", self.name())
    }

    /// Deterministic name of the container used to test this flavor.
    pub fn test_container_name(&self) -> String {
        format!("workspace-test-{}", self.name())
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Flavor {
    type Err = WsbuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(Flavor::Minimal),
            "light" => Ok(Flavor::Light),
            "full" => Ok(Flavor::Full),
            "gpu" => Ok(Flavor::Gpu),
            other => Err(WsbuildError::InvalidFlavor(other.to_string())),
        }
    }
}

/// The flavor selection passed on the command line: `all` or one flavor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlavorToken {
    #[default]
    All,
    Single(Flavor),
}

impl FlavorToken {
    /// Expand the token into the ordered set of flavors to process.
    pub fn expand(&self) -> FlavorSet {
        match self {
            FlavorToken::All => FlavorSet(Flavor::ALL.to_vec()),
            FlavorToken::Single(flavor) => FlavorSet(vec![*flavor]),
        }
    }
}

impl FromStr for FlavorToken {
    type Err = WsbuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_lowercase();
        if token == "all" {
            return Ok(FlavorToken::All);
        }
        token.parse().map(FlavorToken::Single)
    }
}

impl fmt::Display for FlavorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlavorToken::All => f.write_str("all"),
            FlavorToken::Single(flavor) => flavor.fmt(f),
        }
    }
}

/// Ordered, duplicate-free sequence of flavors for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorSet(Vec<Flavor>);

impl FlavorSet {
    pub fn iter(&self) -> impl Iterator<Item = &Flavor> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Flavor] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a FlavorSet {
    type Item = &'a Flavor;
    type IntoIter = std::slice::Iter<'a, Flavor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_name_rule() {
        assert_eq!(Flavor::Minimal.image_name(), "ml-workspace-minimal");
        assert_eq!(Flavor::Light.image_name(), "ml-workspace-light");
        assert_eq!(Flavor::Full.image_name(), "ml-workspace");
        assert_eq!(Flavor::Gpu.image_name(), "ml-workspace");
    }

    #[test]
    fn test_all_expands_in_fixed_order() {
        let set = FlavorToken::All.expand();
        assert_eq!(
            set.as_slice(),
            &[Flavor::Minimal, Flavor::Light, Flavor::Full, Flavor::Gpu]
        );
    }

    #[test]
    fn test_single_token_expands_to_singleton() {
        let set = FlavorToken::Single(Flavor::Gpu).expand();
        assert_eq!(set.len(), 1);
        assert_eq!(set.as_slice(), &[Flavor::Gpu]);
    }

    #[test]
    fn test_token_parsing_normalizes_case_and_whitespace() {
        assert_eq!(" ALL ".parse::<FlavorToken>().unwrap(), FlavorToken::All);
        assert_eq!(
            "Light".parse::<FlavorToken>().unwrap(),
            FlavorToken::Single(Flavor::Light)
        );
        assert!("huge".parse::<FlavorToken>().is_err());
    }

    #[test]
    fn test_names_derived_from_flavor() {
        assert_eq!(Flavor::Full.build_step(), "full-flavor");
        assert_eq!(Flavor::Minimal.test_container_name(), "workspace-test-minimal");
    }
}
