//! Execution scenarios and their default flag fragments.
//!
//! A scenario selects which pipeline a test case runs under: lint-only
//! static analysis, or full compile-and-simulate. A test case declares the
//! scenarios it supports at construction; composing an invocation for an
//! undeclared scenario is a configuration error caught before anything is
//! spawned.

use serde::{Deserialize, Serialize};

/// A named execution mode of the external toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// Static analysis only: the toolchain parses and lints the design but
    /// builds no model.
    Lint,
    /// Full pipeline: compile the design into an executable model, then run
    /// it.
    Simulate,
}

impl Scenario {
    /// All scenarios in canonical order.
    pub const ALL: &'static [Self] = &[Self::Lint, Self::Simulate];

    /// Stable lowercase name, used in diagnostics and serialized reports.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Lint => "lint",
            Self::Simulate => "simulate",
        }
    }

    /// Flag fragments the scenario contributes ahead of test-case flags.
    ///
    /// Test-case flags and per-call extra flags come after these, so they
    /// can override scenario defaults; the external tool owns flag
    /// precedence (later flags win).
    #[must_use]
    pub fn default_flags(self) -> &'static [&'static str] {
        match self {
            Self::Lint => &["--lint-only"],
            Self::Simulate => &["--exe", "--build"],
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_stable() {
        assert_eq!(Scenario::Lint.name(), "lint");
        assert_eq!(Scenario::Simulate.name(), "simulate");
        for scenario in Scenario::ALL {
            assert_eq!(scenario.to_string(), scenario.name());
        }
    }

    #[test]
    fn serde_roundtrip_uses_lowercase() {
        let json = serde_json::to_string(&Scenario::Simulate).unwrap();
        assert_eq!(json, "\"simulate\"");
        let back: Scenario = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Scenario::Simulate);
    }

    #[test]
    fn lint_defaults_disable_model_build() {
        assert!(Scenario::Lint.default_flags().contains(&"--lint-only"));
        assert!(!Scenario::Lint.default_flags().contains(&"--build"));
    }
}
