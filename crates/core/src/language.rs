// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The closed set of supported language codes (spec.md §6).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the twelve language runtimes the sandbox images provide.
///
/// Only [`Language::Py`] carries persistent interpreter state; every other
/// language is stateless across executions in the same session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Py,
    Js,
    Ts,
    Go,
    Java,
    C,
    Cpp,
    Rs,
    Php,
    R,
    F90,
    D,
}

impl Language {
    pub const ALL: [Language; 12] = [
        Language::Py,
        Language::Js,
        Language::Ts,
        Language::Go,
        Language::Java,
        Language::C,
        Language::Cpp,
        Language::Rs,
        Language::Php,
        Language::R,
        Language::F90,
        Language::D,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Language::Py => "py",
            Language::Js => "js",
            Language::Ts => "ts",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Rs => "rs",
            Language::Php => "php",
            Language::R => "r",
            Language::F90 => "f90",
            Language::D => "d",
        }
    }

    /// Only Python carries a persistent interpreter namespace (spec.md §1, §4.5).
    pub fn is_stateful(self) -> bool {
        matches!(self, Language::Py)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A `lang` string outside the closed set of §6.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language code: {0:?}")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "py" => Language::Py,
            "js" => Language::Js,
            "ts" => Language::Ts,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" => Language::C,
            "cpp" => Language::Cpp,
            "rs" => Language::Rs,
            "php" => Language::Php,
            "r" => Language::R,
            "f90" => Language::F90,
            "d" => Language::D,
            other => return Err(UnknownLanguage(other.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_round_trips_through_from_str() {
        for lang in Language::ALL {
            assert_eq!(Language::from_str(lang.code()), Ok(lang));
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(Language::from_str("ruby").is_err());
    }

    #[test]
    fn only_python_is_stateful() {
        for lang in Language::ALL {
            assert_eq!(lang.is_stateful(), lang == Language::Py);
        }
    }

    #[test]
    fn display_matches_code() {
        assert_eq!(Language::Cpp.to_string(), "cpp");
    }
}
