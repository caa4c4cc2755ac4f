// src/stage/kinds.rs

use std::fmt;

use serde::Deserialize;

/// How a file is handed to the stage executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Passing {
    /// `--flag <path>`
    Flag(&'static str),
    /// `<path>` at its position in the argument list.
    Positional,
}

/// One file a gear reads or writes: `<id>_<ROLE>.<ext>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRole {
    pub role: &'static str,
    pub ext: &'static str,
    pub passing: Passing,
    pub optional: bool,
}

const fn flag(role: &'static str, ext: &'static str, flag: &'static str) -> FileRole {
    FileRole {
        role,
        ext,
        passing: Passing::Flag(flag),
        optional: false,
    }
}

const fn positional(role: &'static str, ext: &'static str) -> FileRole {
    FileRole {
        role,
        ext,
        passing: Passing::Positional,
        optional: false,
    }
}

const fn optional_flag(role: &'static str, ext: &'static str, f: &'static str) -> FileRole {
    FileRole {
        optional: true,
        ..flag(role, ext, f)
    }
}

const REMOVE_MOUTH_IN: &[FileRole] = &[
    flag("OUTPUT", "mha", "--input"),
    flag("OUTPUT", "vtp", "--inputGeometry"),
    optional_flag("CLIPPINGS", "txt", "--clippings"),
];
const REMOVE_MOUTH_OUT: &[FileRole] = &[
    flag("MOUTH_REMOVED", "mha", "--output"),
    flag("MOUTH_REMOVED", "vtp", "--outputGeometry"),
];

const LAPLACE_IN: &[FileRole] = &[
    flag("MOUTH_REMOVED", "mha", "--input"),
    flag("LANDMARKS", "fcsv", "--landmarks"),
];
const LAPLACE_OUT: &[FileRole] = &[flag("HEATFLOW", "mha", "--output")];

const CROSS_IN: &[FileRole] = &[
    positional("HEATFLOW", "mha"),
    positional("MOUTH_REMOVED", "vtp"),
];
const CROSS_OUT: &[FileRole] = &[positional("CROSS", "vtp")];

const EXTRACT_IN: &[FileRole] = &[
    flag("LANDMARKS", "fcsv", "--landmarks"),
    positional("CROSS", "vtp"),
];
const EXTRACT_OUT: &[FileRole] = &[positional("EXTRACTED_SEGMENTS", "vtp")];

const AGGREGATE_IN: &[FileRole] = &[positional("EXTRACTED_SEGMENTS", "vtp")];
const AGGREGATE_OUT: &[FileRole] = &[positional("SLICES", "csv")];

/// The closed set of stage variants.
///
/// Selected in config by `kind = "..."`; anything else fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GearKind {
    RemoveMouth,
    LaplaceSolution,
    CrossSections,
    ExtractLandmarks,
    Aggregate,
}

impl GearKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GearKind::RemoveMouth => "remove_mouth",
            GearKind::LaplaceSolution => "laplace_solution",
            GearKind::CrossSections => "cross_sections",
            GearKind::ExtractLandmarks => "extract_landmarks",
            GearKind::Aggregate => "aggregate",
        }
    }

    /// Files read, in argument order.
    pub fn inputs(self) -> &'static [FileRole] {
        match self {
            GearKind::RemoveMouth => REMOVE_MOUTH_IN,
            GearKind::LaplaceSolution => LAPLACE_IN,
            GearKind::CrossSections => CROSS_IN,
            GearKind::ExtractLandmarks => EXTRACT_IN,
            GearKind::Aggregate => AGGREGATE_IN,
        }
    }

    /// Files written, in argument order (always after the inputs).
    pub fn outputs(self) -> &'static [FileRole] {
        match self {
            GearKind::RemoveMouth => REMOVE_MOUTH_OUT,
            GearKind::LaplaceSolution => LAPLACE_OUT,
            GearKind::CrossSections => CROSS_OUT,
            GearKind::ExtractLandmarks => EXTRACT_OUT,
            GearKind::Aggregate => AGGREGATE_OUT,
        }
    }

    /// When an optional input is absent, copy the required inputs onto the
    /// outputs (pairwise) instead of running the tool.
    pub fn copies_when_optional_missing(self) -> bool {
        matches!(self, GearKind::RemoveMouth)
    }
}

impl fmt::Display for GearKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
