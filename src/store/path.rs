use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("bad index in segment `{segment}` of path `{path}`")]
    BadIndex { path: String, segment: String },
    #[error("empty segment in path `{path}`")]
    EmptySegment { path: String },
}

/// One hop of a sub-object path, holding the serialized field it reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    /// `sprite` reads the `spriteId` field.
    Field { key: String },
    /// `form[2]` reads element 2 of the `formIds` field.
    Indexed { key: String, index: usize },
}

/// Parsed dotted path such as `form[0].sprite`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubObjectPath {
    source: String,
    steps: Vec<PathStep>,
}

impl SubObjectPath {
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let mut steps = Vec::new();
        for segment in path.split('.') {
            steps.push(parse_segment(path, segment)?);
        }
        Ok(Self { source: path.to_string(), steps })
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }
}

fn parse_segment(path: &str, segment: &str) -> Result<PathStep, PathError> {
    let bad_index = || PathError::BadIndex { path: path.to_string(), segment: segment.to_string() };
    if let Some(open) = segment.strip_suffix(']') {
        let (field, index) = open.split_once('[').ok_or_else(bad_index)?;
        if field.is_empty() {
            return Err(PathError::EmptySegment { path: path.to_string() });
        }
        let index = index.trim().parse::<usize>().map_err(|_| bad_index())?;
        Ok(PathStep::Indexed { key: format!("{field}Ids"), index })
    } else {
        if segment.is_empty() {
            return Err(PathError::EmptySegment { path: path.to_string() });
        }
        Ok(PathStep::Field { key: format!("{segment}Id") })
    }
}

impl FromStr for SubObjectPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SubObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
